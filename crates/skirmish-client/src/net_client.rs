use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use skirmish_core::character::CharacterSheet;
use skirmish_core::net::messages::{ClientMessage, JoinLobbyMsg, ServerMessage};
use skirmish_core::net::protocol::{
    PROTOCOL_VERSION, ProtocolError, decode_server_message, encode_client_message,
};
use skirmish_core::player::PlayerId;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
pub enum ClientError {
    /// The WebSocket could not be opened.
    Connect(String),
    /// The socket failed after it was open.
    Transport(String),
    Protocol(ProtocolError),
    Closed,
    /// The server refused the join.
    Rejected(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Closed => write!(f, "connection closed"),
            Self::Rejected(e) => write!(f, "join rejected: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

/// A joined lobby session over a native WebSocket.
pub struct PvpConnection {
    stream: WsStream,
    player_id: PlayerId,
}

impl PvpConnection {
    /// Open `url`, send the JoinLobby handshake and wait for the answer.
    pub async fn connect(
        url: &str,
        name: &str,
        character: Option<CharacterSheet>,
    ) -> Result<Self, ClientError> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        let mut conn = Self {
            stream,
            player_id: 0,
        };

        conn.send(&ClientMessage::JoinLobby(Box::new(JoinLobbyMsg {
            player_name: name.to_string(),
            character,
            protocol_version: PROTOCOL_VERSION,
        })))
        .await?;

        match conn.recv().await? {
            ServerMessage::JoinLobbyResponse(resp) if resp.success => {
                let player_id = resp
                    .player_id
                    .ok_or_else(|| ClientError::Rejected("no player id assigned".to_string()))?;
                tracing::info!(player_id, name, "Joined lobby");
                conn.player_id = player_id;
                Ok(conn)
            },
            ServerMessage::JoinLobbyResponse(resp) => Err(ClientError::Rejected(
                resp.error.unwrap_or_else(|| "unknown error".to_string()),
            )),
            other => Err(ClientError::Rejected(format!(
                "unexpected {:?} before join response",
                other.message_type()
            ))),
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        let data = encode_client_message(msg)?;
        self.stream
            .send(Message::Binary(data.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    /// Next server message. Non-binary frames are skipped.
    pub async fn recv(&mut self) -> Result<ServerMessage, ClientError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(decode_server_message(&data)?),
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
            }
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }
}
