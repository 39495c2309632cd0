use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use skirmish_core::character::CharacterSheet;
use skirmish_core::net::messages::{
    BattleStartMsg, ChallengeProposeMsg, ChallengeRespondMsg, ClientMessage, JoinLobbyMsg,
    JoinLobbyResponseMsg, ServerMessage,
};
use skirmish_core::net::protocol::{PROTOCOL_VERSION, decode_server_message, encode_client_message};
use skirmish_core::player::PlayerId;

use skirmish_server::config::ServerConfig;
use skirmish_server::{build_app, spawn_challenge_sweeper};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(ServerConfig::default()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);
        spawn_challenge_sweeper(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// A config whose turn clock runs 4x faster than real time.
pub fn fast_clock_config(turn_time_secs: u32) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.battle.turn_time_secs = turn_time_secs;
    config.battle.tick_interval_ms = 250;
    config
}

pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a JoinLobby and return the response (success or error).
pub async fn ws_join(
    stream: &mut WsStream,
    name: &str,
    character: Option<CharacterSheet>,
) -> JoinLobbyResponseMsg {
    let msg = ClientMessage::JoinLobby(Box::new(JoinLobbyMsg {
        player_name: name.to_string(),
        character,
        protocol_version: PROTOCOL_VERSION,
    }));
    ws_send_client_msg(stream, &msg).await;

    match ws_read_server_msg(stream).await {
        ServerMessage::JoinLobbyResponse(join) => join,
        other => panic!("Expected JoinLobbyResponse, got: {other:?}"),
    }
}

/// Connect and join with a character. Returns the stream and player id.
pub async fn connect_player(server: &TestServer, sheet: CharacterSheet) -> (WsStream, PlayerId) {
    let mut stream = ws_connect(&server.ws_url()).await;
    let name = sheet.name.clone();
    let join = ws_join(&mut stream, &name, Some(sheet)).await;
    assert!(join.success, "Expected successful join: {join:?}");
    (stream, join.player_id.unwrap())
}

/// Read raw binary data from a WebSocket stream (5s timeout).
pub async fn ws_read_raw(stream: &mut WsStream) -> Vec<u8> {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return data.to_vec(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let data = ws_read_raw(stream).await;
    decode_server_message(&data).unwrap()
}

/// Skip messages until one matches `pred` (5s per message).
pub async fn ws_read_until<F>(stream: &mut WsStream, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    loop {
        let msg = ws_read_server_msg(stream).await;
        if pred(&msg) {
            return msg;
        }
    }
}

/// Read for `timeout_ms` and report whether any message matched `pred`.
pub async fn ws_saw_within<F>(stream: &mut WsStream, timeout_ms: u64, mut pred: F) -> bool
where
    F: FnMut(&ServerMessage) -> bool,
{
    let deadline = Duration::from_millis(timeout_ms);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => {
                    if let Ok(msg) = decode_server_message(&data)
                        && pred(&msg)
                    {
                        return;
                    }
                },
                Some(Ok(_)) => continue,
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await
    .is_ok()
}

pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    stream.send(Message::Binary(encoded.into())).await.unwrap();
}

pub async fn ws_send_raw(stream: &mut WsStream, data: Vec<u8>) {
    stream.send(Message::Binary(data.into())).await.unwrap();
}

/// Propose from `challenger` to `target_id` and return the challenge id
/// as seen by the target.
pub async fn propose(challenger: &mut WsStream, target: &mut WsStream, target_id: PlayerId) -> String {
    ws_send_client_msg(
        challenger,
        &ClientMessage::ChallengePropose(ChallengeProposeMsg { target_id }),
    )
    .await;
    match ws_read_until(target, |m| matches!(m, ServerMessage::ChallengeNotify(_))).await {
        ServerMessage::ChallengeNotify(n) => n.challenge_id,
        _ => unreachable!(),
    }
}

pub async fn respond(stream: &mut WsStream, challenge_id: &str, accepted: bool) {
    ws_send_client_msg(
        stream,
        &ClientMessage::ChallengeRespond(ChallengeRespondMsg {
            challenge_id: challenge_id.to_string(),
            accepted,
        }),
    )
    .await;
}

/// Challenge, accept, and wait until both sides have the BattleStart.
pub async fn start_battle(
    challenger: &mut WsStream,
    target: &mut WsStream,
    target_id: PlayerId,
) -> BattleStartMsg {
    let challenge_id = propose(challenger, target, target_id).await;
    respond(target, &challenge_id, true).await;

    let start = match ws_read_until(challenger, |m| matches!(m, ServerMessage::BattleStart(_)))
        .await
    {
        ServerMessage::BattleStart(s) => *s,
        _ => unreachable!(),
    };
    match ws_read_until(target, |m| matches!(m, ServerMessage::BattleStart(_))).await {
        ServerMessage::BattleStart(s) => assert_eq!(s.battle_id, start.battle_id),
        _ => unreachable!(),
    }
    start
}
