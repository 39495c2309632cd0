use serde::{Deserialize, Serialize};

use super::messages::{
    ActionRejectedMsg, BattleActionMsg, BattleEndMsg, BattleStartMsg, BattleTimerTickMsg,
    BattleUpdateMsg, ChallengeCancelledMsg, ChallengeCreatedMsg, ChallengeNotifyMsg,
    ChallengeProposeMsg, ChallengeRespondMsg, ChallengeResultMsg, CharacterUpdateMsg,
    ClientMessage, JoinLobbyMsg, JoinLobbyResponseMsg, MessageType, PlayersListMsg,
    PlayersListRequestMsg, RequestFailedMsg, ServerMessage, SetCharacterMsg, SystemNoticeMsg,
};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum message payload size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024; // 64 KiB

#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    UnknownMessageType(u8),
    PayloadTooLarge(usize),
    SerializeError(String),
    DeserializeError(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::UnknownMessageType(b) => write!(f, "unknown message type: 0x{b:02x}"),
            Self::PayloadTooLarge(size) => {
                write!(
                    f,
                    "payload too large: {size} bytes (max {MAX_MESSAGE_SIZE})"
                )
            },
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Encode a serializable payload with a 1-byte type prefix.
pub fn encode_message<T: Serialize>(
    msg_type: MessageType,
    payload: &T,
) -> Result<Vec<u8>, ProtocolError> {
    let payload_bytes =
        rmp_serde::to_vec(payload).map_err(|e| ProtocolError::SerializeError(e.to_string()))?;
    let total = 1 + payload_bytes.len();
    if total > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::PayloadTooLarge(total));
    }
    let mut buf = Vec::with_capacity(total);
    buf.push(msg_type as u8);
    buf.extend_from_slice(&payload_bytes);
    Ok(buf)
}

/// Encode a `ClientMessage` to wire format.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    let t = msg.message_type();
    match msg {
        ClientMessage::JoinLobby(m) => encode_message(t, m),
        ClientMessage::PlayersListRequest(m) => encode_message(t, m),
        ClientMessage::ChallengePropose(m) => encode_message(t, m),
        ClientMessage::ChallengeRespond(m) => encode_message(t, m),
        ClientMessage::BattleAction(m) => encode_message(t, m),
        ClientMessage::SetCharacter(m) => encode_message(t, m),
    }
}

/// Encode a `ServerMessage` to wire format.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    let t = msg.message_type();
    match msg {
        ServerMessage::JoinLobbyResponse(m) => encode_message(t, m),
        ServerMessage::PlayersList(m) => encode_message(t, m),
        ServerMessage::ChallengeCreated(m) => encode_message(t, m),
        ServerMessage::ChallengeNotify(m) => encode_message(t, m),
        ServerMessage::ChallengeResult(m) => encode_message(t, m),
        ServerMessage::ChallengeCancelled(m) => encode_message(t, m),
        ServerMessage::BattleStart(m) => encode_message(t, m),
        ServerMessage::BattleUpdate(m) => encode_message(t, m),
        ServerMessage::BattleTimerTick(m) => encode_message(t, m),
        ServerMessage::BattleEnd(m) => encode_message(t, m),
        ServerMessage::ActionRejected(m) => encode_message(t, m),
        ServerMessage::CharacterUpdate(m) => encode_message(t, m),
        ServerMessage::RequestFailed(m) => encode_message(t, m),
        ServerMessage::SystemNotice(m) => encode_message(t, m),
    }
}

/// Extract the message type byte from raw wire data.
pub fn decode_message_type(data: &[u8]) -> Result<MessageType, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    MessageType::from_byte(data[0]).ok_or(ProtocolError::UnknownMessageType(data[0]))
}

/// Decode a MessagePack payload (bytes after the type prefix).
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::EmptyMessage);
    }
    rmp_serde::from_slice(&data[1..]).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
}

/// Decode raw wire data into a `ClientMessage`.
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::JoinLobby => Ok(ClientMessage::JoinLobby(Box::new(decode_payload::<
            JoinLobbyMsg,
        >(data)?))),
        MessageType::PlayersListRequest => Ok(ClientMessage::PlayersListRequest(
            decode_payload::<PlayersListRequestMsg>(data)?,
        )),
        MessageType::ChallengePropose => Ok(ClientMessage::ChallengePropose(decode_payload::<
            ChallengeProposeMsg,
        >(data)?)),
        MessageType::ChallengeRespond => Ok(ClientMessage::ChallengeRespond(decode_payload::<
            ChallengeRespondMsg,
        >(data)?)),
        MessageType::BattleAction => Ok(ClientMessage::BattleAction(decode_payload::<
            BattleActionMsg,
        >(data)?)),
        MessageType::SetCharacter => Ok(ClientMessage::SetCharacter(Box::new(decode_payload::<
            SetCharacterMsg,
        >(data)?))),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}

/// Decode raw wire data into a `ServerMessage`.
pub fn decode_server_message(data: &[u8]) -> Result<ServerMessage, ProtocolError> {
    let msg_type = decode_message_type(data)?;
    match msg_type {
        MessageType::JoinLobbyResponse => Ok(ServerMessage::JoinLobbyResponse(decode_payload::<
            JoinLobbyResponseMsg,
        >(data)?)),
        MessageType::PlayersList => Ok(ServerMessage::PlayersList(decode_payload::<
            PlayersListMsg,
        >(data)?)),
        MessageType::ChallengeCreated => Ok(ServerMessage::ChallengeCreated(decode_payload::<
            ChallengeCreatedMsg,
        >(data)?)),
        MessageType::ChallengeNotify => Ok(ServerMessage::ChallengeNotify(decode_payload::<
            ChallengeNotifyMsg,
        >(data)?)),
        MessageType::ChallengeResult => Ok(ServerMessage::ChallengeResult(decode_payload::<
            ChallengeResultMsg,
        >(data)?)),
        MessageType::ChallengeCancelled => Ok(ServerMessage::ChallengeCancelled(
            decode_payload::<ChallengeCancelledMsg>(data)?,
        )),
        MessageType::BattleStart => Ok(ServerMessage::BattleStart(Box::new(decode_payload::<
            BattleStartMsg,
        >(data)?))),
        MessageType::BattleUpdate => Ok(ServerMessage::BattleUpdate(Box::new(decode_payload::<
            BattleUpdateMsg,
        >(data)?))),
        MessageType::BattleTimerTick => Ok(ServerMessage::BattleTimerTick(decode_payload::<
            BattleTimerTickMsg,
        >(data)?)),
        MessageType::BattleEnd => Ok(ServerMessage::BattleEnd(Box::new(decode_payload::<
            BattleEndMsg,
        >(data)?))),
        MessageType::ActionRejected => Ok(ServerMessage::ActionRejected(decode_payload::<
            ActionRejectedMsg,
        >(data)?)),
        MessageType::CharacterUpdate => Ok(ServerMessage::CharacterUpdate(Box::new(
            decode_payload::<CharacterUpdateMsg>(data)?,
        ))),
        MessageType::RequestFailed => Ok(ServerMessage::RequestFailed(decode_payload::<
            RequestFailedMsg,
        >(data)?)),
        MessageType::SystemNotice => Ok(ServerMessage::SystemNotice(decode_payload::<
            SystemNoticeMsg,
        >(data)?)),
        _ => Err(ProtocolError::UnknownMessageType(data[0])),
    }
}
