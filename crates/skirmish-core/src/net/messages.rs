use serde::{Deserialize, Serialize};

use crate::action::{BattleAction, EffectKind};
use crate::battle::{BattleId, BattleStatus, EndReason, LogEntry, Rewards, Slot};
use crate::challenge::ChallengeId;
use crate::character::{CharacterClass, CharacterSheet};
use crate::combatant::Combatant;
use crate::error::PvpError;
use crate::player::{PlayerId, PlayerSummary};

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Server
    JoinLobby = 0x01,
    PlayersListRequest = 0x02,
    ChallengePropose = 0x03,
    ChallengeRespond = 0x04,
    BattleAction = 0x05,
    SetCharacter = 0x06,

    // Server -> Client (lobby)
    JoinLobbyResponse = 0x10,
    PlayersList = 0x11,
    ChallengeCreated = 0x12,
    ChallengeNotify = 0x13,
    ChallengeResult = 0x14,
    ChallengeCancelled = 0x15,

    // Server -> Client (battle)
    BattleStart = 0x20,
    BattleUpdate = 0x21,
    BattleTimerTick = 0x22,
    BattleEnd = 0x23,
    ActionRejected = 0x24,

    // Server -> Client (misc)
    CharacterUpdate = 0x30,
    RequestFailed = 0x31,
    SystemNotice = 0x32,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        let t = match b {
            0x01 => Self::JoinLobby,
            0x02 => Self::PlayersListRequest,
            0x03 => Self::ChallengePropose,
            0x04 => Self::ChallengeRespond,
            0x05 => Self::BattleAction,
            0x06 => Self::SetCharacter,
            0x10 => Self::JoinLobbyResponse,
            0x11 => Self::PlayersList,
            0x12 => Self::ChallengeCreated,
            0x13 => Self::ChallengeNotify,
            0x14 => Self::ChallengeResult,
            0x15 => Self::ChallengeCancelled,
            0x20 => Self::BattleStart,
            0x21 => Self::BattleUpdate,
            0x22 => Self::BattleTimerTick,
            0x23 => Self::BattleEnd,
            0x24 => Self::ActionRejected,
            0x30 => Self::CharacterUpdate,
            0x31 => Self::RequestFailed,
            0x32 => Self::SystemNotice,
            _ => return None,
        };
        Some(t)
    }

    /// Types only the server may originate.
    pub fn is_server_only(self) -> bool {
        (self as u8) >= 0x10
    }
}

// ================================================================
// Client -> Server
// ================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLobbyMsg {
    pub player_name: String,
    /// The sheet this session fights with. Can also be set later.
    pub character: Option<CharacterSheet>,
    pub protocol_version: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersListRequestMsg {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeProposeMsg {
    pub target_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRespondMsg {
    pub challenge_id: ChallengeId,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleActionMsg {
    pub battle_id: BattleId,
    pub action: BattleAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCharacterMsg {
    pub character: CharacterSheet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    JoinLobby(Box<JoinLobbyMsg>),
    PlayersListRequest(PlayersListRequestMsg),
    ChallengePropose(ChallengeProposeMsg),
    ChallengeRespond(ChallengeRespondMsg),
    BattleAction(BattleActionMsg),
    SetCharacter(Box<SetCharacterMsg>),
}

// ================================================================
// Server -> Client
// ================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLobbyResponseMsg {
    pub success: bool,
    pub player_id: Option<PlayerId>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayersListMsg {
    pub players: Vec<PlayerSummary>,
}

/// Sent to the challenger once a proposal is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCreatedMsg {
    pub challenge_id: ChallengeId,
    pub target_id: PlayerId,
    pub target_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeNotifyMsg {
    pub challenge_id: ChallengeId,
    pub challenger_id: PlayerId,
    pub challenger_name: String,
    pub challenger_class: CharacterClass,
    pub challenger_level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResultMsg {
    pub challenge_id: ChallengeId,
    pub accepted: bool,
    pub responder_name: String,
}

/// A pending challenge vanished without an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCancelledMsg {
    pub challenge_id: ChallengeId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleStartMsg {
    pub battle_id: BattleId,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub combatants: [Combatant; 2],
    pub current_turn: Slot,
    pub turn_time_remaining: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleUpdateMsg {
    pub battle_id: BattleId,
    pub actor: Slot,
    pub result_message: String,
    pub effect: EffectKind,
    pub magnitude: u32,
    pub combatants: [Combatant; 2],
    pub current_turn: Slot,
    pub turn_count: u32,
    pub turn_time_remaining: u32,
    pub status: BattleStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleTimerTickMsg {
    pub battle_id: BattleId,
    pub turn_time_remaining: u32,
    pub current_turn: Slot,
    /// Set when this tick ran the clock out and passed the turn.
    pub skipped: Option<Slot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleEndMsg {
    pub battle_id: BattleId,
    pub winner: Slot,
    pub winner_name: String,
    pub loser_name: String,
    pub end_reason: EndReason,
    pub rewards: Rewards,
    /// The most recent log entries.
    pub battle_log: Vec<LogEntry>,
    /// Entries dropped from the front of `battle_log`.
    pub log_truncated: u32,
    pub combatants: [Combatant; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRejectedMsg {
    pub battle_id: BattleId,
    pub error: PvpError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterUpdateMsg {
    pub character: CharacterSheet,
    pub levelled_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFailedMsg {
    pub error: PvpError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemNoticeMsg {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    JoinLobbyResponse(JoinLobbyResponseMsg),
    PlayersList(PlayersListMsg),
    ChallengeCreated(ChallengeCreatedMsg),
    ChallengeNotify(ChallengeNotifyMsg),
    ChallengeResult(ChallengeResultMsg),
    ChallengeCancelled(ChallengeCancelledMsg),
    BattleStart(Box<BattleStartMsg>),
    BattleUpdate(Box<BattleUpdateMsg>),
    BattleTimerTick(BattleTimerTickMsg),
    BattleEnd(Box<BattleEndMsg>),
    ActionRejected(ActionRejectedMsg),
    CharacterUpdate(Box<CharacterUpdateMsg>),
    RequestFailed(RequestFailedMsg),
    SystemNotice(SystemNoticeMsg),
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::JoinLobby(_) => MessageType::JoinLobby,
            Self::PlayersListRequest(_) => MessageType::PlayersListRequest,
            Self::ChallengePropose(_) => MessageType::ChallengePropose,
            Self::ChallengeRespond(_) => MessageType::ChallengeRespond,
            Self::BattleAction(_) => MessageType::BattleAction,
            Self::SetCharacter(_) => MessageType::SetCharacter,
        }
    }
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::JoinLobbyResponse(_) => MessageType::JoinLobbyResponse,
            Self::PlayersList(_) => MessageType::PlayersList,
            Self::ChallengeCreated(_) => MessageType::ChallengeCreated,
            Self::ChallengeNotify(_) => MessageType::ChallengeNotify,
            Self::ChallengeResult(_) => MessageType::ChallengeResult,
            Self::ChallengeCancelled(_) => MessageType::ChallengeCancelled,
            Self::BattleStart(_) => MessageType::BattleStart,
            Self::BattleUpdate(_) => MessageType::BattleUpdate,
            Self::BattleTimerTick(_) => MessageType::BattleTimerTick,
            Self::BattleEnd(_) => MessageType::BattleEnd,
            Self::ActionRejected(_) => MessageType::ActionRejected,
            Self::CharacterUpdate(_) => MessageType::CharacterUpdate,
            Self::RequestFailed(_) => MessageType::RequestFailed,
            Self::SystemNotice(_) => MessageType::SystemNotice,
        }
    }
}
