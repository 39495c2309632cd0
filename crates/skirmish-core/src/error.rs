use serde::{Deserialize, Serialize};

/// Reasons a PvP request is refused.
///
/// Errors are scoped to the request that caused them: the battle or
/// challenge they refer to is left untouched, and only the requesting
/// client is told about the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PvpError {
    /// The submitting combatant does not hold the current turn.
    NotYourTurn,
    /// The battle has finished (or never existed on this server).
    BattleNotActive,
    /// The actor does not know the named skill.
    UnknownSkill(String),
    /// The actor cannot pay the skill's mana cost.
    InsufficientMana {
        skill: String,
        cost: u32,
        available: u32,
    },
    /// The actor's inventory does not contain the named item.
    ItemNotOwned(String),
    /// The item exists but has no effect in battle (e.g. equipment).
    ItemNotUsable(String),
    /// The challenge is unknown, already resolved, expired, or addressed
    /// to someone else.
    ChallengeNotFound,
    /// The target is offline, has no character, or cannot fight.
    TargetUnavailable,
    /// One of the participants is already in a battle.
    PlayerBusy,
    /// The requester has not registered a character yet.
    CharacterRequired,
    /// The requester's character has no health left to fight with.
    CharacterDefeated,
    /// A submitted character sheet breaks a size limit.
    InvalidCharacter(String),
    /// The same challenge is already pending.
    DuplicateChallenge,
}

impl std::fmt::Display for PvpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotYourTurn => write!(f, "not your turn"),
            Self::BattleNotActive => write!(f, "battle is not active"),
            Self::UnknownSkill(name) => write!(f, "unknown skill: {name}"),
            Self::InsufficientMana {
                skill,
                cost,
                available,
            } => write!(
                f,
                "not enough mana for {skill}: needs {cost}, has {available}"
            ),
            Self::ItemNotOwned(name) => write!(f, "item not owned: {name}"),
            Self::ItemNotUsable(name) => write!(f, "{name} cannot be used in battle"),
            Self::ChallengeNotFound => write!(f, "challenge not found"),
            Self::TargetUnavailable => write!(f, "target is unavailable"),
            Self::PlayerBusy => write!(f, "player is already in a battle"),
            Self::CharacterRequired => write!(f, "create a character first"),
            Self::CharacterDefeated => write!(f, "your character has no health left"),
            Self::InvalidCharacter(reason) => write!(f, "invalid character: {reason}"),
            Self::DuplicateChallenge => write!(f, "challenge already pending"),
        }
    }
}

impl std::error::Error for PvpError {}
