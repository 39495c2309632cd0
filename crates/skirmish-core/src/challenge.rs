use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::action::Dice;
use crate::battle::{Battle, Slot};
use crate::character::CharacterSheet;
use crate::combatant::Combatant;
use crate::error::PvpError;
use crate::player::PlayerId;

pub type ChallengeId = String;

/// Default lifetime of an unanswered challenge.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(60);

/// A pending proposal to fight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub id: ChallengeId,
    pub challenger: PlayerId,
    pub challenger_name: String,
    pub target: PlayerId,
    pub target_name: String,
    pub created_at: Instant,
}

impl Challenge {
    pub fn involves(&self, player: PlayerId) -> bool {
        self.challenger == player || self.target == player
    }
}

/// Read access to who is online, what they play and whether they are
/// already fighting.
pub trait Roster {
    /// The player's live sheet. `None` when offline or without a character.
    fn character(&self, player: PlayerId) -> Option<&CharacterSheet>;
    fn is_busy(&self, player: PlayerId) -> bool;
}

/// A challenge that was accepted and the battle it produced.
#[derive(Debug)]
pub struct AcceptedChallenge {
    pub challenge: Challenge,
    pub battle: Battle,
}

/// Owns every pending challenge. Each challenge resolves at most once:
/// accept, decline, expiry and player departure all remove the record.
#[derive(Debug)]
pub struct ChallengeBroker {
    pending: HashMap<ChallengeId, Challenge>,
    ttl: Duration,
}

impl Default for ChallengeBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CHALLENGE_TTL)
    }
}

impl ChallengeBroker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
        }
    }

    pub fn propose(
        &mut self,
        challenger: PlayerId,
        target: PlayerId,
        roster: &dyn Roster,
        now: Instant,
    ) -> Result<ChallengeId, PvpError> {
        let challenger_sheet = roster
            .character(challenger)
            .ok_or(PvpError::CharacterRequired)?;
        if !challenger_sheet.is_alive() {
            return Err(PvpError::CharacterDefeated);
        }
        if challenger == target {
            return Err(PvpError::TargetUnavailable);
        }
        let target_sheet = roster
            .character(target)
            .filter(|sheet| sheet.is_alive())
            .ok_or(PvpError::TargetUnavailable)?;
        if roster.is_busy(challenger) || roster.is_busy(target) {
            return Err(PvpError::PlayerBusy);
        }
        if self.pending.values().any(|c| {
            c.challenger == challenger
                && c.target == target
                && now.saturating_duration_since(c.created_at) < self.ttl
        }) {
            return Err(PvpError::DuplicateChallenge);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let challenge = Challenge {
            id: id.clone(),
            challenger,
            challenger_name: challenger_sheet.name.clone(),
            target,
            target_name: target_sheet.name.clone(),
            created_at: now,
        };
        tracing::debug!(challenge_id = %id, challenger, target, "Challenge proposed");
        self.pending.insert(id.clone(), challenge);
        Ok(id)
    }

    /// Accept on behalf of `responder`, who must be the challenge target.
    /// The battle snapshots both live sheets; the challenger takes slot one
    /// and the first turn is rolled.
    ///
    /// Any error after the record is found still consumes it: a challenge
    /// whose participants can no longer fight is dead.
    pub fn accept(
        &mut self,
        id: &str,
        responder: PlayerId,
        roster: &dyn Roster,
        dice: &mut dyn Dice,
        max_turn_time: u32,
        now: Instant,
    ) -> Result<AcceptedChallenge, PvpError> {
        let challenge = self.take_for(id, responder, now)?;

        let (Some(challenger_sheet), Some(target_sheet)) = (
            roster.character(challenge.challenger),
            roster.character(challenge.target),
        ) else {
            return Err(PvpError::TargetUnavailable);
        };
        if !challenger_sheet.is_alive() || !target_sheet.is_alive() {
            return Err(PvpError::TargetUnavailable);
        }
        if roster.is_busy(challenge.challenger) || roster.is_busy(challenge.target) {
            return Err(PvpError::PlayerBusy);
        }

        let first = Slot::from_index(dice.roll(2) as usize);
        let battle = Battle::new(
            uuid::Uuid::new_v4().to_string(),
            Combatant::from_sheet(challenger_sheet),
            Combatant::from_sheet(target_sheet),
            first,
            max_turn_time,
        );
        Ok(AcceptedChallenge { challenge, battle })
    }

    pub fn decline(
        &mut self,
        id: &str,
        responder: PlayerId,
        now: Instant,
    ) -> Result<Challenge, PvpError> {
        self.take_for(id, responder, now)
    }

    /// Remove and return every challenge older than the TTL.
    pub fn expire(&mut self, now: Instant) -> Vec<Challenge> {
        let ttl = self.ttl;
        let expired: Vec<ChallengeId> = self
            .pending
            .values()
            .filter(|c| now.saturating_duration_since(c.created_at) >= ttl)
            .map(|c| c.id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .collect()
    }

    /// Remove and return every challenge the player is part of.
    pub fn drop_player(&mut self, player: PlayerId) -> Vec<Challenge> {
        let ids: Vec<ChallengeId> = self
            .pending
            .values()
            .filter(|c| c.involves(player))
            .map(|c| c.id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.pending.remove(id))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Challenge> {
        self.pending.get(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn take_for(
        &mut self,
        id: &str,
        responder: PlayerId,
        now: Instant,
    ) -> Result<Challenge, PvpError> {
        let challenge = self.pending.get(id).ok_or(PvpError::ChallengeNotFound)?;
        if challenge.target != responder {
            return Err(PvpError::ChallengeNotFound);
        }
        let expired = now.saturating_duration_since(challenge.created_at) >= self.ttl;
        let challenge = self
            .pending
            .remove(id)
            .ok_or(PvpError::ChallengeNotFound)?;
        if expired {
            return Err(PvpError::ChallengeNotFound);
        }
        Ok(challenge)
    }
}
