use serde::{Deserialize, Serialize};

use crate::action::{self, ActionOutcome, BattleAction, Dice};
use crate::combatant::Combatant;
use crate::error::PvpError;
use crate::time::timestamp_millis;

pub type BattleId = String;

/// Default seconds a combatant has to act before the turn is skipped.
pub const MAX_TURN_TIME_SECS: u32 = 30;

/// Log entries kept per battle. Older entries are dropped and counted in
/// [`Battle::log_truncated`].
pub const MAX_LOG_ENTRIES: usize = 100;

/// Which side of a battle a combatant occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
        }
    }

    /// Human-facing slot number (1 or 2).
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_index(index: usize) -> Self {
        if index == 0 { Self::One } else { Self::Two }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleStatus {
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// One side reached 0 health.
    Defeat,
    Surrender,
    /// One side left the lobby mid-battle.
    Forfeit,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Defeat => "defeat",
            Self::Surrender => "surrender",
            Self::Forfeit => "forfeit",
        };
        f.write_str(s)
    }
}

/// Winner's reward, a pure function of the loser's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewards {
    pub experience: u32,
    pub gold: u32,
}

impl Rewards {
    pub fn for_loser_level(level: u32) -> Self {
        Self {
            experience: level.saturating_mul(15).saturating_add(25),
            gold: level.saturating_mul(8).saturating_add(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleOutcome {
    pub winner: Slot,
    pub loser: Slot,
    pub winner_name: String,
    pub loser_name: String,
    pub reason: EndReason,
    pub rewards: Rewards,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub turn: u32,
    pub timestamp: u64,
}

/// What one timer tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Clock decremented; seconds left for the current slot.
    Countdown(u32),
    /// Clock ran out and the turn passed to the other slot.
    TimedOut { skipped: Slot },
    /// Battle is not active.
    Idle,
}

/// A two-party duel. Exactly one slot may act at a time; every mutation goes
/// through [`Battle::submit`], [`Battle::tick`] or [`Battle::forfeit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub id: BattleId,
    pub combatants: [Combatant; 2],
    pub current_turn: Slot,
    pub turn_count: u32,
    pub status: BattleStatus,
    pub outcome: Option<BattleOutcome>,
    pub turn_time_remaining: u32,
    pub max_turn_time: u32,
    /// Most recent entries, at most [`MAX_LOG_ENTRIES`].
    pub log: Vec<LogEntry>,
    /// Entries dropped from the front of `log`.
    pub log_truncated: u32,
}

impl Battle {
    pub fn new(
        id: BattleId,
        one: Combatant,
        two: Combatant,
        first: Slot,
        max_turn_time: u32,
    ) -> Self {
        let mut battle = Self {
            id,
            combatants: [one, two],
            current_turn: first,
            turn_count: 0,
            status: BattleStatus::Active,
            outcome: None,
            turn_time_remaining: max_turn_time,
            max_turn_time,
            log: Vec::new(),
            log_truncated: 0,
        };
        let intro = format!(
            "Battle begins! {} vs {}",
            battle.combatants[0].name, battle.combatants[1].name
        );
        battle.push_log(intro);
        let first_name = battle.combatant(first).name.clone();
        battle.push_log(format!("{first_name} goes first!"));
        battle
    }

    pub fn combatant(&self, slot: Slot) -> &Combatant {
        &self.combatants[slot.index()]
    }

    pub fn current(&self) -> &Combatant {
        self.combatant(self.current_turn)
    }

    pub fn slot_of(&self, name: &str) -> Option<Slot> {
        self.combatants
            .iter()
            .position(|c| c.name == name)
            .map(Slot::from_index)
    }

    pub fn is_active(&self) -> bool {
        self.status == BattleStatus::Active
    }

    /// Apply an action on behalf of `slot`. On error nothing changes.
    pub fn submit(
        &mut self,
        slot: Slot,
        action: &BattleAction,
        dice: &mut dyn Dice,
    ) -> Result<ActionOutcome, PvpError> {
        if !self.is_active() {
            return Err(PvpError::BattleNotActive);
        }
        if slot != self.current_turn {
            return Err(PvpError::NotYourTurn);
        }

        let (actor, target) = self.pair_mut(slot);
        let outcome = action::resolve(action, actor, target, dice)?;
        self.push_log(outcome.message.clone());

        if matches!(action, BattleAction::Surrender) {
            self.finish(slot.other(), EndReason::Surrender);
        } else if let Some(fallen) = self.fallen() {
            self.finish(fallen.other(), EndReason::Defeat);
        } else {
            self.advance_turn();
        }
        Ok(outcome)
    }

    /// One second of the turn clock.
    pub fn tick(&mut self) -> TickResult {
        if !self.is_active() {
            return TickResult::Idle;
        }
        self.turn_time_remaining = self.turn_time_remaining.saturating_sub(1);
        if self.turn_time_remaining > 0 {
            return TickResult::Countdown(self.turn_time_remaining);
        }

        let skipped = self.current_turn;
        let name = self.current().name.clone();
        self.push_log(format!("{name}'s turn timed out! Turn skipped."));
        self.advance_turn();
        TickResult::TimedOut { skipped }
    }

    /// End the battle because `slot` left. Returns false if already over.
    pub fn forfeit(&mut self, slot: Slot) -> bool {
        if !self.is_active() {
            return false;
        }
        let name = self.combatant(slot).name.clone();
        self.push_log(format!("{name} fled the battle!"));
        self.finish(slot.other(), EndReason::Forfeit);
        true
    }

    fn fallen(&self) -> Option<Slot> {
        self.combatants
            .iter()
            .position(|c| !c.is_alive())
            .map(Slot::from_index)
    }

    fn advance_turn(&mut self) {
        self.current_turn = self.current_turn.other();
        self.turn_count = self.turn_count.saturating_add(1);
        self.turn_time_remaining = self.max_turn_time;
        let name = self.current().name.clone();
        let label = self.turn_count.saturating_add(1);
        self.push_log(format!("Turn {label}: {name}'s turn"));
    }

    fn finish(&mut self, winner: Slot, reason: EndReason) {
        let loser = winner.other();
        let rewards = Rewards::for_loser_level(self.combatant(loser).level);
        let winner_name = self.combatant(winner).name.clone();
        let loser_name = self.combatant(loser).name.clone();

        self.status = BattleStatus::Finished;
        self.push_log(format!("{winner_name} wins the battle!"));
        self.push_log(format!(
            "{winner_name} gains {} experience and {} gold!",
            rewards.experience, rewards.gold
        ));
        self.outcome = Some(BattleOutcome {
            winner,
            loser,
            winner_name,
            loser_name,
            reason,
            rewards,
        });
    }

    fn pair_mut(&mut self, actor: Slot) -> (&mut Combatant, &mut Combatant) {
        let [one, two] = &mut self.combatants;
        match actor {
            Slot::One => (one, two),
            Slot::Two => (two, one),
        }
    }

    fn push_log(&mut self, message: String) {
        self.log.push(LogEntry {
            message,
            turn: self.turn_count,
            timestamp: timestamp_millis(),
        });
        if self.log.len() > MAX_LOG_ENTRIES {
            let excess = self.log.len() - MAX_LOG_ENTRIES;
            self.log.drain(..excess);
            self.log_truncated = self.log_truncated.saturating_add(excess as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FixedDice;
    use crate::character::CharacterClass;
    use crate::test_helpers::make_combatant;

    fn duel(first: Slot) -> Battle {
        Battle::new(
            "b-1".to_string(),
            make_combatant("A", CharacterClass::Fighter, 100, 15, 0),
            make_combatant("B", CharacterClass::Rogue, 80, 10, 5),
            first,
            MAX_TURN_TIME_SECS,
        )
    }

    #[test]
    fn new_battle_is_active_with_intro_log() {
        let b = duel(Slot::Two);
        assert!(b.is_active());
        assert_eq!(b.current_turn, Slot::Two);
        assert_eq!(b.turn_time_remaining, 30);
        assert_eq!(b.log.len(), 2);
        assert!(b.log[0].message.contains("A vs B"));
        assert!(b.log[1].message.contains("B goes first"));
    }

    #[test]
    fn attack_exchange_and_defeat() {
        let mut b = duel(Slot::One);
        let mut dice = FixedDice(0);

        let out = b.submit(Slot::One, &BattleAction::Attack, &mut dice).unwrap();
        assert_eq!(out.magnitude, 10);
        assert_eq!(b.combatant(Slot::Two).health, 70);
        assert_eq!(b.current_turn, Slot::Two);
        assert_eq!(b.turn_count, 1);

        b.submit(Slot::Two, &BattleAction::Attack, &mut dice).unwrap();
        assert_eq!(b.combatant(Slot::One).health, 90);
        assert_eq!(b.current_turn, Slot::One);

        // B drops after A's 8th hit, having landed 7 of its own
        let mut turns = 2;
        while b.is_active() {
            let slot = b.current_turn;
            b.submit(slot, &BattleAction::Attack, &mut dice).unwrap();
            turns += 1;
            assert!(turns < 50);
        }
        let outcome = b.outcome.clone().unwrap();
        assert_eq!(outcome.winner, Slot::One);
        assert_eq!(outcome.reason, EndReason::Defeat);
        assert_eq!(b.combatant(Slot::Two).health, 0);
        assert_eq!(b.combatant(Slot::One).health, 30);
        assert_eq!(outcome.rewards, Rewards::for_loser_level(1));
    }

    #[test]
    fn wrong_slot_rejected_without_mutation() {
        let mut b = duel(Slot::One);
        let before = b.clone();
        assert_eq!(
            b.submit(Slot::Two, &BattleAction::Attack, &mut FixedDice(0)),
            Err(PvpError::NotYourTurn)
        );
        assert_eq!(b, before);
    }

    #[test]
    fn failed_action_keeps_turn() {
        let mut b = duel(Slot::One);
        let before = b.clone();
        let err = b
            .submit(
                Slot::One,
                &BattleAction::Skill {
                    name: "Fireball".into(),
                },
                &mut FixedDice(0),
            )
            .unwrap_err();
        assert_eq!(err, PvpError::UnknownSkill("Fireball".into()));
        assert_eq!(b, before);
    }

    #[test]
    fn surrender_ends_for_other_side() {
        let mut b = duel(Slot::Two);
        b.submit(Slot::Two, &BattleAction::Surrender, &mut FixedDice(0))
            .unwrap();
        let outcome = b.outcome.clone().unwrap();
        assert_eq!(outcome.winner, Slot::One);
        assert_eq!(outcome.winner_name, "A");
        assert_eq!(outcome.reason, EndReason::Surrender);
        assert_eq!(b.status, BattleStatus::Finished);
    }

    #[test]
    fn finished_battle_is_terminal() {
        let mut b = duel(Slot::One);
        b.submit(Slot::One, &BattleAction::Surrender, &mut FixedDice(0))
            .unwrap();
        let snapshot = b.clone();
        for slot in [Slot::One, Slot::Two] {
            assert_eq!(
                b.submit(slot, &BattleAction::Attack, &mut FixedDice(0)),
                Err(PvpError::BattleNotActive)
            );
        }
        assert_eq!(b.tick(), TickResult::Idle);
        assert!(!b.forfeit(Slot::One));
        assert_eq!(b, snapshot);
    }

    #[test]
    fn timeout_skips_turn_without_stat_change() {
        let mut b = duel(Slot::One);
        let stats = b.combatants.clone();
        for expected in (1..MAX_TURN_TIME_SECS).rev() {
            assert_eq!(b.tick(), TickResult::Countdown(expected));
        }
        assert_eq!(b.tick(), TickResult::TimedOut { skipped: Slot::One });
        assert_eq!(b.current_turn, Slot::Two);
        assert_eq!(b.turn_time_remaining, MAX_TURN_TIME_SECS);
        assert_eq!(b.combatants, stats);
        assert!(
            b.log
                .iter()
                .any(|e| e.message == "A's turn timed out! Turn skipped.")
        );

        // Late action from the skipped side
        assert_eq!(
            b.submit(Slot::One, &BattleAction::Attack, &mut FixedDice(0)),
            Err(PvpError::NotYourTurn)
        );
    }

    #[test]
    fn action_resets_timer() {
        let mut b = duel(Slot::One);
        b.tick();
        b.tick();
        b.submit(Slot::One, &BattleAction::Attack, &mut FixedDice(0))
            .unwrap();
        assert_eq!(b.turn_time_remaining, MAX_TURN_TIME_SECS);
    }

    #[test]
    fn forfeit_awards_opponent() {
        let mut b = duel(Slot::One);
        assert!(b.forfeit(Slot::One));
        let outcome = b.outcome.unwrap();
        assert_eq!(outcome.winner, Slot::Two);
        assert_eq!(outcome.reason, EndReason::Forfeit);
    }

    #[test]
    fn rewards_from_loser_level() {
        assert_eq!(
            Rewards::for_loser_level(5),
            Rewards {
                experience: 100,
                gold: 55
            }
        );
        assert_eq!(
            Rewards::for_loser_level(1),
            Rewards {
                experience: 40,
                gold: 23
            }
        );
    }

    #[test]
    fn log_is_append_only_with_turns() {
        let mut b = duel(Slot::One);
        let mut dice = FixedDice(0);
        let mut prev = b.log.clone();
        for _ in 0..4 {
            let slot = b.current_turn;
            b.submit(slot, &BattleAction::Attack, &mut dice).unwrap();
            assert!(b.log.len() > prev.len());
            assert_eq!(&b.log[..prev.len()], &prev[..]);
            prev = b.log.clone();
        }
        assert!(b.log.windows(2).all(|w| w[0].turn <= w[1].turn));
    }

    #[test]
    fn long_battle_keeps_only_recent_log() {
        let mut b = Battle::new(
            "b-long".to_string(),
            make_combatant("A", CharacterClass::Fighter, 700, 1, 0),
            make_combatant("B", CharacterClass::Fighter, 700, 1, 0),
            Slot::One,
            MAX_TURN_TIME_SECS,
        );
        let mut dice = FixedDice(0);
        let mut actions = 0;
        while b.is_active() {
            let slot = b.current_turn;
            b.submit(slot, &BattleAction::Attack, &mut dice).unwrap();
            actions += 1;
        }
        assert_eq!(actions, 1399);
        assert_eq!(b.log.len(), MAX_LOG_ENTRIES);
        assert_eq!(b.log_truncated as usize + MAX_LOG_ENTRIES, 2 + 1398 * 2 + 1 + 2);
        assert!(b.log.last().unwrap().message.contains("gains"));
        assert!(b.log.windows(2).all(|w| w[0].turn <= w[1].turn));
    }

    #[test]
    fn rewards_saturate_at_max_level() {
        let r = Rewards::for_loser_level(u32::MAX);
        assert_eq!(r.experience, u32::MAX);
        assert_eq!(r.gold, u32::MAX);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn turns_alternate_until_finished(
                rolls in proptest::collection::vec(0u32..5, 1..40),
                first_two in any::<bool>(),
            ) {
                let first = if first_two { Slot::Two } else { Slot::One };
                let mut b = duel(first);
                for roll in rolls {
                    if !b.is_active() {
                        break;
                    }
                    let before = b.current_turn;
                    let count = b.turn_count;
                    b.submit(before, &BattleAction::Attack, &mut FixedDice(roll)).unwrap();
                    if b.is_active() {
                        prop_assert_eq!(b.current_turn, before.other());
                        prop_assert_eq!(b.turn_count, count + 1);
                    } else {
                        prop_assert!(b.combatants.iter().any(|c| c.health == 0));
                        prop_assert!(b.outcome.is_some());
                    }
                    for c in &b.combatants {
                        prop_assert!(c.health <= c.max_health);
                    }
                }
            }
        }
    }
}
