//! Client half of a battle.
//!
//! The adapter turns local intent into [`ClientMessage`]s and folds inbound
//! [`ServerMessage`]s into local mirrors for display. It never resolves an
//! action itself: combatant state only changes when the server says so.

use skirmish_core::action::BattleAction;
use skirmish_core::battle::{BattleId, BattleStatus, EndReason, Rewards, Slot};
use skirmish_core::challenge::ChallengeId;
use skirmish_core::character::{CharacterSheet, ItemKind};
use skirmish_core::combatant::Combatant;
use skirmish_core::error::PvpError;
use skirmish_core::net::messages::{
    BattleActionMsg, ChallengeNotifyMsg, ChallengeProposeMsg, ChallengeRespondMsg, ClientMessage,
    PlayersListRequestMsg, ServerMessage, SetCharacterMsg,
};
use skirmish_core::player::{PlayerId, PlayerSummary};

/// Local mirror of the battle the player is (or was last) in.
#[derive(Debug, Clone)]
pub struct LocalBattle {
    pub battle_id: BattleId,
    pub my_slot: Slot,
    pub combatants: [Combatant; 2],
    pub current_turn: Slot,
    pub turn_count: u32,
    pub turn_time_remaining: u32,
    pub status: BattleStatus,
    pub log: Vec<String>,
}

impl LocalBattle {
    pub fn me(&self) -> &Combatant {
        &self.combatants[self.my_slot.index()]
    }

    pub fn opponent(&self) -> &Combatant {
        &self.combatants[self.my_slot.other().index()]
    }

    pub fn is_my_turn(&self) -> bool {
        self.status == BattleStatus::Active && self.current_turn == self.my_slot
    }
}

/// What changed after applying one server message.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Joined(PlayerId),
    JoinRejected(String),
    PlayersChanged(usize),
    ChallengeSent {
        challenge_id: ChallengeId,
        target_name: String,
    },
    ChallengeReceived(ChallengeNotifyMsg),
    ChallengeAnswered {
        challenge_id: ChallengeId,
        accepted: bool,
        responder_name: String,
    },
    ChallengeCancelled {
        challenge_id: ChallengeId,
        reason: String,
    },
    BattleStarted {
        battle_id: BattleId,
        opponent: String,
        my_turn: bool,
    },
    BattleUpdated {
        message: String,
        my_turn: bool,
    },
    TimerTick {
        remaining: u32,
        my_turn: bool,
        skipped: Option<Slot>,
    },
    BattleEnded {
        won: bool,
        winner_name: String,
        reason: EndReason,
        rewards: Rewards,
    },
    ActionRejected(PvpError),
    RequestFailed(PvpError),
    CharacterUpdated {
        levelled_up: bool,
    },
    Notice(String),
}

#[derive(Debug, Clone)]
pub struct BattleAdapter {
    player_id: PlayerId,
    character: Option<CharacterSheet>,
    players: Vec<PlayerSummary>,
    incoming: Vec<ChallengeNotifyMsg>,
    battle: Option<LocalBattle>,
}

impl BattleAdapter {
    pub fn new(player_id: PlayerId, character: Option<CharacterSheet>) -> Self {
        Self {
            player_id,
            character,
            players: Vec::new(),
            incoming: Vec::new(),
            battle: None,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn character(&self) -> Option<&CharacterSheet> {
        self.character.as_ref()
    }

    pub fn players(&self) -> &[PlayerSummary] {
        &self.players
    }

    pub fn incoming_challenges(&self) -> &[ChallengeNotifyMsg] {
        &self.incoming
    }

    pub fn battle(&self) -> Option<&LocalBattle> {
        self.battle.as_ref()
    }

    fn active_battle(&self) -> Option<&LocalBattle> {
        self.battle
            .as_ref()
            .filter(|b| b.status == BattleStatus::Active)
    }

    // ================================================================
    // Intent -> ClientMessage
    // ================================================================

    pub fn request_players(&self) -> ClientMessage {
        ClientMessage::PlayersListRequest(PlayersListRequestMsg::default())
    }

    pub fn set_character(&mut self, character: CharacterSheet) -> Result<ClientMessage, PvpError> {
        if self.active_battle().is_some() {
            return Err(PvpError::PlayerBusy);
        }
        self.character = Some(character.clone());
        Ok(ClientMessage::SetCharacter(Box::new(SetCharacterMsg {
            character,
        })))
    }

    pub fn challenge(&self, target_id: PlayerId) -> Result<ClientMessage, PvpError> {
        match &self.character {
            None => return Err(PvpError::CharacterRequired),
            Some(sheet) if !sheet.is_alive() => return Err(PvpError::CharacterDefeated),
            Some(_) => {},
        }
        if target_id == self.player_id {
            return Err(PvpError::TargetUnavailable);
        }
        if self.active_battle().is_some() {
            return Err(PvpError::PlayerBusy);
        }
        Ok(ClientMessage::ChallengePropose(ChallengeProposeMsg {
            target_id,
        }))
    }

    /// Answer a challenge this client was notified about.
    pub fn respond(
        &mut self,
        challenge_id: &str,
        accepted: bool,
    ) -> Result<ClientMessage, PvpError> {
        let Some(index) = self
            .incoming
            .iter()
            .position(|c| c.challenge_id == challenge_id)
        else {
            return Err(PvpError::ChallengeNotFound);
        };
        self.incoming.remove(index);
        Ok(ClientMessage::ChallengeRespond(ChallengeRespondMsg {
            challenge_id: challenge_id.to_string(),
            accepted,
        }))
    }

    /// Submit an action, pre-checked against the local mirror. The server
    /// re-validates everything.
    pub fn act(&self, action: BattleAction) -> Result<ClientMessage, PvpError> {
        let battle = self.active_battle().ok_or(PvpError::BattleNotActive)?;
        if !battle.is_my_turn() {
            return Err(PvpError::NotYourTurn);
        }
        let me = battle.me();
        match &action {
            BattleAction::Skill { name } => {
                let skill = me
                    .skill(name)
                    .ok_or_else(|| PvpError::UnknownSkill(name.clone()))?;
                if me.mana < skill.mana_cost {
                    return Err(PvpError::InsufficientMana {
                        skill: skill.name.clone(),
                        cost: skill.mana_cost,
                        available: me.mana,
                    });
                }
            },
            BattleAction::Item { name } => {
                let item = me
                    .inventory
                    .item(name)
                    .ok_or_else(|| PvpError::ItemNotOwned(name.clone()))?;
                if item.kind != ItemKind::Consumable {
                    return Err(PvpError::ItemNotUsable(name.clone()));
                }
            },
            BattleAction::Attack | BattleAction::Surrender => {},
        }
        Ok(ClientMessage::BattleAction(BattleActionMsg {
            battle_id: battle.battle_id.clone(),
            action,
        }))
    }

    pub fn attack(&self) -> Result<ClientMessage, PvpError> {
        self.act(BattleAction::Attack)
    }

    pub fn cast(&self, skill: &str) -> Result<ClientMessage, PvpError> {
        self.act(BattleAction::Skill {
            name: skill.to_string(),
        })
    }

    pub fn use_item(&self, item: &str) -> Result<ClientMessage, PvpError> {
        self.act(BattleAction::Item {
            name: item.to_string(),
        })
    }

    pub fn surrender(&self) -> Result<ClientMessage, PvpError> {
        self.act(BattleAction::Surrender)
    }

    // ================================================================
    // ServerMessage -> local state
    // ================================================================

    pub fn apply(&mut self, msg: ServerMessage) -> Vec<AdapterEvent> {
        match msg {
            ServerMessage::JoinLobbyResponse(resp) => match (resp.success, resp.player_id) {
                (true, Some(id)) => {
                    self.player_id = id;
                    vec![AdapterEvent::Joined(id)]
                },
                _ => vec![AdapterEvent::JoinRejected(
                    resp.error.unwrap_or_else(|| "join rejected".to_string()),
                )],
            },
            ServerMessage::PlayersList(list) => {
                self.players = list.players;
                vec![AdapterEvent::PlayersChanged(self.players.len())]
            },
            ServerMessage::ChallengeCreated(c) => vec![AdapterEvent::ChallengeSent {
                challenge_id: c.challenge_id,
                target_name: c.target_name,
            }],
            ServerMessage::ChallengeNotify(n) => {
                self.incoming.retain(|c| c.challenge_id != n.challenge_id);
                self.incoming.push(n.clone());
                vec![AdapterEvent::ChallengeReceived(n)]
            },
            ServerMessage::ChallengeResult(r) => {
                self.incoming.retain(|c| c.challenge_id != r.challenge_id);
                vec![AdapterEvent::ChallengeAnswered {
                    challenge_id: r.challenge_id,
                    accepted: r.accepted,
                    responder_name: r.responder_name,
                }]
            },
            ServerMessage::ChallengeCancelled(c) => {
                self.incoming.retain(|p| p.challenge_id != c.challenge_id);
                vec![AdapterEvent::ChallengeCancelled {
                    challenge_id: c.challenge_id,
                    reason: c.reason,
                }]
            },
            ServerMessage::BattleStart(start) => {
                let my_slot = if start.player1_id == self.player_id {
                    Slot::One
                } else {
                    Slot::Two
                };
                let battle = LocalBattle {
                    battle_id: start.battle_id.clone(),
                    my_slot,
                    combatants: start.combatants,
                    current_turn: start.current_turn,
                    turn_count: 0,
                    turn_time_remaining: start.turn_time_remaining,
                    status: BattleStatus::Active,
                    log: Vec::new(),
                };
                let event = AdapterEvent::BattleStarted {
                    battle_id: start.battle_id,
                    opponent: battle.opponent().name.clone(),
                    my_turn: battle.is_my_turn(),
                };
                self.incoming.clear();
                self.battle = Some(battle);
                vec![event]
            },
            ServerMessage::BattleUpdate(update) => {
                let Some(battle) = self.battle_mut(&update.battle_id) else {
                    return Vec::new();
                };
                battle.combatants = update.combatants;
                battle.current_turn = update.current_turn;
                battle.turn_count = update.turn_count;
                battle.turn_time_remaining = update.turn_time_remaining;
                battle.status = update.status;
                battle.log.push(update.result_message.clone());
                vec![AdapterEvent::BattleUpdated {
                    message: update.result_message,
                    my_turn: battle.is_my_turn(),
                }]
            },
            ServerMessage::BattleTimerTick(tick) => {
                let Some(battle) = self.battle_mut(&tick.battle_id) else {
                    return Vec::new();
                };
                battle.turn_time_remaining = tick.turn_time_remaining;
                battle.current_turn = tick.current_turn;
                if tick.skipped.is_some() {
                    battle.turn_count += 1;
                }
                vec![AdapterEvent::TimerTick {
                    remaining: tick.turn_time_remaining,
                    my_turn: battle.is_my_turn(),
                    skipped: tick.skipped,
                }]
            },
            ServerMessage::BattleEnd(end) => {
                let Some(battle) = self.battle_mut(&end.battle_id) else {
                    return Vec::new();
                };
                battle.combatants = end.combatants;
                battle.status = BattleStatus::Finished;
                battle.log = (end.log_truncated > 0)
                    .then(|| format!("({} earlier entries omitted)", end.log_truncated))
                    .into_iter()
                    .chain(end.battle_log.into_iter().map(|e| e.message))
                    .collect();
                vec![AdapterEvent::BattleEnded {
                    won: end.winner == battle.my_slot,
                    winner_name: end.winner_name,
                    reason: end.end_reason,
                    rewards: end.rewards,
                }]
            },
            ServerMessage::ActionRejected(r) => vec![AdapterEvent::ActionRejected(r.error)],
            ServerMessage::RequestFailed(f) => vec![AdapterEvent::RequestFailed(f.error)],
            ServerMessage::CharacterUpdate(update) => {
                self.character = Some(update.character);
                vec![AdapterEvent::CharacterUpdated {
                    levelled_up: update.levelled_up,
                }]
            },
            ServerMessage::SystemNotice(n) => vec![AdapterEvent::Notice(n.message)],
        }
    }

    fn battle_mut(&mut self, battle_id: &str) -> Option<&mut LocalBattle> {
        let battle = self.battle.as_mut()?;
        if battle.battle_id != battle_id {
            tracing::debug!(battle_id, "Ignoring message for another battle");
            return None;
        }
        Some(battle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::action::EffectKind;
    use skirmish_core::battle::LogEntry;
    use skirmish_core::character::{CharacterClass, HEALTH_POTION, MANA_POTION};
    use skirmish_core::net::messages::{
        ActionRejectedMsg, BattleEndMsg, BattleStartMsg, BattleTimerTickMsg, BattleUpdateMsg,
        ChallengeCancelledMsg,
    };
    use skirmish_core::test_helpers::{make_combatant, make_sheet};

    fn adapter() -> BattleAdapter {
        BattleAdapter::new(2, Some(make_sheet("Bo", CharacterClass::Mage)))
    }

    fn start_msg(current_turn: Slot) -> ServerMessage {
        let mut mage = Combatant::from_sheet(&make_sheet("Bo", CharacterClass::Mage));
        mage.mana = 15;
        ServerMessage::BattleStart(Box::new(BattleStartMsg {
            battle_id: "b1".to_string(),
            player1_id: 1,
            player2_id: 2,
            combatants: [make_combatant("Ann", CharacterClass::Fighter, 100, 15, 0), mage],
            current_turn,
            turn_time_remaining: 30,
        }))
    }

    fn started(current_turn: Slot) -> BattleAdapter {
        let mut a = adapter();
        a.apply(start_msg(current_turn));
        a
    }

    #[test]
    fn battle_start_resolves_own_slot() {
        let mut a = adapter();
        let events = a.apply(start_msg(Slot::Two));
        assert_eq!(
            events,
            vec![AdapterEvent::BattleStarted {
                battle_id: "b1".to_string(),
                opponent: "Ann".to_string(),
                my_turn: true,
            }]
        );
        let battle = a.battle().unwrap();
        assert_eq!(battle.my_slot, Slot::Two);
        assert_eq!(battle.me().name, "Bo");
    }

    #[test]
    fn act_requires_turn_and_active_battle() {
        assert_eq!(adapter().attack(), Err(PvpError::BattleNotActive));
        assert_eq!(started(Slot::One).attack(), Err(PvpError::NotYourTurn));

        let msg = started(Slot::Two).attack().unwrap();
        assert!(matches!(
            msg,
            ClientMessage::BattleAction(BattleActionMsg { ref battle_id, action: BattleAction::Attack })
                if battle_id == "b1"
        ));
    }

    #[test]
    fn skill_prechecks_use_local_mirror() {
        let a = started(Slot::Two);
        assert_eq!(
            a.cast("Heal"),
            Err(PvpError::UnknownSkill("Heal".to_string()))
        );
        // Fireball costs more than the 15 mana left
        assert!(matches!(
            a.cast("Fireball"),
            Err(PvpError::InsufficientMana { available: 15, .. })
        ));
    }

    #[test]
    fn item_prechecks() {
        let a = started(Slot::Two);
        assert!(a.use_item(HEALTH_POTION).is_ok());
        assert!(a.use_item(MANA_POTION).is_ok());
        assert_eq!(
            a.use_item("Magic Ring"),
            Err(PvpError::ItemNotOwned("Magic Ring".to_string()))
        );
    }

    #[test]
    fn updates_replace_mirrors_without_local_resolution() {
        let mut a = started(Slot::Two);
        let before = a.battle().unwrap().combatants.clone();
        a.attack().unwrap();
        // Building the message changes nothing locally
        assert_eq!(a.battle().unwrap().combatants, before);

        let mut after = before.clone();
        after[0].health = 80;
        let events = a.apply(ServerMessage::BattleUpdate(Box::new(BattleUpdateMsg {
            battle_id: "b1".to_string(),
            actor: Slot::Two,
            result_message: "Bo attacks Ann for 20 damage!".to_string(),
            effect: EffectKind::Damage,
            magnitude: 20,
            combatants: after.clone(),
            current_turn: Slot::One,
            turn_count: 1,
            turn_time_remaining: 30,
            status: BattleStatus::Active,
        })));
        assert_eq!(
            events,
            vec![AdapterEvent::BattleUpdated {
                message: "Bo attacks Ann for 20 damage!".to_string(),
                my_turn: false,
            }]
        );
        let battle = a.battle().unwrap();
        assert_eq!(battle.combatants, after);
        assert_eq!(battle.opponent().health, 80);
        assert_eq!(battle.log, vec!["Bo attacks Ann for 20 damage!".to_string()]);
    }

    #[test]
    fn timer_ticks_track_clock_and_skips() {
        let mut a = started(Slot::Two);
        let tick = |remaining, current_turn, skipped| {
            ServerMessage::BattleTimerTick(BattleTimerTickMsg {
                battle_id: "b1".to_string(),
                turn_time_remaining: remaining,
                current_turn,
                skipped,
            })
        };
        a.apply(tick(29, Slot::Two, None));
        assert_eq!(a.battle().unwrap().turn_time_remaining, 29);

        let events = a.apply(tick(30, Slot::One, Some(Slot::Two)));
        assert_eq!(
            events,
            vec![AdapterEvent::TimerTick {
                remaining: 30,
                my_turn: false,
                skipped: Some(Slot::Two),
            }]
        );
        assert_eq!(a.battle().unwrap().turn_count, 1);
        assert_eq!(a.attack(), Err(PvpError::NotYourTurn));
    }

    #[test]
    fn messages_for_other_battles_are_ignored() {
        let mut a = started(Slot::Two);
        let events = a.apply(ServerMessage::BattleTimerTick(BattleTimerTickMsg {
            battle_id: "other".to_string(),
            turn_time_remaining: 1,
            current_turn: Slot::One,
            skipped: None,
        }));
        assert!(events.is_empty());
        assert_eq!(a.battle().unwrap().turn_time_remaining, 30);
    }

    #[test]
    fn battle_end_finishes_mirror() {
        let mut a = started(Slot::Two);
        let combatants = a.battle().unwrap().combatants.clone();
        let events = a.apply(ServerMessage::BattleEnd(Box::new(BattleEndMsg {
            battle_id: "b1".to_string(),
            winner: Slot::Two,
            winner_name: "Bo".to_string(),
            loser_name: "Ann".to_string(),
            end_reason: EndReason::Surrender,
            rewards: Rewards::for_loser_level(1),
            battle_log: vec![LogEntry {
                message: "Battle begins! Ann vs Bo".to_string(),
                turn: 0,
                timestamp: 0,
            }],
            log_truncated: 4,
            combatants,
        })));
        assert!(matches!(
            events.as_slice(),
            [AdapterEvent::BattleEnded { won: true, reason: EndReason::Surrender, .. }]
        ));
        let battle = a.battle().unwrap();
        assert_eq!(battle.status, BattleStatus::Finished);
        assert_eq!(battle.log, ["(4 earlier entries omitted)", "Battle begins! Ann vs Bo"]);
        assert_eq!(a.attack(), Err(PvpError::BattleNotActive));
    }

    #[test]
    fn challenge_flow() {
        let mut a = adapter();
        assert_eq!(a.challenge(2), Err(PvpError::TargetUnavailable));
        assert!(a.challenge(1).is_ok());
        assert_eq!(
            BattleAdapter::new(3, None).challenge(1),
            Err(PvpError::CharacterRequired)
        );
        let mut beaten = make_sheet("Cy", CharacterClass::Rogue);
        beaten.health = 0;
        assert_eq!(
            BattleAdapter::new(3, Some(beaten)).challenge(1),
            Err(PvpError::CharacterDefeated)
        );

        assert_eq!(a.respond("c1", true), Err(PvpError::ChallengeNotFound));
        a.apply(ServerMessage::ChallengeNotify(ChallengeNotifyMsg {
            challenge_id: "c1".to_string(),
            challenger_id: 1,
            challenger_name: "Ann".to_string(),
            challenger_class: CharacterClass::Fighter,
            challenger_level: 3,
        }));
        assert_eq!(a.incoming_challenges().len(), 1);
        assert!(a.respond("c1", false).is_ok());
        assert!(a.incoming_challenges().is_empty());

        a.apply(ServerMessage::ChallengeNotify(ChallengeNotifyMsg {
            challenge_id: "c2".to_string(),
            challenger_id: 1,
            challenger_name: "Ann".to_string(),
            challenger_class: CharacterClass::Fighter,
            challenger_level: 3,
        }));
        a.apply(ServerMessage::ChallengeCancelled(ChallengeCancelledMsg {
            challenge_id: "c2".to_string(),
            reason: "Challenge expired".to_string(),
        }));
        assert!(a.incoming_challenges().is_empty());
    }

    #[test]
    fn busy_adapter_refuses_new_challenges() {
        let a = started(Slot::One);
        assert_eq!(a.challenge(1), Err(PvpError::PlayerBusy));
    }

    #[test]
    fn rejection_surfaces_as_event() {
        let mut a = started(Slot::Two);
        let events = a.apply(ServerMessage::ActionRejected(ActionRejectedMsg {
            battle_id: "b1".to_string(),
            error: PvpError::NotYourTurn,
        }));
        assert_eq!(events, vec![AdapterEvent::ActionRejected(PvpError::NotYourTurn)]);
    }
}
