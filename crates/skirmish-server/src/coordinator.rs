use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use skirmish_core::action::{BattleAction, RandomDice};
use skirmish_core::battle::{Battle, BattleId, Slot};
use skirmish_core::challenge::{Challenge, ChallengeBroker, Roster};
use skirmish_core::character::CharacterSheet;
use skirmish_core::error::PvpError;
use skirmish_core::net::messages::{
    ChallengeCancelledMsg, ChallengeCreatedMsg, ChallengeNotifyMsg, ChallengeResultMsg,
    CharacterUpdateMsg, JoinLobbyResponseMsg, PlayersListMsg, ServerMessage, SystemNoticeMsg,
};
use skirmish_core::net::protocol::{ProtocolError, encode_server_message};
use skirmish_core::player::{PlayerId, PlayerSummary};

use crate::battle_loop::{BattleCommand, BattleSession, BattleSummary, spawn_battle};
use crate::config::{BattleConfig, ServerConfig};
use crate::state::SharedCoordinator;

/// Per-player sender for outbound WebSocket binary messages.
/// Bounded so a slow client cannot grow server memory without limit.
pub type PlayerSender = mpsc::Sender<Bytes>;

/// One connected lobby member.
struct Session {
    name: String,
    sender: PlayerSender,
    character: Option<CharacterSheet>,
    battle: Option<BattleId>,
}

/// Coordinator-side handle on a running battle task.
struct BattleHandle {
    cmd_tx: mpsc::UnboundedSender<BattleCommand>,
    participants: [PlayerId; 2],
    summary: watch::Receiver<BattleSummary>,
}

/// Roster view over the session table, borrowed separately from the broker.
struct SessionRoster<'a>(&'a HashMap<PlayerId, Session>);

impl Roster for SessionRoster<'_> {
    fn character(&self, player: PlayerId) -> Option<&CharacterSheet> {
        self.0.get(&player).and_then(|s| s.character.as_ref())
    }

    fn is_busy(&self, player: PlayerId) -> bool {
        self.0.get(&player).is_some_and(|s| s.battle.is_some())
    }
}

/// The single authority over sessions, pending challenges and battles.
///
/// Battle state itself lives in one task per battle (see
/// [`crate::battle_loop`]); the coordinator only routes commands to it and
/// reconciles the outcome with the live character sheets afterwards.
pub struct Coordinator {
    sessions: HashMap<PlayerId, Session>,
    next_player_id: PlayerId,
    broker: ChallengeBroker,
    battles: HashMap<BattleId, BattleHandle>,
    battle_config: BattleConfig,
    dice: RandomDice<rand::rngs::StdRng>,
}

impl Coordinator {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            next_player_id: 1,
            broker: ChallengeBroker::new(config.challenges.ttl()),
            battles: HashMap::new(),
            battle_config: config.battle.clone(),
            dice: RandomDice::from_entropy(),
        }
    }

    fn alloc_player_id(&mut self) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;
        id
    }

    // ================================================================
    // Sessions
    // ================================================================

    /// Register a new session. Display names are unique among online
    /// players, and a submitted sheet always carries the session's name.
    pub fn join(
        &mut self,
        name: String,
        character: Option<CharacterSheet>,
        sender: PlayerSender,
    ) -> Result<PlayerId, String> {
        if self.sessions.values().any(|s| s.name == name) {
            return Err(format!("Name already taken: {name}"));
        }
        if let Some(sheet) = &character {
            sheet.validate().map_err(|e| e.to_string())?;
        }
        let player_id = self.alloc_player_id();
        let character = character.map(|mut sheet| {
            sheet.name = name.clone();
            sheet
        });
        tracing::info!(player_id, name = %name, has_character = character.is_some(), "Player joined lobby");
        self.sessions.insert(
            player_id,
            Session {
                name,
                sender,
                character,
                battle: None,
            },
        );
        Ok(player_id)
    }

    /// Replace a player's sheet. Not allowed mid-battle or with a sheet
    /// that fails [`CharacterSheet::validate`].
    pub fn set_character(
        &mut self,
        player_id: PlayerId,
        mut sheet: CharacterSheet,
    ) -> Result<(), PvpError> {
        let session = self
            .sessions
            .get_mut(&player_id)
            .ok_or(PvpError::TargetUnavailable)?;
        if session.battle.is_some() {
            return Err(PvpError::PlayerBusy);
        }
        sheet.validate()?;
        sheet.name = session.name.clone();
        session.character = Some(sheet);
        Ok(())
    }

    /// Tear down a session: forfeit its battle and drop its challenges.
    pub fn leave(&mut self, player_id: PlayerId) {
        let Some(session) = self.sessions.remove(&player_id) else {
            return;
        };

        for challenge in self.broker.drop_player(player_id) {
            let other = if challenge.challenger == player_id {
                challenge.target
            } else {
                challenge.challenger
            };
            let reason = format!("{} left the lobby", session.name);
            self.send_cancelled(other, &challenge.id, &reason);
        }

        if let Some(battle_id) = session.battle
            && let Some(handle) = self.battles.get(&battle_id)
        {
            let slot = slot_of(&handle.participants, player_id);
            let opponent = handle.participants[slot.other().index()];
            self.send_message(
                opponent,
                &ServerMessage::SystemNotice(SystemNoticeMsg {
                    message: format!("{} disconnected and forfeits the battle", session.name),
                }),
            );
            if let Err(e) = handle.cmd_tx.send(BattleCommand::Forfeit { slot }) {
                tracing::debug!(player_id, battle_id = %battle_id, error = %e, "Battle already stopped");
            }
        }
    }

    /// Lobby listing as seen by `viewer`: everyone else with a character.
    pub fn players_list_for(&self, viewer: PlayerId) -> Vec<PlayerSummary> {
        let mut players: Vec<PlayerSummary> = self
            .sessions
            .iter()
            .filter(|(id, _)| **id != viewer)
            .filter_map(|(id, s)| {
                s.character
                    .as_ref()
                    .map(|sheet| PlayerSummary::from_sheet(*id, sheet))
            })
            .collect();
        players.sort_by_key(|p| p.id);
        players
    }

    pub fn send_players_list(&self, player_id: PlayerId) {
        let msg = ServerMessage::PlayersList(PlayersListMsg {
            players: self.players_list_for(player_id),
        });
        self.send_message(player_id, &msg);
    }

    pub fn broadcast_players_list(&self) {
        for &player_id in self.sessions.keys() {
            self.send_players_list(player_id);
        }
    }

    pub fn character(&self, player_id: PlayerId) -> Option<&CharacterSheet> {
        self.sessions.get(&player_id)?.character.as_ref()
    }

    pub fn player_name(&self, player_id: PlayerId) -> Option<&str> {
        self.sessions.get(&player_id).map(|s| s.name.as_str())
    }

    // ================================================================
    // Challenges
    // ================================================================

    pub fn propose(&mut self, challenger: PlayerId, target: PlayerId) -> Result<(), PvpError> {
        let roster = SessionRoster(&self.sessions);
        let challenge_id = self
            .broker
            .propose(challenger, target, &roster, Instant::now())?;
        let Some(challenge) = self.broker.get(&challenge_id) else {
            return Err(PvpError::ChallengeNotFound);
        };
        let Some(sheet) = self.character(challenger) else {
            return Err(PvpError::CharacterRequired);
        };

        let notify = ServerMessage::ChallengeNotify(ChallengeNotifyMsg {
            challenge_id: challenge_id.clone(),
            challenger_id: challenger,
            challenger_name: sheet.name.clone(),
            challenger_class: sheet.class,
            challenger_level: sheet.level,
        });
        let created = ServerMessage::ChallengeCreated(ChallengeCreatedMsg {
            challenge_id: challenge_id.clone(),
            target_id: target,
            target_name: challenge.target_name.clone(),
        });
        self.send_message(target, &notify);
        self.send_message(challenger, &created);

        tracing::info!(challenge_id = %challenge_id, challenger, target, "Challenge sent");
        Ok(())
    }

    /// Answer a challenge. Acceptance starts the battle task; its completion
    /// is reported back through `shared`.
    pub fn respond(
        &mut self,
        responder: PlayerId,
        challenge_id: &str,
        accepted: bool,
        shared: SharedCoordinator,
    ) -> Result<(), PvpError> {
        let now = Instant::now();
        if !accepted {
            let challenge = self.broker.decline(challenge_id, responder, now)?;
            tracing::info!(challenge_id, responder, "Challenge declined");
            self.send_challenge_result(&challenge, false);
            return Ok(());
        }

        let pending = self
            .broker
            .get(challenge_id)
            .filter(|c| c.target == responder)
            .cloned();
        let roster = SessionRoster(&self.sessions);
        let accepted = match self.broker.accept(
            challenge_id,
            responder,
            &roster,
            &mut self.dice,
            self.battle_config.turn_time_secs,
            now,
        ) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::info!(challenge_id, responder, error = %e, "Challenge could not be accepted");
                // The record is gone, so the challenger must hear about it
                if let Some(challenge) = pending
                    && self.broker.get(challenge_id).is_none()
                {
                    self.send_cancelled(
                        challenge.challenger,
                        &challenge.id,
                        &format!("{} could not accept: {e}", challenge.target_name),
                    );
                }
                return Err(e);
            },
        };

        tracing::info!(challenge_id, responder, battle_id = %accepted.battle.id, "Challenge accepted");
        self.send_challenge_result(&accepted.challenge, true);
        self.start_battle(
            accepted.battle,
            [accepted.challenge.challenger, accepted.challenge.target],
            shared,
        );
        Ok(())
    }

    fn send_challenge_result(&self, challenge: &Challenge, accepted: bool) {
        let msg = ServerMessage::ChallengeResult(ChallengeResultMsg {
            challenge_id: challenge.id.clone(),
            accepted,
            responder_name: challenge.target_name.clone(),
        });
        self.send_message(challenge.challenger, &msg);
        self.send_message(challenge.target, &msg);
    }

    /// Purge expired challenges, telling both parties. Returns how many.
    pub fn expire_challenges(&mut self, now: Instant) -> usize {
        let expired = self.broker.expire(now);
        for challenge in &expired {
            tracing::debug!(challenge_id = %challenge.id, "Challenge expired");
            for player_id in [challenge.challenger, challenge.target] {
                self.send_cancelled(player_id, &challenge.id, "Challenge expired");
            }
        }
        expired.len()
    }

    fn send_cancelled(&self, player_id: PlayerId, challenge_id: &str, reason: &str) {
        self.send_message(
            player_id,
            &ServerMessage::ChallengeCancelled(ChallengeCancelledMsg {
                challenge_id: challenge_id.to_string(),
                reason: reason.to_string(),
            }),
        );
    }

    /// Cancel every other challenge a new battle's participants were part of.
    fn drop_challenges_of(&mut self, participants: [PlayerId; 2]) {
        for player_id in participants {
            let name = self.player_name(player_id).unwrap_or_default().to_string();
            for challenge in self.broker.drop_player(player_id) {
                tracing::debug!(challenge_id = %challenge.id, player_id, "Challenge dropped for battle");
                let reason = format!("{name} entered a battle");
                for party in [challenge.challenger, challenge.target] {
                    self.send_cancelled(party, &challenge.id, &reason);
                }
            }
        }
    }

    // ================================================================
    // Battles
    // ================================================================

    fn start_battle(
        &mut self,
        battle: Battle,
        participants: [PlayerId; 2],
        shared: SharedCoordinator,
    ) {
        let (Some(one), Some(two)) = (
            self.sessions.get(&participants[0]),
            self.sessions.get(&participants[1]),
        ) else {
            return;
        };
        let senders = [one.sender.clone(), two.sender.clone()];
        let battle_id = battle.id.clone();

        let spawned = spawn_battle(BattleSession {
            battle,
            player_ids: participants,
            senders,
            tick_interval: self.battle_config.tick_interval(),
            dice: Box::new(RandomDice::from_entropy()),
        });

        for player_id in participants {
            if let Some(session) = self.sessions.get_mut(&player_id) {
                session.battle = Some(battle_id.clone());
            }
        }
        self.drop_challenges_of(participants);
        self.battles.insert(
            battle_id.clone(),
            BattleHandle {
                cmd_tx: spawned.cmd_tx,
                participants,
                summary: spawned.summary_rx,
            },
        );

        let handle = spawned.handle;
        tokio::spawn(async move {
            match handle.await {
                Ok(battle) => {
                    let mut coordinator = shared.write().await;
                    coordinator.conclude_battle(battle);
                    coordinator.broadcast_players_list();
                },
                Err(e) => {
                    tracing::error!(battle_id = %battle_id, error = %e, "Battle task failed");
                    shared.write().await.discard_battle(&battle_id);
                },
            }
        });
    }

    /// Route an action to the battle the player is in.
    pub fn submit_action(
        &self,
        player_id: PlayerId,
        battle_id: &str,
        action: BattleAction,
    ) -> Result<(), PvpError> {
        let session = self
            .sessions
            .get(&player_id)
            .ok_or(PvpError::BattleNotActive)?;
        if session.battle.as_deref() != Some(battle_id) {
            return Err(PvpError::BattleNotActive);
        }
        let handle = self
            .battles
            .get(battle_id)
            .ok_or(PvpError::BattleNotActive)?;
        let slot = slot_of(&handle.participants, player_id);
        handle
            .cmd_tx
            .send(BattleCommand::Action {
                player_id,
                slot,
                action,
            })
            .map_err(|_| PvpError::BattleNotActive)
    }

    /// Apply a finished battle to the live sheets: the winner's rewards and
    /// every consumed item. Each participant still online gets their sheet.
    pub fn conclude_battle(&mut self, battle: Battle) {
        let Some(handle) = self.battles.remove(&battle.id) else {
            return;
        };
        for player_id in handle.participants {
            if let Some(session) = self.sessions.get_mut(&player_id) {
                session.battle = None;
            }
        }

        for (index, player_id) in handle.participants.into_iter().enumerate() {
            let slot = Slot::from_index(index);
            let Some(sheet) = self
                .sessions
                .get_mut(&player_id)
                .and_then(|s| s.character.as_mut())
            else {
                continue;
            };

            for item in &battle.combatant(slot).consumed {
                sheet.inventory.remove_item(item, 1);
            }
            let mut levelled_up = false;
            if let Some(outcome) = &battle.outcome
                && outcome.winner == slot
            {
                levelled_up = sheet.apply_rewards(&outcome.rewards);
                tracing::info!(
                    player_id,
                    battle_id = %battle.id,
                    experience = outcome.rewards.experience,
                    gold = outcome.rewards.gold,
                    levelled_up,
                    "Rewards granted"
                );
            }

            let update = ServerMessage::CharacterUpdate(Box::new(CharacterUpdateMsg {
                character: sheet.clone(),
                levelled_up,
            }));
            self.send_message(player_id, &update);
        }
    }

    fn discard_battle(&mut self, battle_id: &str) {
        if let Some(handle) = self.battles.remove(battle_id) {
            for player_id in handle.participants {
                if let Some(session) = self.sessions.get_mut(&player_id) {
                    session.battle = None;
                }
                self.send_message(
                    player_id,
                    &ServerMessage::SystemNotice(SystemNoticeMsg {
                        message: "The battle was aborted by the server".to_string(),
                    }),
                );
            }
        }
    }

    pub fn battle_summaries(&self) -> Vec<BattleSummary> {
        let mut list: Vec<BattleSummary> = self
            .battles
            .values()
            .map(|h| h.summary.borrow().clone())
            .collect();
        list.sort_by(|a, b| a.battle_id.cmp(&b.battle_id));
        list
    }

    pub fn current_battle(&self, player_id: PlayerId) -> Option<&str> {
        self.sessions.get(&player_id)?.battle.as_deref()
    }

    /// Stop every battle task without a result.
    pub fn shutdown(&self) {
        for handle in self.battles.values() {
            let _ = handle.cmd_tx.send(BattleCommand::Stop);
        }
    }

    /// (online players, active battles, pending challenges)
    pub fn stats(&self) -> (usize, usize, usize) {
        (self.sessions.len(), self.battles.len(), self.broker.len())
    }

    // ================================================================
    // Outbound
    // ================================================================

    /// Send a raw binary message to a specific player.
    pub fn send_to_player(&self, player_id: PlayerId, data: Bytes) {
        if let Some(session) = self.sessions.get(&player_id)
            && let Err(e) = session.sender.try_send(data)
        {
            tracing::debug!(
                player_id, error = %e,
                "Failed to send to player (slow or disconnected)"
            );
        }
    }

    pub fn send_message(&self, player_id: PlayerId, msg: &ServerMessage) {
        match encode_server_message(msg) {
            Ok(data) => self.send_to_player(player_id, Bytes::from(data)),
            Err(e) => tracing::error!(
                player_id,
                msg_type = ?msg.message_type(),
                error = %e,
                "Failed to encode message"
            ),
        }
    }

    /// Build a JoinLobbyResponse success message.
    pub fn make_join_response(player_id: PlayerId) -> Result<Vec<u8>, ProtocolError> {
        encode_server_message(&ServerMessage::JoinLobbyResponse(JoinLobbyResponseMsg {
            success: true,
            player_id: Some(player_id),
            error: None,
        }))
    }

    /// Build a JoinLobbyResponse error message.
    pub fn make_join_error(error: &str) -> Result<Vec<u8>, ProtocolError> {
        encode_server_message(&ServerMessage::JoinLobbyResponse(JoinLobbyResponseMsg {
            success: false,
            player_id: None,
            error: Some(error.to_string()),
        }))
    }
}

fn slot_of(participants: &[PlayerId; 2], player_id: PlayerId) -> Slot {
    if participants[0] == player_id {
        Slot::One
    } else {
        Slot::Two
    }
}
