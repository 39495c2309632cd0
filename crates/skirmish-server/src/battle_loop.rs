use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use skirmish_core::action::{BattleAction, Dice};
use skirmish_core::battle::{Battle, BattleId, Slot, TickResult};
use skirmish_core::net::messages::{
    ActionRejectedMsg, BattleEndMsg, BattleStartMsg, BattleTimerTickMsg, BattleUpdateMsg,
    MessageType, ServerMessage,
};
use skirmish_core::net::protocol::{ProtocolError, encode_message, encode_server_message};
use skirmish_core::player::PlayerId;

use crate::coordinator::PlayerSender;

/// Commands sent from the coordinator to a battle task.
#[derive(Debug)]
pub enum BattleCommand {
    Action {
        player_id: PlayerId,
        slot: Slot,
        action: BattleAction,
    },
    Forfeit {
        slot: Slot,
    },
    Stop,
}

/// Latest public view of a running battle, published after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattleSummary {
    pub battle_id: BattleId,
    pub players: [String; 2],
    pub current_turn: u8,
    pub turn_count: u32,
    pub turn_time_remaining: u32,
    pub active: bool,
}

impl BattleSummary {
    pub fn of(battle: &Battle) -> Self {
        Self {
            battle_id: battle.id.clone(),
            players: [
                battle.combatants[0].name.clone(),
                battle.combatants[1].name.clone(),
            ],
            current_turn: battle.current_turn.number(),
            turn_count: battle.turn_count,
            turn_time_remaining: battle.turn_time_remaining,
            active: battle.is_active(),
        }
    }
}

/// Everything a battle task needs to run on its own.
pub struct BattleSession {
    pub battle: Battle,
    pub player_ids: [PlayerId; 2],
    pub senders: [PlayerSender; 2],
    pub tick_interval: Duration,
    pub dice: Box<dyn Dice + Send>,
}

pub struct SpawnedBattle {
    pub cmd_tx: mpsc::UnboundedSender<BattleCommand>,
    pub summary_rx: watch::Receiver<BattleSummary>,
    /// Resolves to the final battle state once the task exits.
    pub handle: JoinHandle<Battle>,
}

/// Spawn the task that owns a battle. Actions and clock ticks for the battle
/// are applied in the order the task receives them.
pub fn spawn_battle(session: BattleSession) -> SpawnedBattle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (summary_tx, summary_rx) = watch::channel(BattleSummary::of(&session.battle));

    let handle = tokio::spawn(run_battle_loop(session, cmd_rx, summary_tx));

    SpawnedBattle {
        cmd_tx,
        summary_rx,
        handle,
    }
}

async fn run_battle_loop(
    mut session: BattleSession,
    mut cmd_rx: mpsc::UnboundedReceiver<BattleCommand>,
    summary_tx: watch::Sender<BattleSummary>,
) -> Battle {
    let battle_id = session.battle.id.clone();
    tracing::info!(
        battle_id = %battle_id,
        player1 = session.player_ids[0],
        player2 = session.player_ids[1],
        "Battle started"
    );

    let start = ServerMessage::BattleStart(Box::new(BattleStartMsg {
        battle_id: battle_id.clone(),
        player1_id: session.player_ids[0],
        player2_id: session.player_ids[1],
        combatants: session.battle.combatants.clone(),
        current_turn: session.battle.current_turn,
        turn_time_remaining: session.battle.turn_time_remaining,
    }));
    broadcast(&session, &start);

    let tick = session.tick_interval;
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let msg = match session.battle.tick() {
                    TickResult::Countdown(remaining) => BattleTimerTickMsg {
                        battle_id: battle_id.clone(),
                        turn_time_remaining: remaining,
                        current_turn: session.battle.current_turn,
                        skipped: None,
                    },
                    TickResult::TimedOut { skipped } => {
                        tracing::info!(
                            battle_id = %battle_id,
                            player_id = session.player_ids[skipped.index()],
                            "Turn timed out"
                        );
                        BattleTimerTickMsg {
                            battle_id: battle_id.clone(),
                            turn_time_remaining: session.battle.turn_time_remaining,
                            current_turn: session.battle.current_turn,
                            skipped: Some(skipped),
                        }
                    },
                    TickResult::Idle => break,
                };
                summary_tx.send_replace(BattleSummary::of(&session.battle));
                broadcast(&session, &ServerMessage::BattleTimerTick(msg));
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BattleCommand::Action { player_id, slot, action }) => {
                        let BattleSession { battle, dice, .. } = &mut session;
                        match battle.submit(slot, &action, dice.as_mut()) {
                            Ok(outcome) => {
                                tracing::debug!(
                                    battle_id = %battle_id,
                                    player_id,
                                    message = %outcome.message,
                                    "Action resolved"
                                );
                                let update = ServerMessage::BattleUpdate(Box::new(BattleUpdateMsg {
                                    battle_id: battle_id.clone(),
                                    actor: slot,
                                    result_message: outcome.message,
                                    effect: outcome.effect,
                                    magnitude: outcome.magnitude,
                                    combatants: session.battle.combatants.clone(),
                                    current_turn: session.battle.current_turn,
                                    turn_count: session.battle.turn_count,
                                    turn_time_remaining: session.battle.turn_time_remaining,
                                    status: session.battle.status,
                                }));
                                summary_tx.send_replace(BattleSummary::of(&session.battle));
                                broadcast(&session, &update);
                                if !session.battle.is_active() {
                                    break;
                                }
                                interval.reset();
                            },
                            Err(error) => {
                                tracing::debug!(
                                    battle_id = %battle_id,
                                    player_id,
                                    error = %error,
                                    "Action rejected"
                                );
                                let rejected = ServerMessage::ActionRejected(ActionRejectedMsg {
                                    battle_id: battle_id.clone(),
                                    error,
                                });
                                send_to_slot(&session, slot, &rejected);
                            },
                        }
                    },
                    Some(BattleCommand::Forfeit { slot }) => {
                        if session.battle.forfeit(slot) {
                            summary_tx.send_replace(BattleSummary::of(&session.battle));
                            break;
                        }
                    },
                    Some(BattleCommand::Stop) | None => {
                        tracing::info!(battle_id = %battle_id, "Battle stopped");
                        return session.battle;
                    },
                }
            }
        }
    }

    if let Some(outcome) = &session.battle.outcome {
        tracing::info!(
            battle_id = %battle_id,
            winner = %outcome.winner_name,
            loser = %outcome.loser_name,
            reason = %outcome.reason,
            turns = session.battle.turn_count,
            "Battle finished"
        );
        if let Some(data) = encode_battle_end(&session.battle) {
            broadcast_bytes(&session, data);
        }
    }

    session.battle
}

/// Encode the final BattleEnd for a finished battle. The log is cut from
/// the front until the message fits on the wire.
fn encode_battle_end(battle: &Battle) -> Option<Bytes> {
    let outcome = battle.outcome.as_ref()?;
    let mut end = BattleEndMsg {
        battle_id: battle.id.clone(),
        winner: outcome.winner,
        winner_name: outcome.winner_name.clone(),
        loser_name: outcome.loser_name.clone(),
        end_reason: outcome.reason,
        rewards: outcome.rewards,
        battle_log: battle.log.clone(),
        log_truncated: battle.log_truncated,
        combatants: battle.combatants.clone(),
    };
    loop {
        match encode_message(MessageType::BattleEnd, &end) {
            Ok(data) => return Some(Bytes::from(data)),
            Err(ProtocolError::PayloadTooLarge(size)) if !end.battle_log.is_empty() => {
                let cut = end.battle_log.len().div_ceil(2);
                tracing::warn!(battle_id = %battle.id, size, cut, "BattleEnd too large, trimming log");
                end.battle_log.drain(..cut);
                end.log_truncated = end.log_truncated.saturating_add(cut as u32);
            },
            Err(e) => {
                tracing::error!(battle_id = %battle.id, error = %e, "Failed to encode BattleEnd");
                return None;
            },
        }
    }
}

fn encode(session: &BattleSession, msg: &ServerMessage) -> Option<Bytes> {
    match encode_server_message(msg) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            tracing::error!(
                battle_id = %session.battle.id,
                msg_type = ?msg.message_type(),
                error = %e,
                "Failed to encode battle message"
            );
            None
        },
    }
}

fn broadcast(session: &BattleSession, msg: &ServerMessage) {
    if let Some(data) = encode(session, msg) {
        broadcast_bytes(session, data);
    }
}

fn broadcast_bytes(session: &BattleSession, data: Bytes) {
    for (sender, &player_id) in session.senders.iter().zip(&session.player_ids) {
        if sender.try_send(data.clone()).is_err() {
            tracing::debug!(
                player_id,
                battle_id = %session.battle.id,
                "Skipping battle broadcast to slow client (channel full or closed)"
            );
        }
    }
}

fn send_to_slot(session: &BattleSession, slot: Slot, msg: &ServerMessage) {
    let Some(data) = encode(session, msg) else {
        return;
    };
    if session.senders[slot.index()].try_send(data).is_err() {
        tracing::debug!(
            player_id = session.player_ids[slot.index()],
            battle_id = %session.battle.id,
            "Failed to send to player (slow or disconnected)"
        );
    }
}
