use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::FromRequest;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use skirmish_core::character::CharacterSheet;
use skirmish_core::error::PvpError;
use skirmish_core::net::messages::{
    ActionRejectedMsg, ClientMessage, CharacterUpdateMsg, JoinLobbyMsg, RequestFailedMsg,
    ServerMessage,
};
use skirmish_core::net::protocol::{
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, decode_client_message, decode_message_type,
};
use skirmish_core::player::PlayerId;

use crate::coordinator::Coordinator;
use crate::state::{AppState, ConnectionGuard};

type WsSink = futures::stream::SplitSink<WebSocket, Message>;

pub async fn ws_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<axum::response::Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= max_ws {
        tracing::warn!(current, max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let ws = WebSocketUpgrade::from_request(request, &state)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let _guard = ConnectionGuard::new(Arc::clone(&state.ws_connection_count));
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // The first message must be a JoinLobby.
    let first_msg = match ws_receiver.next().await {
        Some(Ok(Message::Binary(data))) => data,
        _ => return,
    };
    let join = match decode_client_message(&first_msg) {
        Ok(ClientMessage::JoinLobby(j)) => j,
        _ => return,
    };

    if join.protocol_version != 0 && join.protocol_version != PROTOCOL_VERSION {
        send_join_error(
            &mut ws_sender,
            &format!(
                "Protocol version mismatch: client={}, server={}",
                join.protocol_version, PROTOCOL_VERSION
            ),
        )
        .await;
        return;
    }

    let Some(name) = validate_name(&join.player_name, state.config.limits.max_player_name_len)
    else {
        send_join_error(&mut ws_sender, "Invalid player name").await;
        return;
    };

    let (player_id, rx) = match attempt_join(*join, name, &state).await {
        Ok(joined) => joined,
        Err(err) => {
            send_join_error(&mut ws_sender, &err).await;
            return;
        },
    };

    let Ok(response) = Coordinator::make_join_response(player_id) else {
        tracing::warn!("Failed to encode JoinLobbyResponse");
        state.coordinator.write().await.leave(player_id);
        return;
    };
    if ws_sender
        .send(Message::Binary(response.into()))
        .await
        .is_err()
    {
        state.coordinator.write().await.leave(player_id);
        return;
    }

    state.coordinator.read().await.broadcast_players_list();

    spawn_writer(ws_sender, rx);

    read_loop(&mut ws_receiver, &state, player_id).await;

    // Disconnected: forfeit any battle and drop pending challenges.
    let mut coordinator = state.coordinator.write().await;
    coordinator.leave(player_id);
    coordinator.broadcast_players_list();
    drop(coordinator);

    tracing::info!(player_id, "Player disconnected");
}

/// Trimmed display name, or None if empty, too long or containing
/// control characters.
fn validate_name(raw: &str, max_len: usize) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > max_len || name.chars().any(char::is_control) {
        return None;
    }
    Some(name.to_string())
}

async fn attempt_join(
    join: JoinLobbyMsg,
    name: String,
    state: &AppState,
) -> Result<(PlayerId, mpsc::Receiver<Bytes>), String> {
    let (tx, rx) = mpsc::channel::<Bytes>(state.config.limits.player_message_buffer);
    let mut coordinator = state.coordinator.write().await;
    let player_id = coordinator.join(name, join.character, tx)?;
    Ok((player_id, rx))
}

async fn send_join_error(ws_sender: &mut WsSink, error: &str) {
    if let Ok(response) = Coordinator::make_join_error(error)
        && let Err(e) = ws_sender.send(Message::Binary(response.into())).await
    {
        tracing::warn!(error = %e, "Failed to send join error response");
    }
}

fn spawn_writer(mut ws_sender: WsSink, mut rx: mpsc::Receiver<Bytes>) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if ws_sender.send(Message::Binary(data)).await.is_err() {
                break;
            }
        }
    });
}

/// Per-connection rate limiter (token bucket).
struct RateLimiter {
    tokens: f64,
    last_refill: tokio::time::Instant,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            last_refill: tokio::time::Instant::now(),
            max_tokens,
            refill_rate,
        }
    }

    /// Returns true if the message is allowed; false if rate-limited.
    fn allow(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

async fn read_loop(
    ws_receiver: &mut futures::stream::SplitStream<WebSocket>,
    state: &AppState,
    player_id: PlayerId,
) {
    let rate = state.config.limits.ws_rate_limit_per_sec;
    let mut rate_limiter = RateLimiter::new(rate, rate);

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let data = match msg {
            Message::Binary(d) => d,
            Message::Close(_) => break,
            _ => continue,
        };

        if !rate_limiter.allow() {
            tracing::warn!(player_id, "Rate limited");
            continue;
        }
        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        let msg_type = match decode_message_type(&data) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if msg_type.is_server_only() {
            tracing::warn!(
                player_id,
                ?msg_type,
                "Rejected server-only message from client"
            );
            continue;
        }

        let client_msg = match decode_client_message(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(player_id, ?msg_type, error = %e, "Malformed client message");
                continue;
            },
        };

        handle_client_message(state, player_id, client_msg).await;
    }
}

async fn handle_client_message(state: &AppState, player_id: PlayerId, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinLobby(_) => {
            tracing::debug!(player_id, "Ignoring repeated JoinLobby");
        },

        ClientMessage::PlayersListRequest(_) => {
            state.coordinator.read().await.send_players_list(player_id);
        },

        ClientMessage::SetCharacter(set) => {
            set_character(state, player_id, set.character).await;
        },

        ClientMessage::ChallengePropose(propose) => {
            let mut coordinator = state.coordinator.write().await;
            if let Err(e) = coordinator.propose(player_id, propose.target_id) {
                tracing::info!(player_id, target = propose.target_id, error = %e, "Challenge refused");
                request_failed(&coordinator, player_id, e);
            }
        },

        ClientMessage::ChallengeRespond(respond) => {
            let shared = Arc::clone(&state.coordinator);
            let mut coordinator = state.coordinator.write().await;
            let result = coordinator.respond(
                player_id,
                &respond.challenge_id,
                respond.accepted,
                shared,
            );
            match result {
                Ok(()) if respond.accepted => coordinator.broadcast_players_list(),
                Ok(()) => {},
                Err(e) => request_failed(&coordinator, player_id, e),
            }
        },

        ClientMessage::BattleAction(act) => {
            let coordinator = state.coordinator.read().await;
            if let Err(error) = coordinator.submit_action(player_id, &act.battle_id, act.action) {
                tracing::debug!(player_id, battle_id = %act.battle_id, error = %error, "Action refused");
                coordinator.send_message(
                    player_id,
                    &ServerMessage::ActionRejected(ActionRejectedMsg {
                        battle_id: act.battle_id,
                        error,
                    }),
                );
            }
        },
    }
}

async fn set_character(state: &AppState, player_id: PlayerId, sheet: CharacterSheet) {
    let mut coordinator = state.coordinator.write().await;
    match coordinator.set_character(player_id, sheet) {
        Ok(()) => {
            if let Some(character) = coordinator.character(player_id).cloned() {
                coordinator.send_message(
                    player_id,
                    &ServerMessage::CharacterUpdate(Box::new(CharacterUpdateMsg {
                        character,
                        levelled_up: false,
                    })),
                );
            }
            coordinator.broadcast_players_list();
        },
        Err(e) => request_failed(&coordinator, player_id, e),
    }
}

fn request_failed(coordinator: &Coordinator, player_id: PlayerId, error: PvpError) {
    coordinator.send_message(
        player_id,
        &ServerMessage::RequestFailed(RequestFailedMsg { error }),
    );
}
