use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub lobby: LobbyInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
}

#[derive(Serialize)]
pub struct LobbyInfo {
    pub players: usize,
    pub battles: usize,
    pub challenges: usize,
}

/// Returns server status, connection count and lobby occupancy as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ws = state.ws_connection_count.load(Ordering::Relaxed);

    let (players, battles, challenges) = {
        let coordinator = state.coordinator.read().await;
        coordinator.stats()
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo { websocket: ws },
        lobby: LobbyInfo {
            players,
            battles,
            challenges,
        },
    })
}
