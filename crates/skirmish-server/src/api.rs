use axum::extract::{Path, State};
use axum::response::Json;

use crate::battle_loop::BattleSummary;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/v1/battles: every battle currently running.
pub async fn list_battles(State(state): State<AppState>) -> Json<Vec<BattleSummary>> {
    let coordinator = state.coordinator.read().await;
    Json(coordinator.battle_summaries())
}

/// GET /api/v1/battles/{battle_id}
pub async fn get_battle(
    State(state): State<AppState>,
    Path(battle_id): Path<String>,
) -> Result<Json<BattleSummary>, AppError> {
    let coordinator = state.coordinator.read().await;
    coordinator
        .battle_summaries()
        .into_iter()
        .find(|b| b.battle_id == battle_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No active battle {battle_id}")))
}
