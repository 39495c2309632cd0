pub mod api;
pub mod battle_loop;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let api_routes = Router::new()
        .route("/battles", get(api::list_battles))
        .route("/battles/{battle_id}", get(api::get_battle));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}

/// Background task that periodically drops expired challenges and tells
/// both parties.
pub fn spawn_challenge_sweeper(state: AppState) {
    let period = Duration::from_secs(state.config.challenges.sweep_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let mut coordinator = state.coordinator.write().await;
            let expired = coordinator.expire_challenges(std::time::Instant::now());
            if expired > 0 {
                tracing::info!(expired, "Swept expired challenges");
            }
        }
    });
}
