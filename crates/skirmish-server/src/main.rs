use tracing_subscriber::EnvFilter;

use skirmish_server::config::ServerConfig;
use skirmish_server::{build_app, spawn_challenge_sweeper};

#[tokio::main]
async fn main() {
    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    };
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(log_format = %config.log_format, "Configuration loaded");

    let listen_addr = config.listen_addr.clone();
    let (app, state) = build_app(config);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %listen_addr, error = %e, "Failed to bind");
            std::process::exit(1);
        },
    };
    tracing::info!(addr = %listen_addr, "Skirmish server listening");

    spawn_challenge_sweeper(state.clone());

    let shutdown_state = state.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutting down");
            shutdown_state.coordinator.read().await.shutdown();
        })
        .await;
    if let Err(e) = result {
        tracing::error!(error = %e, "Server error");
    }
}
