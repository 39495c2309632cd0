use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::coordinator::Coordinator;

pub type SharedCoordinator = Arc<RwLock<Coordinator>>;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: SharedCoordinator,
    pub ws_connection_count: Arc<AtomicUsize>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            coordinator: Arc::new(RwLock::new(Coordinator::new(&config))),
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
            config: Arc::new(config),
        }
    }
}

/// Counts one live WebSocket for as long as it is held.
pub struct ConnectionGuard {
    count: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self { count }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::Relaxed);
    }
}
