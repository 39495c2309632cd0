use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Top-level server configuration, loaded from `skirmish.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// `"text"` (default) or `"json"`.
    pub log_format: String,
    pub limits: LimitsConfig,
    pub battle: BattleConfig,
    pub challenges: ChallengesConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_format: "text".to_string(),
            limits: LimitsConfig::default(),
            battle: BattleConfig::default(),
            challenges: ChallengesConfig::default(),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub ws_rate_limit_per_sec: f64,
    pub player_message_buffer: usize,
    pub max_player_name_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            ws_rate_limit_per_sec: 20.0,
            player_message_buffer: 256,
            max_player_name_len: 32,
        }
    }
}

/// Turn clock settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    pub turn_time_secs: u32,
    /// Length of one clock step. Every step takes one second off the turn.
    pub tick_interval_ms: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            turn_time_secs: skirmish_core::battle::MAX_TURN_TIME_SECS,
            tick_interval_ms: 1000,
        }
    }
}

impl BattleConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Pending challenge lifecycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChallengesConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ChallengesConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            sweep_interval_secs: 5,
        }
    }
}

impl ChallengesConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl ServerConfig {
    /// Check every value; the first problem found is returned.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr is not a valid socket address: {}",
                self.listen_addr
            ));
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(format!(
                "log_format must be \"text\" or \"json\", got {:?}",
                self.log_format
            ));
        }
        if self.limits.max_ws_connections == 0 {
            return Err("limits.max_ws_connections must be > 0".to_string());
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            return Err("limits.ws_rate_limit_per_sec must be > 0".to_string());
        }
        if self.limits.player_message_buffer == 0 {
            return Err("limits.player_message_buffer must be > 0".to_string());
        }
        if self.limits.max_player_name_len == 0 {
            return Err("limits.max_player_name_len must be > 0".to_string());
        }
        if self.battle.turn_time_secs == 0 {
            return Err("battle.turn_time_secs must be > 0".to_string());
        }
        if self.battle.tick_interval_ms == 0 {
            return Err("battle.tick_interval_ms must be > 0".to_string());
        }
        if self.challenges.ttl_secs == 0 {
            return Err("challenges.ttl_secs must be > 0".to_string());
        }
        if self.challenges.sweep_interval_secs == 0 {
            return Err("challenges.sweep_interval_secs must be > 0".to_string());
        }
        Ok(())
    }

    /// Load config from `skirmish.toml` if it exists, then apply env var
    /// overrides. Runs before logging is set up, so problems are returned
    /// rather than logged.
    pub fn load() -> Result<Self, String> {
        Self::load_from(Path::new("skirmish.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<ServerConfig>(&content)
                .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ServerConfig::default(),
            Err(e) => return Err(format!("Failed to read {}: {e}", path.display())),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("SKIRMISH_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Ok(format) = std::env::var("SKIRMISH_LOG_FORMAT")
            && !format.is_empty()
        {
            self.log_format = format;
        }
        if let Ok(val) = std::env::var("SKIRMISH_MAX_WS_CONNECTIONS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.limits.max_ws_connections = n;
        }
        if let Ok(val) = std::env::var("SKIRMISH_WS_RATE_LIMIT")
            && let Ok(n) = val.parse::<f64>()
        {
            self.limits.ws_rate_limit_per_sec = n;
        }
        if let Ok(val) = std::env::var("SKIRMISH_TURN_TIME_SECS")
            && let Ok(n) = val.parse::<u32>()
        {
            self.battle.turn_time_secs = n;
        }
        if let Ok(val) = std::env::var("SKIRMISH_CHALLENGE_TTL_SECS")
            && let Ok(n) = val.parse::<u64>()
        {
            self.challenges.ttl_secs = n;
        }
    }
}
