//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_NAME: &str = "domino-client";
const CONFIG_FILE: &str = "config.ron";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Connection, heartbeat and reconnection settings.
    pub network: NetworkConfig,
    /// Game rules the client assumes and local play behaviour.
    pub game: GameConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// WebSocket endpoint of the game room, as handed out by the lobby API.
    pub server_url: String,
    /// Session token appended to the endpoint as `?token=...`. Empty means none.
    pub auth_token: String,
    /// Interval between keepalive pings while the connection is open.
    pub heartbeat_interval_ms: u64,
    /// Silence after which an open connection is considered dead. 0 disables.
    pub liveness_timeout_ms: u64,
    /// Delay before the first reconnection attempt.
    pub reconnect_base_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub reconnect_backoff_multiplier: f64,
    /// Upper bound for a single reconnection delay.
    pub reconnect_max_delay_ms: u64,
    /// Reconnection attempts before the session is given up.
    pub reconnect_max_attempts: u32,
    /// Jitter factor (0.0 - 1.0) applied as +/- to each delay.
    pub reconnect_jitter: f64,
    /// Pause between queued messages when flushing after a reconnect.
    pub flush_interval_ms: u64,
    /// Capacity of the outbound queue used while offline.
    pub max_queued_messages: usize,
    /// Period of the client tick that drives the whole session.
    pub tick_interval_ms: u64,
}

/// Game configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Highest pip value of the tile set (6 for double-six).
    pub max_pip: u8,
    /// Hand size dealt at the start of a round.
    pub tiles_per_player: usize,
    /// Turn length used until the server announces its own timer.
    pub turn_time_limit_secs: u64,
    /// Let the headless client pick moves on its own.
    pub autoplay: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "domino_net=trace").
    pub log_level: String,
    /// Also write JSON logs into the config directory's `logs/` folder.
    pub file_logging: bool,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8080/ws".to_string(),
            auth_token: String::new(),
            heartbeat_interval_ms: 15_000,
            liveness_timeout_ms: 45_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_backoff_multiplier: 2.0,
            reconnect_max_delay_ms: 30_000,
            reconnect_max_attempts: 5,
            reconnect_jitter: 0.0,
            flush_interval_ms: 50,
            max_queued_messages: 256,
            tick_interval_ms: 50,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_pip: 6,
            tiles_per_player: 7,
            turn_time_limit_secs: 30,
            autoplay: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: false,
        }
    }
}

impl NetworkConfig {
    /// The endpoint with the auth token attached, ready to hand to a transport.
    pub fn endpoint(&self) -> String {
        if self.auth_token.is_empty() {
            return self.server_url.clone();
        }
        let separator = if self.server_url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.server_url, separator, self.auth_token)
    }

    /// Keepalive interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Liveness timeout, or `None` when disabled.
    pub fn liveness_timeout(&self) -> Option<Duration> {
        (self.liveness_timeout_ms > 0).then(|| Duration::from_millis(self.liveness_timeout_ms))
    }

    /// Pause between flushed messages.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl GameConfig {
    /// Default turn length.
    pub fn turn_time_limit(&self) -> Duration {
        Duration::from_secs(self.turn_time_limit_secs)
    }
}

// --- Validation ---

impl Config {
    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        let net = &self.network;

        if !(net.server_url.starts_with("ws://") || net.server_url.starts_with("wss://")) {
            return invalid("network.server_url", "must be a ws:// or wss:// URL");
        }
        if net.heartbeat_interval_ms == 0 {
            return invalid("network.heartbeat_interval_ms", "must be positive");
        }
        if net.liveness_timeout_ms != 0 && net.liveness_timeout_ms <= net.heartbeat_interval_ms {
            return invalid(
                "network.liveness_timeout_ms",
                "must exceed the heartbeat interval, or be 0 to disable",
            );
        }
        if !net.reconnect_backoff_multiplier.is_finite() || net.reconnect_backoff_multiplier < 1.0 {
            return invalid("network.reconnect_backoff_multiplier", "must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&net.reconnect_jitter) {
            return invalid("network.reconnect_jitter", "must be within 0.0..=1.0");
        }
        if net.max_queued_messages == 0 {
            return invalid("network.max_queued_messages", "must be positive");
        }
        if self.game.tiles_per_player == 0 {
            return invalid("game.tiles_per_player", "must be positive");
        }
        Ok(())
    }
}

// --- Persistence ---

impl Config {
    /// The platform config directory for the client (`<config>/domino-client`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Path of the config file inside `config_dir`.
    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(CONFIG_FILE)
    }

    /// Read and validate `config.ron` from `config_dir`, writing the
    /// defaults there first when it does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(config_dir);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default client config to {}", path.display());
            return Ok(config);
        }

        let config = Self::read(&path)?;
        config.validate()?;
        log::info!("Loaded client config from {}", path.display());
        Ok(config)
    }

    /// Write `config.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Io {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        let path = Self::path_in(config_dir);
        std::fs::write(&path, text).map_err(|source| ConfigError::Io { path: path.clone(), source })
    }

    /// Re-read the file. Returns the new config only when it differs from
    /// `self` and passes validation.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&Self::path_in(config_dir))?;
        if fresh == *self {
            return Ok(None);
        }
        fresh.validate()?;
        log::info!("Client config changed on disk");
        Ok(Some(fresh))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
