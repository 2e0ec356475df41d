//! Application configuration management.
//!
//! Handles loading, saving, and accessing the realtime client configuration:
//! WebSocket endpoint, access token, reconnection policy and logging.
//! Configuration is persisted as TOML on disk; a couple of environment
//! variables may override it at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MpError, MpResult};
use crate::platform;

/// Environment variable overriding `server.ws_url`.
pub const ENV_WS_URL: &str = "MEBELPLACE_WS_URL";

/// Environment variable overriding `auth.access_token`.
pub const ENV_ACCESS_TOKEN: &str = "MEBELPLACE_ACCESS_TOKEN";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Socket reconnection policy.
    #[serde(default)]
    pub socket: SocketSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base WebSocket URL; channel paths are appended to it.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token sent as `?token=` on every channel URL. Empty means anonymous.
    #[serde(default)]
    pub access_token: String,
}

/// Reconnection policy shared by every channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketSettings {
    /// Maximum reconnect attempts after an abnormal close.
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,

    /// Fixed delay between reconnect attempts, in milliseconds.
    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_ws_url() -> String {
    constants::DEFAULT_WS_URL.to_string()
}

fn default_reconnection_attempts() -> u32 {
    constants::DEFAULT_RECONNECTION_ATTEMPTS
}

fn default_reconnection_delay_ms() -> u64 {
    constants::DEFAULT_RECONNECTION_DELAY_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
        }
    }
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            reconnection_attempts: default_reconnection_attempts(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
        }
    }
}

impl SocketSettings {
    /// The reconnection delay as a `Duration`.
    pub fn reconnection_delay(&self) -> Duration {
        Duration::from_millis(self.reconnection_delay_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> MpResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> MpResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| MpError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> MpResult<PathBuf> {
        Ok(platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> MpResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Apply `MEBELPLACE_WS_URL` / `MEBELPLACE_ACCESS_TOKEN` overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_WS_URL).ok(),
            std::env::var(ENV_ACCESS_TOKEN).ok(),
        );
    }

    fn apply_overrides(&mut self, ws_url: Option<String>, token: Option<String>) {
        if let Some(url) = ws_url.filter(|u| !u.trim().is_empty()) {
            self.server.ws_url = Self::sanitize_ws_url(&url);
        }
        if let Some(token) = token {
            self.auth.access_token = token.trim().to_string();
        }
    }

    /// The configured access token, if any.
    pub fn token(&self) -> Option<String> {
        let token = self.auth.access_token.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> MpResult<()> {
        if self.server.ws_url.trim().is_empty() {
            return Err(MpError::MissingConfig("server.ws_url".into()));
        }
        let url = url::Url::parse(&self.server.ws_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(MpError::InvalidUrl(format!(
                "expected ws:// or wss:// scheme, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Sanitize and normalize a WebSocket base URL.
    ///
    /// Maps http(s) to ws(s), defaults bare hosts to wss (ws for localhost
    /// and loopback addresses), and strips trailing slashes.
    pub fn sanitize_ws_url(address: &str) -> String {
        let trimmed = address.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
            trimmed.to_string()
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
            format!("ws://{trimmed}")
        } else {
            format!("wss://{trimmed}")
        };

        with_scheme.trim_end_matches('/').to_string()
    }
}

/// Thread-safe configuration holder for shared access.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Save the current configuration to the given path.
    pub async fn save_to(&self, path: &Path) -> MpResult<()> {
        let config = self.inner.read().await;
        config.save_to_file(path)
    }
}
