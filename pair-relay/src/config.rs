//! Configuration loading for pair-relay.
//!
//! Configuration is loaded from a TOML file (default: `pairlink.toml`).
//! Every field has a default, so a missing file or an empty section is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `signing.secret`.
pub const SECRET_ENV: &str = "PAIRLINK_SIGNING_SECRET";

/// Minimum accepted length in bytes of a configured signing secret.
pub const MIN_SECRET_LEN: usize = 16;

/// Root configuration for pair-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Pairing-code signing configuration.
    pub signing: SigningConfig,
    /// Session lifetime configuration.
    pub sessions: SessionsConfig,
    /// Relay behavior configuration.
    pub relay: RelayConfig,
    /// Rate limiting configuration.
    pub limits: LimitsConfig,
    /// Cleanup task configuration.
    pub cleanup: CleanupConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    pub bind_address: String,
    /// Base URL of the page that scans pairing codes. When set, session
    /// creation responses include a full `pairingUrl`.
    pub public_url: Option<String>,
    /// Enable metrics endpoint (default: true).
    pub metrics_enabled: bool,
}

/// Signing configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    /// HMAC secret. A random per-process secret is used when absent.
    pub secret: Option<String>,
}

// Never print the secret
impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Session lifetime configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// TTL applied when a creation request names none (default: 300s).
    pub default_ttl_secs: u64,
    /// Upper bound for requested TTLs (default: 3600s).
    pub max_ttl_secs: u64,
    /// Maximum ICE candidates stored per session (default: 64).
    pub max_ice_candidates: usize,
}

/// Relay behavior configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Participants allowed per session; 0 means unlimited (default: 2).
    pub max_participants: usize,
    /// Only allow joining sessions that exist and are unexpired (default: true).
    pub require_known_session: bool,
    /// Maximum size of one WebSocket frame in bytes (default: 64KiB).
    pub max_message_bytes: usize,
    /// Outbound queue length per connection; frames beyond it are dropped
    /// (default: 64).
    pub send_queue: usize,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// WebSocket connections per client IP per minute (default: 60).
    pub connections_per_ip: u32,
    /// Relay frames per connection per minute (default: 600).
    pub messages_per_minute: u32,
    /// Session creations per client IP per minute (default: 20).
    pub sessions_per_minute: u32,
    /// Aggregate relay frames per second across all clients (default: 2000).
    pub global_requests_per_second: u32,
}

/// Cleanup task configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Sweep interval in seconds (default: 60).
    pub interval_secs: u64,
    /// Enable cleanup task (default: true).
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_url: None,
            metrics_enabled: true,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300, // 5 minutes
            max_ttl_secs: 3600,    // 1 hour
            max_ice_candidates: 64,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_participants: 2,
            require_known_session: true,
            max_message_bytes: 64 * 1024,
            send_queue: 64,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: 60,
            messages_per_minute: 600,
            sessions_per_minute: 20,
            global_requests_per_second: 2000,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            enabled: true,
        }
    }
}

impl SessionsConfig {
    /// Resolve a requested TTL: `None` uses the default, larger values are
    /// clamped to the maximum. Zero is rejected by the caller.
    pub fn resolve_ttl(&self, requested_secs: Option<u64>) -> Duration {
        let secs = requested_secs
            .unwrap_or(self.default_ttl_secs)
            .min(self.max_ttl_secs);
        Duration::from_secs(secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults; then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::info!("Config file {} not found, using defaults", path.display());
            Self::default()
        };

        if let Ok(secret) = std::env::var(SECRET_ENV) {
            config.signing.secret = Some(secret);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secret) = &self.signing.secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(invalid(format!(
                    "signing.secret must be at least {} bytes",
                    MIN_SECRET_LEN
                )));
            }
        }
        if self.sessions.default_ttl_secs == 0 {
            return Err(invalid("sessions.default_ttl_secs must be > 0"));
        }
        if self.sessions.default_ttl_secs > self.sessions.max_ttl_secs {
            return Err(invalid(
                "sessions.default_ttl_secs must not exceed sessions.max_ttl_secs",
            ));
        }
        if self.relay.send_queue == 0 {
            return Err(invalid("relay.send_queue must be > 0"));
        }
        if self.relay.max_message_bytes == 0 {
            return Err(invalid("relay.max_message_bytes must be > 0"));
        }
        if self.cleanup.interval_secs == 0 {
            return Err(invalid("cleanup.interval_secs must be > 0"));
        }
        let limits = &self.limits;
        if limits.connections_per_ip == 0
            || limits.messages_per_minute == 0
            || limits.sessions_per_minute == 0
            || limits.global_requests_per_second == 0
        {
            return Err(invalid("rate limits must be > 0"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.into(),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}
