use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RotaError};
use crate::rotation::{ConnectorKind, FailurePolicy};

/// Shortest session a caller may configure, in minutes
pub const MIN_SESSION_MINUTES: u64 = 1;
/// Longest session a caller may configure, in minutes (24 hours)
pub const MAX_SESSION_MINUTES: u64 = 1440;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Rotation timing and policy
    pub rotation: RotationConfig,
    /// Pool/resource preloaded at boot
    pub startup: StartupConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 8001)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

/// Runtime rotation settings.
///
/// The controller snapshots `session_duration` when a session turns active, so
/// changes only affect the next session.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationConfig {
    /// How long each session runs before rotating to the next proxy
    pub session_duration: Duration,
    /// Pause between a failed connection attempt and the retry
    pub failure_retry_delay: Duration,
    /// Simulated connection setup delay
    pub connect_delay: Duration,
    /// Simulated failure probability for proxied attempts (0.0 - 1.0)
    pub failure_rate: f64,
    /// Granularity of progress updates
    pub progress_tick: Duration,
    /// What to do with the proxy cursor after a failed attempt
    pub failure_policy: FailurePolicy,
    /// Backend resolving connection attempts
    pub connector: ConnectorKind,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            session_duration: Duration::from_secs(60 * 60),
            failure_retry_delay: Duration::from_secs(3),
            connect_delay: Duration::from_millis(2000),
            failure_rate: 0.2,
            progress_tick: Duration::from_millis(500),
            failure_policy: FailurePolicy::RetrySame,
            connector: ConnectorKind::Simulated,
        }
    }
}

impl RotationConfig {
    /// Session duration expressed in whole minutes, validated against the
    /// supported 1 minute - 24 hour range.
    pub fn session_duration_from_minutes(minutes: u64) -> Result<Duration> {
        if !(MIN_SESSION_MINUTES..=MAX_SESSION_MINUTES).contains(&minutes) {
            return Err(RotaError::InvalidConfig(format!(
                "session duration must be between {} and {} minutes, got {}",
                MIN_SESSION_MINUTES, MAX_SESSION_MINUTES, minutes
            )));
        }
        Ok(Duration::from_secs(minutes * 60))
    }

    /// Check the invariants the controller relies on
    pub fn validate(&self) -> Result<()> {
        if self.session_duration.is_zero() {
            return Err(RotaError::InvalidConfig(
                "session duration must be positive".into(),
            ));
        }
        if self.progress_tick.is_zero() {
            return Err(RotaError::InvalidConfig(
                "progress tick must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(RotaError::InvalidConfig(format!(
                "failure rate must be between 0.0 and 1.0, got {}",
                self.failure_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    /// Newline-delimited proxy list loaded at boot
    pub proxy_file: Option<PathBuf>,
    /// Resource URL set at boot
    pub resource_url: Option<String>,
    /// Start rotating immediately when both of the above are present
    pub autostart: bool,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let minutes: u64 = get_env_or("ROTA_SESSION_MINUTES", "60")
            .parse()
            .map_err(|_| {
                RotaError::InvalidConfig("ROTA_SESSION_MINUTES must be a whole number".into())
            })?;

        let failure_policy_raw = get_env_or("ROTA_FAILURE_POLICY", "retry_same");
        let failure_policy = FailurePolicy::from_str(&failure_policy_raw).ok_or_else(|| {
            RotaError::InvalidConfig(format!(
                "ROTA_FAILURE_POLICY has unsupported value: {}",
                failure_policy_raw
            ))
        })?;

        let connector_raw = get_env_or("ROTA_CONNECTOR", "simulated");
        let connector = ConnectorKind::from_str(&connector_raw).ok_or_else(|| {
            RotaError::InvalidConfig(format!(
                "ROTA_CONNECTOR has unsupported value: {}",
                connector_raw
            ))
        })?;

        let rotation = RotationConfig {
            session_duration: RotationConfig::session_duration_from_minutes(minutes)?,
            failure_retry_delay: Duration::from_secs(
                get_env_or("ROTA_FAILURE_RETRY_SECS", "3").parse().map_err(|_| {
                    RotaError::InvalidConfig(
                        "ROTA_FAILURE_RETRY_SECS must be a whole number".into(),
                    )
                })?,
            ),
            connect_delay: Duration::from_millis(
                get_env_or("ROTA_CONNECT_DELAY_MS", "2000")
                    .parse()
                    .map_err(|_| {
                        RotaError::InvalidConfig(
                            "ROTA_CONNECT_DELAY_MS must be a whole number".into(),
                        )
                    })?,
            ),
            failure_rate: get_env_or("ROTA_FAILURE_RATE", "0.2").parse().map_err(|_| {
                RotaError::InvalidConfig("ROTA_FAILURE_RATE must be a number".into())
            })?,
            progress_tick: Duration::from_millis(
                get_env_or("ROTA_PROGRESS_TICK_MS", "500")
                    .parse()
                    .map_err(|_| {
                        RotaError::InvalidConfig(
                            "ROTA_PROGRESS_TICK_MS must be a whole number".into(),
                        )
                    })?,
            ),
            failure_policy,
            connector,
        };
        rotation.validate()?;

        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "8001").parse().map_err(|_| {
                    RotaError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            rotation,
            startup: StartupConfig {
                proxy_file: get_env_opt("ROTA_PROXY_FILE").map(PathBuf::from),
                resource_url: get_env_opt("ROTA_RESOURCE_URL"),
                autostart: get_env_or("ROTA_AUTOSTART", "false")
                    .parse()
                    .unwrap_or(false),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a non-blank environment variable
fn get_env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
