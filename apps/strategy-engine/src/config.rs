//! Configuration loading for the strategy engine.
//!
//! Loads YAML with `${VAR}` / `${VAR:-default}` environment variable
//! interpolation, applies serde defaults per section, and validates the
//! result before use.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resilience::CircuitBreakerConfig;
use crate::stream::ThrottleConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Aggregation behavior.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Circuit breaker guarding broker calls.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Realtime price cache.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Per-symbol update throttling.
    #[serde(default)]
    pub throttle: ThrottleSettings,
    /// Bounded delivery queue.
    #[serde(default)]
    pub queue: QueueSettings,
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// How far back to fetch fill history, in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Time gap that splits two trades, in minutes.
    #[serde(default = "default_cluster_window_minutes")]
    pub cluster_window_minutes: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            cluster_window_minutes: default_cluster_window_minutes(),
        }
    }
}

impl EngineSettings {
    /// Cluster window as a chrono duration.
    #[must_use]
    pub const fn cluster_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cluster_window_minutes)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds to stay open before probing again.
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to the runtime breaker configuration.
    #[must_use]
    pub const fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
        }
    }
}

/// Price cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds a cached price stays fresh.
    #[serde(default = "default_price_ttl_secs")]
    pub price_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            price_ttl_secs: default_price_ttl_secs(),
        }
    }
}

impl CacheSettings {
    /// Cache TTL as a duration.
    #[must_use]
    pub const fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }
}

/// Throttle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleSettings {
    /// Minimum milliseconds between two emissions for one symbol.
    #[serde(default = "default_throttle_interval_ms")]
    pub interval_ms: u64,
    /// Maximum number of symbols with a deferred flush.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_throttle_interval_ms(),
            max_pending: default_max_pending(),
        }
    }
}

impl ThrottleSettings {
    /// Convert to the runtime throttle configuration.
    #[must_use]
    pub const fn to_throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig {
            interval: Duration::from_millis(self.interval_ms),
            max_pending: self.max_pending,
        }
    }
}

/// Bounded queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Queue capacity before the oldest element is shed.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

const fn default_lookback_days() -> u32 {
    30
}

const fn default_cluster_window_minutes() -> i64 {
    5
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_recovery_timeout_secs() -> u64 {
    60
}

const fn default_price_ttl_secs() -> u64 {
    30
}

const fn default_throttle_interval_ms() -> u64 {
    500
}

const fn default_max_pending() -> usize {
    1000
}

const fn default_queue_capacity() -> usize {
    1024
}

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    let mut result = input.to_string();
    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_match.as_str()) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match.as_str(), &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.cluster_window_minutes <= 0 {
        return Err(ConfigError::ValidationError(
            "engine.cluster_window_minutes must be positive".to_string(),
        ));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "circuit_breaker.failure_threshold must be at least 1".to_string(),
        ));
    }

    if config.cache.price_ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "cache.price_ttl_secs must be positive".to_string(),
        ));
    }

    if config.throttle.max_pending == 0 {
        return Err(ConfigError::ValidationError(
            "throttle.max_pending must be at least 1".to_string(),
        ));
    }

    if config.queue.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "queue.capacity must be at least 1".to_string(),
        ));
    }

    Ok(())
}
