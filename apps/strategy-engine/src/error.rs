//! Top-level engine error type.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::resilience::CircuitBreakerError;

/// Errors surfaced by the strategy engine facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An upstream broker call failed.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The circuit breaker rejected the call without reaching the broker.
    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen {
        /// Breaker name.
        name: String,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<CircuitBreakerError<BrokerError>> for EngineError {
    fn from(err: CircuitBreakerError<BrokerError>) -> Self {
        match err {
            CircuitBreakerError::Open { name } => Self::CircuitOpen { name },
            CircuitBreakerError::Inner(e) => Self::Broker(e),
        }
    }
}
