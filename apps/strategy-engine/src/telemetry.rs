//! Tracing setup.
//!
//! Console subscriber with `RUST_LOG`-style filtering.
//!
//! # Usage
//!
//! ```rust,ignore
//! use strategy_engine::telemetry::init_telemetry;
//!
//! fn main() {
//!     init_telemetry();
//!     // ... application code
//! }
//! ```

use tracing_subscriber::EnvFilter;

/// Initialize console tracing.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_telemetry() {
    let is_development = std::env::var("NODE_ENV")
        .map(|v| v == "development")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(!is_development)
        .with_ansi(is_development)
        .try_init();
}
