//! Realtime price plumbing: quote ingestion, caching, throttling, and
//! backpressure.

mod backpressure;
mod cache;
mod dispatcher;
mod throttle;

pub use backpressure::BoundedQueue;
pub use cache::{DEFAULT_PRICE_TTL, PriceCache};
pub use dispatcher::{PriceUpdate, StreamDispatcher, derive_price};
pub use throttle::{PriceThrottle, ThrottleConfig};
