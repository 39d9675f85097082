//! Shared building blocks for the CircuitOps operator surfaces: configuration,
//! the error taxonomy, intent domain types, and the fixed-window rate limiter.

pub mod config;
pub mod errors;
pub mod intent;
pub mod ratelimit;

pub use errors::{ApplicationError, InterfaceError};
pub use intent::{ClassifiedIntent, Intent, IntentClassifier, IntentParams};
pub use ratelimit::{RateLimitEntry, RateLimitPolicy, RateLimiter};
