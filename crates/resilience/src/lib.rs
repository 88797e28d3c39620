pub mod circuit_breaker;
pub mod error_tracker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitState};
pub use error_tracker::ErrorTracker;
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
