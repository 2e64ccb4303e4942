//! Rate limiting of task starts, per task type.

mod limiter;

pub use limiter::RateLimiter;
