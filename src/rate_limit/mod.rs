// Request throttling per caller and route

pub mod limiter;
pub mod middleware;

pub use limiter::{RateDecision, RateLimitRule, RateLimiter};
pub use middleware::{caller_identifier, rate_limit};
