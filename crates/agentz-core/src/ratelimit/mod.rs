//! Per-user sliding-window rate limiting and abuse detection.

mod abuse;
mod limiter;

pub use abuse::{AbuseAssessment, AbuseLevel};
pub use limiter::{RateLimitDecision, RateLimiter, UserStats};
