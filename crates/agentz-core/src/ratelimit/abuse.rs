//! Abuse scoring and graduated suspension.
//!
//! Score 0–100 from three bands: request rate (0/10/20/30), token rate
//! (0/10/20/30), and accumulated violations (0/10/20/30/40). Critical
//! (≥80) auto-suspends for 4× the base duration, high (≥60) for the base
//! duration, warn (≥40) alerts only.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ratelimit::limiter::RateLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbuseLevel {
    None,
    Warn,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseAssessment {
    pub user_id: String,
    pub score: u8,
    pub level: AbuseLevel,
    pub suspended: bool,
}

impl RateLimiter {
    pub fn assess_abuse(&self, user_id: &str) -> AbuseAssessment {
        self.assess_abuse_at(user_id, chrono::Utc::now().timestamp_millis())
    }

    /// Score the user and apply the graduated suspension policy.
    pub fn assess_abuse_at(&self, user_id: &str, now_ms: i64) -> AbuseAssessment {
        let (requests, tokens_this_minute, violations) = self.window_snapshot(user_id, now_ms);
        let config = self.config();

        let score = rate_band(requests as u64, config.max_requests_per_minute as u64)
            + rate_band(tokens_this_minute, config.max_tokens_per_minute)
            + violations_band(violations);

        let level = if score >= 80 {
            AbuseLevel::Critical
        } else if score >= 60 {
            AbuseLevel::High
        } else if score >= 40 {
            AbuseLevel::Warn
        } else {
            AbuseLevel::None
        };

        let suspended = match level {
            AbuseLevel::Critical => {
                self.suspend_at(user_id, Some(config.suspension_duration_ms * 4), now_ms);
                true
            }
            AbuseLevel::High => {
                self.suspend_at(user_id, None, now_ms);
                true
            }
            AbuseLevel::Warn => {
                warn!(event = "core.abuse.warning", user_id, score);
                false
            }
            AbuseLevel::None => false,
        };

        AbuseAssessment {
            user_id: user_id.to_string(),
            score,
            level,
            suspended,
        }
    }
}

/// 0/10/20/30 by utilisation of the window limit.
fn rate_band(used: u64, limit: u64) -> u8 {
    if limit == 0 {
        return 30;
    }
    let percent = used.saturating_mul(100) / limit;
    match percent {
        0..=49 => 0,
        50..=79 => 10,
        80..=99 => 20,
        _ => 30,
    }
}

/// 0/10/20/30/40 by accumulated violations.
fn violations_band(violations: u32) -> u8 {
    match violations {
        0 => 0,
        1 => 10,
        2 => 20,
        3 | 4 => 30,
        _ => 40,
    }
}
