//! Sliding-window request and token limits.
//!
//! Two windows per user: request timestamps over a 1-minute horizon and
//! (timestamp, tokens) records over a 1-hour horizon; the 1-minute token
//! view is derived by filtering the same list. Both lists are pruned to
//! their horizons on every read (I7).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use agentz_config::RateLimitConfig;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const IDLE_SWEEP_INTERVAL_MS: i64 = 5 * 60_000;

#[derive(Debug, Default)]
struct UserRecord {
    /// Request timestamps (epoch ms), 1-minute horizon.
    requests: Vec<i64>,
    /// (timestamp, tokens) records, 1-hour horizon.
    token_usage: Vec<(i64, u64)>,
    suspended_until: Option<i64>,
    violation_count: u32,
}

impl UserRecord {
    fn prune(&mut self, now_ms: i64) {
        self.requests.retain(|ts| now_ms - ts < MINUTE_MS);
        self.token_usage.retain(|(ts, _)| now_ms - ts < HOUR_MS);
    }

    fn tokens_this_minute(&self, now_ms: i64) -> u64 {
        self.token_usage
            .iter()
            .filter(|(ts, _)| now_ms - ts < MINUTE_MS)
            .map(|(_, tokens)| tokens)
            .sum()
    }

    fn tokens_this_hour(&self) -> u64 {
        self.token_usage.iter().map(|(_, tokens)| tokens).sum()
    }

    fn is_idle(&self) -> bool {
        self.requests.is_empty() && self.token_usage.is_empty() && self.suspended_until.is_none()
    }
}

/// Outcome of a `check_limit` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Seconds until a retry may succeed, on denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub requests_this_minute: usize,
    pub tokens_this_minute: u64,
    pub tokens_this_hour: u64,
}

/// Snapshot of one user's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub requests_this_minute: usize,
    pub tokens_this_minute: u64,
    pub tokens_this_hour: u64,
    pub violation_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended_until_ms: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    users: Arc<Mutex<HashMap<String, Arc<Mutex<UserRecord>>>>>,
    last_sweep_ms: Arc<Mutex<i64>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            users: Arc::new(Mutex::new(HashMap::new())),
            last_sweep_ms: Arc::new(Mutex::new(0)),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn user(&self, user_id: &str) -> Arc<Mutex<UserRecord>> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserRecord::default())))
            .clone()
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn check_limit(&self, user_id: &str, estimated_tokens: Option<u64>) -> RateLimitDecision {
        self.check_limit_at(user_id, estimated_tokens, Self::now_ms())
    }

    /// Clock-injected variant backing `check_limit`; tests drive it directly.
    pub fn check_limit_at(
        &self,
        user_id: &str,
        estimated_tokens: Option<u64>,
        now_ms: i64,
    ) -> RateLimitDecision {
        self.maybe_sweep(now_ms);
        let user = self.user(user_id);
        let mut record = user.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(until) = record.suspended_until {
            if now_ms < until {
                let retry_after = ((until - now_ms) as u64).div_ceil(1000);
                return denied(
                    &record,
                    now_ms,
                    format!("user is suspended for {}s", retry_after),
                    Some(retry_after),
                );
            }
            record.suspended_until = None;
        }

        record.prune(now_ms);

        if record.requests.len() >= self.config.max_requests_per_minute {
            return denied(
                &record,
                now_ms,
                format!(
                    "exceeded {} requests per minute",
                    self.config.max_requests_per_minute
                ),
                Some(60),
            );
        }

        if let Some(estimated) = estimated_tokens {
            if estimated > self.config.max_tokens_per_request {
                return denied(
                    &record,
                    now_ms,
                    format!(
                        "request of {} tokens exceeds {} tokens per request",
                        estimated, self.config.max_tokens_per_request
                    ),
                    None,
                );
            }

            if record.tokens_this_minute(now_ms) + estimated > self.config.max_tokens_per_minute {
                return denied(
                    &record,
                    now_ms,
                    format!(
                        "exceeded {} tokens per minute",
                        self.config.max_tokens_per_minute
                    ),
                    Some(60),
                );
            }

            if record.tokens_this_hour() + estimated > self.config.max_tokens_per_hour {
                // Retry once the oldest hourly record ages out.
                let retry_after = record
                    .token_usage
                    .first()
                    .map(|(ts, _)| ((HOUR_MS - (now_ms - ts)).max(0) as u64).div_ceil(1000))
                    .unwrap_or(3600);
                return denied(
                    &record,
                    now_ms,
                    format!(
                        "exceeded {} tokens per hour",
                        self.config.max_tokens_per_hour
                    ),
                    Some(retry_after),
                );
            }
        }

        RateLimitDecision {
            allowed: true,
            reason: None,
            retry_after: None,
            requests_this_minute: record.requests.len(),
            tokens_this_minute: record.tokens_this_minute(now_ms),
            tokens_this_hour: record.tokens_this_hour(),
        }
    }

    pub fn record_usage(&self, user_id: &str, tokens_used: u64) {
        self.record_usage_at(user_id, tokens_used, Self::now_ms());
    }

    pub fn record_usage_at(&self, user_id: &str, tokens_used: u64, now_ms: i64) {
        let user = self.user(user_id);
        let mut record = user.lock().unwrap_or_else(|e| e.into_inner());
        record.requests.push(now_ms);
        record.token_usage.push((now_ms, tokens_used));
        debug!(
            event = "core.ratelimit.usage_recorded",
            user_id,
            tokens = tokens_used,
        );
    }

    /// Suspend a user and bump their violation count. `duration_ms`
    /// defaults to the configured suspension duration.
    pub fn suspend(&self, user_id: &str, duration_ms: Option<u64>) {
        self.suspend_at(user_id, duration_ms, Self::now_ms());
    }

    pub fn suspend_at(&self, user_id: &str, duration_ms: Option<u64>, now_ms: i64) {
        let duration = duration_ms.unwrap_or(self.config.suspension_duration_ms);
        let user = self.user(user_id);
        let mut record = user.lock().unwrap_or_else(|e| e.into_inner());
        record.violation_count += 1;
        record.suspended_until = Some(now_ms + duration as i64);
        info!(
            event = "core.ratelimit.user_suspended",
            user_id,
            duration_ms = duration,
            violations = record.violation_count,
        );
    }

    pub fn violation_count(&self, user_id: &str) -> u32 {
        let user = self.user(user_id);
        let record = user.lock().unwrap_or_else(|e| e.into_inner());
        record.violation_count
    }

    /// Snapshot every tracked user's counters.
    pub fn get_all_user_stats(&self) -> Vec<UserStats> {
        self.get_all_user_stats_at(Self::now_ms())
    }

    pub fn get_all_user_stats_at(&self, now_ms: i64) -> Vec<UserStats> {
        let users: Vec<(String, Arc<Mutex<UserRecord>>)> = {
            let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            users
                .iter()
                .map(|(id, record)| (id.clone(), record.clone()))
                .collect()
        };

        let mut stats: Vec<UserStats> = users
            .into_iter()
            .map(|(user_id, record)| {
                let mut record = record.lock().unwrap_or_else(|e| e.into_inner());
                record.prune(now_ms);
                UserStats {
                    user_id,
                    requests_this_minute: record.requests.len(),
                    tokens_this_minute: record.tokens_this_minute(now_ms),
                    tokens_this_hour: record.tokens_this_hour(),
                    violation_count: record.violation_count,
                    suspended_until_ms: record.suspended_until,
                }
            })
            .collect();
        stats.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        stats
    }

    /// Drop idle user records; runs at most every 5 minutes.
    fn maybe_sweep(&self, now_ms: i64) {
        {
            let mut last = self.last_sweep_ms.lock().unwrap_or_else(|e| e.into_inner());
            if now_ms - *last < IDLE_SWEEP_INTERVAL_MS {
                return;
            }
            *last = now_ms;
        }

        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let before = users.len();
        users.retain(|_, record| {
            let mut record = record.lock().unwrap_or_else(|e| e.into_inner());
            record.prune(now_ms);
            if let Some(until) = record.suspended_until
                && now_ms >= until
            {
                record.suspended_until = None;
            }
            !record.is_idle()
        });
        if users.len() < before {
            debug!(
                event = "core.ratelimit.idle_sweep",
                removed = before - users.len(),
            );
        }
    }

    /// Current per-user window internals for the abuse detector.
    pub(crate) fn window_snapshot(&self, user_id: &str, now_ms: i64) -> (usize, u64, u32) {
        let user = self.user(user_id);
        let mut record = user.lock().unwrap_or_else(|e| e.into_inner());
        record.prune(now_ms);
        (
            record.requests.len(),
            record.tokens_this_minute(now_ms),
            record.violation_count,
        )
    }
}

fn denied(
    record: &UserRecord,
    now_ms: i64,
    reason: String,
    retry_after: Option<u64>,
) -> RateLimitDecision {
    RateLimitDecision {
        allowed: false,
        reason: Some(reason),
        retry_after,
        requests_this_minute: record.requests.len(),
        tokens_this_minute: record.tokens_this_minute(now_ms),
        tokens_this_hour: record.tokens_this_hour(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_requests_per_minute: max_requests,
            ..Default::default()
        })
    }

    #[test]
    fn test_request_limit_denies_fourth_call() {
        let limiter = limiter(3);
        let now = 1_000_000;

        for i in 0..3 {
            let decision = limiter.check_limit_at("u1", None, now + i);
            assert!(decision.allowed, "call {} should be allowed", i);
            limiter.record_usage_at("u1", 100, now + i);
        }

        let denied = limiter.check_limit_at("u1", None, now + 10);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(60));
        assert!(denied.reason.as_ref().unwrap().contains("3 requests per minute"));
        assert_eq!(denied.requests_this_minute, 3);
    }

    #[test]
    fn test_window_slides() {
        let limiter = limiter(2);
        let now = 1_000_000;
        limiter.record_usage_at("u1", 10, now);
        limiter.record_usage_at("u1", 10, now + 1);

        assert!(!limiter.check_limit_at("u1", None, now + 2).allowed);
        // 61s later the minute window is empty again.
        let later = limiter.check_limit_at("u1", None, now + 61_000);
        assert!(later.allowed);
        assert_eq!(later.requests_this_minute, 0);
    }

    #[test]
    fn test_counter_matches_recorded_calls() {
        // P5: after N recorded calls, requestsThisMinute == N.
        let limiter = limiter(100);
        let now = 5_000_000;
        for i in 0..7 {
            limiter.record_usage_at("u1", 1, now + i);
        }
        let decision = limiter.check_limit_at("u1", None, now + 100);
        assert_eq!(decision.requests_this_minute, 7);
    }

    #[test]
    fn test_per_request_token_cap() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_tokens_per_request: 1000,
            ..Default::default()
        });
        let decision = limiter.check_limit_at("u1", Some(1001), 0);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("per request"));
        assert_eq!(decision.retry_after, None);
    }

    #[test]
    fn test_minute_token_budget() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_tokens_per_minute: 1000,
            max_tokens_per_hour: 100_000,
            ..Default::default()
        });
        let now = 1_000_000;
        limiter.record_usage_at("u1", 900, now);

        assert!(limiter.check_limit_at("u1", Some(100), now + 1).allowed);
        let denied = limiter.check_limit_at("u1", Some(101), now + 1);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(60));
    }

    #[test]
    fn test_hour_token_budget_retry_after_oldest_record() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_tokens_per_minute: 1_000_000,
            max_tokens_per_hour: 1000,
            ..Default::default()
        });
        let now = 10_000_000;
        limiter.record_usage_at("u1", 900, now);

        // 30 minutes later the record is 30 minutes from expiring.
        let later = now + 30 * 60_000;
        let denied = limiter.check_limit_at("u1", Some(200), later);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(30 * 60));
    }

    #[test]
    fn test_suspension_denies_with_countdown() {
        let limiter = limiter(100);
        let now = 1_000_000;
        limiter.suspend_at("u1", Some(10_000), now);

        let denied = limiter.check_limit_at("u1", None, now + 1_000);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(9));

        let after = limiter.check_limit_at("u1", None, now + 10_001);
        assert!(after.allowed);
        assert_eq!(limiter.violation_count("u1"), 1);
    }

    #[test]
    fn test_get_all_user_stats() {
        let limiter = limiter(100);
        let now = 1_000_000;
        limiter.record_usage_at("alice", 10, now);
        limiter.record_usage_at("bob", 20, now);
        limiter.record_usage_at("bob", 30, now + 1);

        let stats = limiter.get_all_user_stats_at(now + 10);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].user_id, "alice");
        assert_eq!(stats[0].tokens_this_hour, 10);
        assert_eq!(stats[1].user_id, "bob");
        assert_eq!(stats[1].requests_this_minute, 2);
        assert_eq!(stats[1].tokens_this_hour, 50);
    }
}
