//! # Rate Limiter
//!
//! Per-user, per-tier quota enforcement across three fixed request windows
//! (minute/hour/day) plus an independent daily token budget. Windows are
//! fixed counters keyed by truncated timestamp, not sliding, so a client can
//! burst up to 2x a limit across a window boundary. That inaccuracy is an
//! accepted trade-off for O(1) state per user, not a bug.
//!
//! Admission is all-or-nothing: every window is checked before any window
//! is incremented, so a rejection consumes nothing.

use crate::config::QuotaSettings;
use crate::models::Tier;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Request and token ceilings for one tier. Strictly increasing across the
/// built-in tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub requests_per_minute: u64,
    pub requests_per_hour: u64,
    pub requests_per_day: u64,
    pub tokens_per_day: u64,
}

impl TierLimits {
    /// Production quota table.
    pub fn builtin(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                requests_per_minute: 10,
                requests_per_hour: 100,
                requests_per_day: 500,
                tokens_per_day: 50_000,
            },
            Tier::Basic => Self {
                requests_per_minute: 30,
                requests_per_hour: 500,
                requests_per_day: 5_000,
                tokens_per_day: 500_000,
            },
            Tier::Pro => Self {
                requests_per_minute: 100,
                requests_per_hour: 2_000,
                requests_per_day: 20_000,
                tokens_per_day: 2_000_000,
            },
            Tier::Enterprise => Self {
                requests_per_minute: 1_000,
                requests_per_hour: 10_000,
                requests_per_day: 100_000,
                tokens_per_day: 10_000_000,
            },
        }
    }

    fn request_limit(&self, window: WindowKind) -> u64 {
        match window {
            WindowKind::Minute => self.requests_per_minute,
            WindowKind::Hour => self.requests_per_hour,
            WindowKind::Day => self.requests_per_day,
        }
    }
}

/// The three fixed request windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    pub const ALL: [WindowKind; 3] = [WindowKind::Minute, WindowKind::Hour, WindowKind::Day];

    pub fn duration_secs(&self) -> i64 {
        match self {
            WindowKind::Minute => 60,
            WindowKind::Hour => 3_600,
            WindowKind::Day => 86_400,
        }
    }

    /// Truncate a unix timestamp to this window's start.
    pub fn truncate(&self, now: i64) -> i64 {
        now - now.rem_euclid(self.duration_secs())
    }
}

/// Why an admission was rejected. Token exhaustion is deliberately distinct
/// from request-count exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    RequestWindow(WindowKind),
    TokenBudget,
}

/// Outcome of `check_and_consume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub retry_after: Option<Duration>,
    pub rejected_by: Option<RejectReason>,
}

impl Admission {
    fn granted() -> Self {
        Self {
            allowed: true,
            retry_after: None,
            rejected_by: None,
        }
    }

    fn rejected(reason: RejectReason, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
            rejected_by: Some(reason),
        }
    }
}

/// Read-only usage report for one user.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaReport {
    pub user_id: String,
    pub tier: Tier,
    pub limits: TierLimits,
    pub used_minute: u64,
    pub used_hour: u64,
    pub used_day: u64,
    pub tokens_used_today: u64,
    pub tokens_remaining_today: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowCounter {
    window_start: i64,
    count: u64,
}

impl WindowCounter {
    /// Roll to the current window if the stored one has elapsed, then
    /// return the live count.
    fn current(&mut self, kind: WindowKind, now: i64) -> u64 {
        let start = kind.truncate(now);
        if start != self.window_start {
            self.window_start = start;
            self.count = 0;
        }
        self.count
    }
}

#[derive(Debug, Default)]
struct UserUsage {
    minute: WindowCounter,
    hour: WindowCounter,
    day: WindowCounter,
    tokens: WindowCounter,
}

impl UserUsage {
    fn window_mut(&mut self, kind: WindowKind) -> &mut WindowCounter {
        match kind {
            WindowKind::Minute => &mut self.minute,
            WindowKind::Hour => &mut self.hour,
            WindowKind::Day => &mut self.day,
        }
    }
}

/// Multi-window, multi-tier rate limiter. Per-user state lives behind a
/// per-entry mutex so concurrent requests for the same user serialize while
/// unrelated users never contend.
#[derive(Debug, Default)]
pub struct RateLimiter {
    settings: QuotaSettings,
    users: DashMap<String, Mutex<UserUsage>>,
}

impl RateLimiter {
    pub fn new(settings: QuotaSettings) -> Self {
        Self {
            settings,
            users: DashMap::new(),
        }
    }

    /// Check every window and the daily token budget; consume from all
    /// request windows only if every check passes.
    ///
    /// `weight` scales consumption for expensive endpoints (>= 1).
    pub fn check_and_consume(&self, user_id: &str, tier: Tier, weight: u64) -> Admission {
        self.check_and_consume_at(user_id, tier, weight, chrono::Utc::now().timestamp())
    }

    /// Deterministic-time variant of [`check_and_consume`](Self::check_and_consume),
    /// for tests and embedders that drive their own clock.
    pub fn check_and_consume_at(&self, user_id: &str, tier: Tier, weight: u64, now: i64) -> Admission {
        let limits = self.settings.limits_for(tier);
        let weight = weight.max(1);
        let entry = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| Mutex::new(UserUsage::default()));
        let mut usage = entry.lock();

        // Check phase: no window is touched until all pass.
        for kind in WindowKind::ALL {
            let current = usage.window_mut(kind).current(kind, now);
            let limit = limits.request_limit(kind);
            if current + weight > limit {
                let retry_after = (kind.truncate(now) + kind.duration_secs() - now).max(1) as u64;
                debug!(
                    user = %user_id,
                    tier = tier.as_str(),
                    window = ?kind,
                    used = current,
                    limit,
                    "⛔ Rate limit exceeded"
                );
                return Admission::rejected(
                    RejectReason::RequestWindow(kind),
                    Duration::from_secs(retry_after),
                );
            }
        }

        let tokens_used = usage.tokens.current(WindowKind::Day, now);
        if tokens_used >= limits.tokens_per_day {
            let day = WindowKind::Day;
            let retry_after = (day.truncate(now) + day.duration_secs() - now).max(1) as u64;
            debug!(
                user = %user_id,
                tier = tier.as_str(),
                tokens_used,
                limit = limits.tokens_per_day,
                "⛔ Daily token budget exhausted"
            );
            return Admission::rejected(RejectReason::TokenBudget, Duration::from_secs(retry_after));
        }

        // Consume phase.
        for kind in WindowKind::ALL {
            usage.window_mut(kind).count += weight;
        }
        Admission::granted()
    }

    /// Record tokens actually spent by a completed call.
    ///
    /// Always records; the spend already happened. An overrun is logged
    /// and takes effect at the next admission check rather than failing the
    /// call that consumed the tokens. Returns the new daily total.
    pub fn consume_tokens(&self, user_id: &str, tier: Tier, tokens: u64) -> u64 {
        self.consume_tokens_at(user_id, tier, tokens, chrono::Utc::now().timestamp())
    }

    /// Deterministic-time variant of [`consume_tokens`](Self::consume_tokens).
    pub fn consume_tokens_at(&self, user_id: &str, tier: Tier, tokens: u64, now: i64) -> u64 {
        let limits = self.settings.limits_for(tier);
        let entry = self
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| Mutex::new(UserUsage::default()));
        let mut usage = entry.lock();

        usage.tokens.current(WindowKind::Day, now);
        usage.tokens.count += tokens;
        let total = usage.tokens.count;

        if total > limits.tokens_per_day {
            warn!(
                user = %user_id,
                tier = tier.as_str(),
                tokens_used = total,
                limit = limits.tokens_per_day,
                "Token budget overrun; further requests will be rejected"
            );
        }
        total
    }

    /// Read-only usage snapshot. Does not consume anything.
    pub fn quota(&self, user_id: &str, tier: Tier) -> QuotaReport {
        self.quota_at(user_id, tier, chrono::Utc::now().timestamp())
    }

    /// Deterministic-time variant of [`quota`](Self::quota).
    pub fn quota_at(&self, user_id: &str, tier: Tier, now: i64) -> QuotaReport {
        let limits = self.settings.limits_for(tier);
        let (used_minute, used_hour, used_day, tokens_used) = match self.users.get(user_id) {
            Some(entry) => {
                let mut usage = entry.lock();
                (
                    usage.minute.current(WindowKind::Minute, now),
                    usage.hour.current(WindowKind::Hour, now),
                    usage.day.current(WindowKind::Day, now),
                    usage.tokens.current(WindowKind::Day, now),
                )
            }
            None => (0, 0, 0, 0),
        };

        QuotaReport {
            user_id: user_id.to_string(),
            tier,
            tokens_remaining_today: limits.tokens_per_day.saturating_sub(tokens_used),
            used_minute,
            used_hour,
            used_day,
            tokens_used_today: tokens_used,
            limits,
        }
    }

    /// Administrative override: zero all windows and token usage for a user.
    pub fn reset(&self, user_id: &str) {
        self.users.remove(user_id);
        info!(user = %user_id, "🚨 Rate limits reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(QuotaSettings::default())
    }

    const NOW: i64 = 1_756_200_000; // mid-window reference point

    #[test]
    fn tier_limits_strictly_increase() {
        let tiers = [Tier::Free, Tier::Basic, Tier::Pro, Tier::Enterprise];
        for pair in tiers.windows(2) {
            let lo = TierLimits::builtin(pair[0]);
            let hi = TierLimits::builtin(pair[1]);
            assert!(lo.requests_per_minute < hi.requests_per_minute);
            assert!(lo.requests_per_hour < hi.requests_per_hour);
            assert!(lo.requests_per_day < hi.requests_per_day);
            assert!(lo.tokens_per_day < hi.tokens_per_day);
        }
    }

    #[test]
    fn free_tier_admits_exactly_the_minute_limit() {
        let limiter = limiter();
        for i in 0..10 {
            let admission = limiter.check_and_consume_at("u1", Tier::Free, 1, NOW);
            assert!(admission.allowed, "request {i} should be admitted");
        }

        let eleventh = limiter.check_and_consume_at("u1", Tier::Free, 1, NOW);
        assert!(!eleventh.allowed);
        assert_eq!(
            eleventh.rejected_by,
            Some(RejectReason::RequestWindow(WindowKind::Minute))
        );
        assert!(eleventh.retry_after.unwrap() > Duration::ZERO);
    }

    #[test]
    fn rejection_consumes_nothing() {
        let limiter = limiter();
        for _ in 0..10 {
            assert!(limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);
        }
        // Rejected attempts must not advance any window.
        for _ in 0..5 {
            assert!(!limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);
        }
        let report = limiter.quota_at("u1", Tier::Free, NOW);
        assert_eq!(report.used_minute, 10);
        assert_eq!(report.used_hour, 10);
        assert_eq!(report.used_day, 10);
    }

    #[test]
    fn minute_window_rolls_but_hour_window_accumulates() {
        let limiter = limiter();
        for _ in 0..10 {
            assert!(limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);
        }
        assert!(!limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);

        // Next minute window: minute count resets, hour count carries.
        let next_minute = NOW + 60;
        assert!(limiter
            .check_and_consume_at("u1", Tier::Free, 1, next_minute)
            .allowed);
        let report = limiter.quota_at("u1", Tier::Free, next_minute);
        assert_eq!(report.used_minute, 1);
        assert_eq!(report.used_hour, 11);
    }

    #[test]
    fn weight_scales_consumption_all_or_nothing() {
        let limiter = limiter();
        // Free tier: 10/min. Weight 4 admits twice (8), then rejects.
        assert!(limiter.check_and_consume_at("u1", Tier::Free, 4, NOW).allowed);
        assert!(limiter.check_and_consume_at("u1", Tier::Free, 4, NOW).allowed);
        assert!(!limiter.check_and_consume_at("u1", Tier::Free, 4, NOW).allowed);
        // A lighter request still fits under the cap.
        assert!(limiter.check_and_consume_at("u1", Tier::Free, 2, NOW).allowed);
    }

    #[test]
    fn token_budget_rejects_at_next_admission() {
        let limiter = limiter();
        assert!(limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);

        let total = limiter.consume_tokens_at("u1", Tier::Free, 50_000, NOW);
        assert_eq!(total, 50_000);

        let admission = limiter.check_and_consume_at("u1", Tier::Free, 1, NOW);
        assert!(!admission.allowed);
        assert_eq!(admission.rejected_by, Some(RejectReason::TokenBudget));
    }

    #[test]
    fn token_budget_is_independent_of_request_windows() {
        let limiter = limiter();
        limiter.consume_tokens_at("u1", Tier::Free, 10_000, NOW);
        let report = limiter.quota_at("u1", Tier::Free, NOW);
        assert_eq!(report.used_minute, 0);
        assert_eq!(report.tokens_used_today, 10_000);
        assert_eq!(report.tokens_remaining_today, 40_000);
    }

    #[test]
    fn reset_zeroes_all_state() {
        let limiter = limiter();
        for _ in 0..10 {
            limiter.check_and_consume_at("u1", Tier::Free, 1, NOW);
        }
        limiter.consume_tokens_at("u1", Tier::Free, 49_999, NOW);
        limiter.reset("u1");

        let report = limiter.quota_at("u1", Tier::Free, NOW);
        assert_eq!(report.used_minute, 0);
        assert_eq!(report.tokens_used_today, 0);
        assert!(limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);
    }

    #[test]
    fn users_do_not_share_windows() {
        let limiter = limiter();
        for _ in 0..10 {
            assert!(limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);
        }
        assert!(!limiter.check_and_consume_at("u1", Tier::Free, 1, NOW).allowed);
        assert!(limiter.check_and_consume_at("u2", Tier::Free, 1, NOW).allowed);
    }
}
