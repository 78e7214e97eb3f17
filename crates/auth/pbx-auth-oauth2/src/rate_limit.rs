//! Per-user refresh rate limiting: sliding window plus cooldown.
//!
//! The table is process-local and reset on restart; it bounds refresh call
//! frequency on a single instance and is not a correctness guarantee under
//! horizontal scaling. Callers depend only on [`RefreshRateLimiter::check`]
//! returning a [`Decision`], so a shared store with atomic increment and TTL
//! can replace the local map without touching them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Window and cooldown tuning for the refresh limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Attempts permitted inside one window.
    pub max_attempts: u32,
    /// Sliding window length in seconds.
    pub window_seconds: i64,
    /// Cooldown imposed once the window limit is exceeded, in seconds.
    pub cooldown_seconds: i64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            window_seconds: 60,
            cooldown_seconds: 300,
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Rejected until `reset_at`; no upstream call may be made.
    Limited { reset_at: DateTime<Utc> },
}

#[derive(Debug)]
struct RateLimitEntry {
    count: u32,
    window_start: DateTime<Utc>,
    is_limited: bool,
    cooldown_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            is_limited: false,
            cooldown_until: None,
        }
    }

    fn reset(&mut self, now: DateTime<Utc>) {
        self.count = 0;
        self.window_start = now;
        self.is_limited = false;
        self.cooldown_until = None;
    }
}

/// Sliding-window rate limiter keyed by user id.
///
/// All entries live behind one async mutex so check-and-increment is atomic:
/// two concurrent refreshes for the same user cannot both observe "not
/// limited" on the call that crosses the limit.
pub struct RefreshRateLimiter {
    settings: RateLimitSettings,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RefreshRateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check and count one refresh attempt for `user_key`.
    pub async fn check(&self, user_key: &str) -> Decision {
        self.check_at(user_key, Utc::now()).await
    }

    /// Record that the provider itself throttled this user; every call is
    /// rejected until the returned cooldown deadline.
    pub async fn mark_limited(&self, user_key: &str) -> DateTime<Utc> {
        self.mark_limited_at(user_key, Utc::now()).await
    }

    pub async fn check_at(&self, user_key: &str, now: DateTime<Utc>) -> Decision {
        let window = Duration::seconds(self.settings.window_seconds);
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(user_key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));

        if entry.is_limited {
            match entry.cooldown_until {
                Some(until) if now < until => {
                    debug!(user = user_key, reset_at = %until, "refresh rejected, cooldown active");
                    return Decision::Limited { reset_at: until };
                }
                _ => entry.reset(now),
            }
        }

        if now - entry.window_start >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;

        if entry.count > self.settings.max_attempts {
            let reset_at = now + Duration::seconds(self.settings.cooldown_seconds);
            entry.is_limited = true;
            entry.cooldown_until = Some(reset_at);
            warn!(
                user = user_key,
                attempts = entry.count,
                reset_at = %reset_at,
                "refresh window exceeded, cooldown started"
            );
            return Decision::Limited { reset_at };
        }

        Decision::Allowed
    }

    pub async fn mark_limited_at(&self, user_key: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        let reset_at = now + Duration::seconds(self.settings.cooldown_seconds);
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(user_key.to_string())
            .or_insert_with(|| RateLimitEntry::new(now));

        entry.is_limited = true;
        entry.cooldown_until = Some(reset_at);
        warn!(user = user_key, reset_at = %reset_at, "provider throttled user, cooldown imposed");
        reset_at
    }

    #[cfg(test)]
    async fn count(&self, user_key: &str) -> Option<u32> {
        let entries = self.entries.lock().await;
        entries.get(user_key).map(|entry| entry.count)
    }
}
