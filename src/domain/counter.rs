//! Fixed-window counters and the admission decisions they produce.

use crate::domain::policy::RateLimitPolicy;
use crate::domain::window::{ceil_secs, FixedWindow};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of an admission check.
///
/// A denial is a regular value, not an error: callers branch on
/// [`is_allowed`](Self::is_allowed) and turn a denial into an HTTP 429 (or
/// equivalent) using [`retry_after_secs`](Self::retry_after_secs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionDecision {
    /// Whether the action is admitted
    pub allowed: bool,
    /// The policy limit this decision was made against
    pub limit: u32,
    /// Actions still admissible in the current window
    pub remaining: u32,
    /// When the current window closes
    pub reset_at: DateTime<Utc>,
    /// Seconds until a retry can succeed; only set on denial
    pub retry_after_secs: Option<u64>,
}

impl AdmissionDecision {
    /// Check if the action was admitted.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Check if the action was denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }

    /// Conventional rate-limit response headers for this decision.
    ///
    /// Always includes `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
    /// `X-RateLimit-Reset` (unix seconds); adds `Retry-After` on denial.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at.timestamp().to_string()),
        ];
        if let Some(retry_after) = self.retry_after_secs {
            headers.push(("Retry-After", retry_after.to_string()));
        }
        headers
    }
}

/// Counter for one `(policy, identity)` pair.
///
/// `count` only grows while the window is open. The first request after the
/// window closes replaces the window and restarts the count instead of
/// incrementing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCounter {
    count: u32,
    window: FixedWindow,
}

impl RateLimitCounter {
    /// Create an empty counter whose window opens at `now`.
    pub fn new(policy: &RateLimitPolicy, now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window: FixedWindow::new(now, policy.window()),
        }
    }

    /// Register one request and decide whether to admit it.
    pub fn register(&mut self, policy: &RateLimitPolicy, now: DateTime<Utc>) -> AdmissionDecision {
        if !self.window.is_open(now) {
            self.window = FixedWindow::new(now, policy.window());
            self.count = 0;
        }

        let limit = policy.limit();
        let reset_at = self.window.ends_at();

        if self.count >= limit {
            return AdmissionDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
                retry_after_secs: Some(ceil_secs(self.window.remaining(now)).max(1)),
            };
        }

        self.count += 1;
        AdmissionDecision {
            allowed: true,
            limit,
            remaining: limit - self.count,
            reset_at,
            retry_after_secs: None,
        }
    }

    /// Actions admitted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// When the current window opened.
    pub fn window_start(&self) -> DateTime<Utc> {
        self.window.start()
    }

    /// Whether the counter can be discarded (see [`FixedWindow::is_stale`]).
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.window.is_stale(now)
    }
}
