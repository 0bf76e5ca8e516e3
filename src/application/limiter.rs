//! Admission limiter.
//!
//! Decides whether a write action is admitted under a named fixed-window
//! policy, and reclaims counters once they can no longer matter.

use crate::application::error::BuildError;
use crate::application::metrics::AdmissionMetrics;
use crate::application::ports::{Clock, Housekeeper, Storage};
use crate::application::registry::{CounterKey, CounterRegistry};
use crate::domain::counter::{AdmissionDecision, RateLimitCounter};
use crate::domain::policy::PolicySet;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedStorage;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default storage backing an [`AdmissionLimiter`].
pub type CounterStorage = Arc<ShardedStorage<CounterKey, RateLimitCounter>>;

/// Default minimum time between two opportunistic garbage collection sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Error returned for integration mistakes in admission checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The policy name is not part of the configured policy set
    #[error("unknown rate limit policy `{0}`")]
    UnknownPolicy(String),
}

/// Fixed-window admission limiter.
///
/// Cheap to clone; clones share counters, metrics and sweep bookkeeping.
///
/// # Example
/// ```
/// use interaction_throttle::{AdmissionLimiter, PolicySet};
/// use std::time::Duration;
///
/// let policies = PolicySet::builder()
///     .with_limit("oauth_callback", 2, Duration::from_secs(60))
///     .unwrap()
///     .build()
///     .unwrap();
/// let limiter = AdmissionLimiter::builder().with_policies(policies).build().unwrap();
///
/// assert!(limiter.check("203.0.113.7", "oauth_callback").unwrap().is_allowed());
/// assert!(limiter.check("203.0.113.7", "oauth_callback").unwrap().is_allowed());
///
/// let denied = limiter.check("203.0.113.7", "oauth_callback").unwrap();
/// assert!(denied.is_denied());
/// assert!(denied.retry_after_secs.unwrap() > 0);
/// ```
#[derive(Clone)]
pub struct AdmissionLimiter<S = CounterStorage>
where
    S: Storage<CounterKey, RateLimitCounter> + Clone,
{
    registry: CounterRegistry<S>,
    metrics: AdmissionMetrics,
    sweep_interval: Duration,
    last_sweep_ms: Arc<AtomicI64>,
}

impl AdmissionLimiter<CounterStorage> {
    /// Start building a limiter backed by in-process sharded storage.
    pub fn builder() -> AdmissionLimiterBuilder {
        AdmissionLimiterBuilder::default()
    }
}

impl<S> AdmissionLimiter<S>
where
    S: Storage<CounterKey, RateLimitCounter> + Clone,
{
    /// Create a limiter over an existing registry.
    ///
    /// # Arguments
    /// * `registry` - Counter registry (which contains the clock and policies)
    /// * `metrics` - Metrics tracker
    /// * `sweep_interval` - Minimum time between opportunistic sweeps
    pub fn new(
        registry: CounterRegistry<S>,
        metrics: AdmissionMetrics,
        sweep_interval: Duration,
    ) -> Self {
        let started = registry.now().timestamp_millis();
        Self {
            registry,
            metrics,
            sweep_interval,
            last_sweep_ms: Arc::new(AtomicI64::new(started)),
        }
    }

    /// Check whether `identity_key` may perform an action under `policy_name`.
    ///
    /// A denial is returned as `Ok` with `allowed == false`. May run a garbage
    /// collection sweep first if the sweep interval has elapsed since the last one.
    ///
    /// # Errors
    /// Returns `AdmissionError::UnknownPolicy` if `policy_name` is not configured.
    pub fn check(
        &self,
        identity_key: &str,
        policy_name: &str,
    ) -> Result<AdmissionDecision, AdmissionError> {
        let policy = *self
            .registry
            .policies()
            .get(policy_name)
            .ok_or_else(|| AdmissionError::UnknownPolicy(policy_name.to_string()))?;

        self.maybe_sweep();

        let key = CounterKey::new(policy_name, identity_key);
        let decision = self
            .registry
            .with_counter(key, &policy, |counter, now| counter.register(&policy, now));

        if decision.is_allowed() {
            self.metrics.record_admitted();
        } else {
            self.metrics.record_denied();
            debug!(
                policy = policy_name,
                identity = identity_key,
                retry_after_secs = decision.retry_after_secs.unwrap_or_default(),
                "admission denied"
            );
        }

        Ok(decision)
    }

    /// Run a garbage collection sweep now.
    ///
    /// Removes every counter whose window started more than twice its length
    /// ago and returns how many were removed. Also restarts the opportunistic
    /// sweep interval.
    pub fn collect_garbage(&self) -> usize {
        let now = self.registry.now();
        self.last_sweep_ms
            .store(now.timestamp_millis(), Ordering::Release);
        self.sweep_at(now)
    }

    fn maybe_sweep(&self) {
        let now = self.registry.now();
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        let interval_ms = i64::try_from(self.sweep_interval.as_millis()).unwrap_or(i64::MAX);

        if now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        // Only the caller that wins the exchange sweeps
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.sweep_at(now);
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.registry.cleanup(|_, counter| {
            let stale = counter.is_stale(now);
            if stale {
                removed += 1;
            }
            !stale
        });

        self.metrics.record_collected(removed);
        debug!(
            removed,
            remaining = self.registry.len(),
            "swept stale rate limit counters"
        );
        removed
    }

    /// Get a reference to the registry.
    pub fn registry(&self) -> &CounterRegistry<S> {
        &self.registry
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }

    /// The configured policy set.
    pub fn policies(&self) -> &PolicySet {
        self.registry.policies()
    }

    /// Minimum time between opportunistic sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Check if no counters are tracked.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Drop every counter.
    pub fn clear(&self) {
        self.registry.clear();
    }
}

impl<S> Housekeeper for AdmissionLimiter<S>
where
    S: Storage<CounterKey, RateLimitCounter> + Clone,
{
    fn name(&self) -> &'static str {
        "admission"
    }

    fn sweep(&self) -> usize {
        self.collect_garbage()
    }
}

/// Builder for an [`AdmissionLimiter`].
pub struct AdmissionLimiterBuilder {
    policies: PolicySet,
    clock: Option<Arc<dyn Clock>>,
    sweep_interval: Duration,
}

impl Default for AdmissionLimiterBuilder {
    fn default() -> Self {
        Self {
            policies: PolicySet::defaults(),
            clock: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl AdmissionLimiterBuilder {
    /// Set the policy set. Defaults to [`PolicySet::defaults`].
    pub fn with_policies(mut self, policies: PolicySet) -> Self {
        self.policies = policies;
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the minimum time between opportunistic garbage collection sweeps.
    ///
    /// Default: 5 minutes. Validated when `build()` is called.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Build the limiter.
    ///
    /// # Errors
    /// Returns `BuildError::ZeroSweepInterval` if the sweep interval is zero.
    pub fn build(self) -> Result<AdmissionLimiter, BuildError> {
        if self.sweep_interval.is_zero() {
            return Err(BuildError::ZeroSweepInterval);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let registry = CounterRegistry::new(Arc::new(ShardedStorage::new()), clock, self.policies);

        Ok(AdmissionLimiter::new(
            registry,
            AdmissionMetrics::new(),
            self.sweep_interval,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{MockCaptureLayer, MockClock};
    use tracing_subscriber::layer::SubscriberExt;

    fn limiter_with(limit: u32, window: Duration) -> (AdmissionLimiter, MockClock) {
        let clock = MockClock::new(Utc::now());
        let policies = PolicySet::builder()
            .with_limit("test", limit, window)
            .unwrap()
            .build()
            .unwrap();
        let limiter = AdmissionLimiter::builder()
            .with_policies(policies)
            .with_clock(Arc::new(clock.clone()))
            .build()
            .unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_fixed_window_admits_limit_then_denies() {
        let (limiter, _clock) = limiter_with(5, Duration::from_secs(60));

        let remaining: Vec<u32> = (0..5)
            .map(|_| limiter.check("10.0.0.1", "test").unwrap())
            .inspect(|d| assert!(d.is_allowed()))
            .map(|d| d.remaining)
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let sixth = limiter.check("10.0.0.1", "test").unwrap();
        assert!(sixth.is_denied());
        assert_eq!(sixth.remaining, 0);
        assert!(sixth.retry_after_secs.unwrap() > 0);
    }

    #[test]
    fn test_window_rollover_resets_counter() {
        let (limiter, clock) = limiter_with(5, Duration::from_secs(60));

        for _ in 0..6 {
            limiter.check("10.0.0.1", "test").unwrap();
        }

        clock.advance(Duration::from_secs(60));
        let decision = limiter.check("10.0.0.1", "test").unwrap();

        assert!(decision.is_allowed());
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_retry_after_counts_down() {
        let (limiter, clock) = limiter_with(1, Duration::from_secs(60));

        limiter.check("k", "test").unwrap();
        clock.advance(Duration::from_secs(45));

        let denied = limiter.check("k", "test").unwrap();
        assert_eq!(denied.retry_after_secs, Some(15));
    }

    #[test]
    fn test_key_isolation() {
        let (limiter, _clock) = limiter_with(2, Duration::from_secs(60));

        for _ in 0..5 {
            limiter.check("attacker", "test").unwrap();
        }
        assert!(limiter.check("attacker", "test").unwrap().is_denied());

        let other = limiter.check("bystander", "test").unwrap();
        assert!(other.is_allowed());
        assert_eq!(other.remaining, 1);
    }

    #[test]
    fn test_unknown_policy_is_an_error() {
        let (limiter, _clock) = limiter_with(2, Duration::from_secs(60));

        assert_eq!(
            limiter.check("k", "nope"),
            Err(AdmissionError::UnknownPolicy("nope".to_string()))
        );
        assert!(limiter.is_empty(), "no counter for unknown policy");
    }

    #[test]
    fn test_collect_garbage_removes_only_stale_counters() {
        let (limiter, clock) = limiter_with(5, Duration::from_secs(60));

        limiter.check("old", "test").unwrap();
        clock.advance(Duration::from_secs(60));
        limiter.check("recent", "test").unwrap();

        // "old" started 121s ago, "recent" 61s ago
        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.collect_garbage(), 1);

        assert_eq!(limiter.len(), 1);
        let key = CounterKey::new("test", "recent");
        assert!(limiter.registry().inspect(&key, |_| ()).is_some());
        assert_eq!(limiter.metrics().counters_collected(), 1);
    }

    #[test]
    fn test_counter_at_exactly_twice_window_survives() {
        let (limiter, clock) = limiter_with(5, Duration::from_secs(60));

        limiter.check("edge", "test").unwrap();
        clock.advance(Duration::from_secs(120));

        assert_eq!(limiter.collect_garbage(), 0);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_opportunistic_sweep_runs_after_interval() {
        let (limiter, clock) = limiter_with(5, Duration::from_secs(60));

        limiter.check("old", "test").unwrap();

        // Stale but the sweep interval has not elapsed yet
        clock.advance(Duration::from_secs(4 * 60));
        limiter.check("fresh", "test").unwrap();
        assert_eq!(limiter.len(), 2);

        clock.advance(Duration::from_secs(60));
        limiter.check("fresh", "test").unwrap();
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.metrics().counters_collected(), 1);
    }

    #[test]
    fn test_collected_key_starts_over() {
        let (limiter, clock) = limiter_with(3, Duration::from_secs(60));

        for _ in 0..3 {
            limiter.check("returning", "test").unwrap();
        }
        clock.advance(Duration::from_secs(121));
        limiter.collect_garbage();
        assert!(limiter.is_empty());

        let decision = limiter.check("returning", "test").unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, clock.now() + chrono::TimeDelta::seconds(60));
    }

    #[test]
    fn test_concurrent_checks_never_double_admit() {
        use std::thread;

        let (limiter, _clock) = limiter_with(50, Duration::from_secs(60));
        let limiter = Arc::new(limiter);
        let mut handles = vec![];

        for _ in 0..10 {
            let limiter_clone = Arc::clone(&limiter);
            handles.push(thread::spawn(move || {
                (0..20)
                    .filter(|_| limiter_clone.check("shared", "test").unwrap().is_allowed())
                    .count()
            }));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 50);
        assert_eq!(limiter.metrics().admitted(), 50);
        assert_eq!(limiter.metrics().denied(), 150);
    }

    #[test]
    fn test_denial_is_logged() {
        let (limiter, _clock) = limiter_with(1, Duration::from_secs(60));
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            limiter.check("10.0.0.9", "test").unwrap();
            limiter.check("10.0.0.9", "test").unwrap();
        });

        let denials = capture.matching("admission denied");
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].fields.get("policy").map(String::as_str), Some("test"));
        assert_eq!(denials[0].fields.get("identity").map(String::as_str), Some("10.0.0.9"));
    }

    #[test]
    fn test_builder_rejects_zero_sweep_interval() {
        let result = AdmissionLimiter::builder()
            .with_sweep_interval(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(BuildError::ZeroSweepInterval)));
    }

    #[test]
    fn test_builder_defaults() {
        let limiter = AdmissionLimiter::builder().build().unwrap();

        assert_eq!(limiter.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(limiter.policies(), &PolicySet::defaults());
        assert!(limiter.check("k", "api").unwrap().is_allowed());
    }

    #[test]
    fn test_housekeeper_sweep() {
        let (limiter, clock) = limiter_with(5, Duration::from_secs(1));

        limiter.check("k", "test").unwrap();
        clock.advance(Duration::from_secs(3));

        let housekeeper: &dyn Housekeeper = &limiter;
        assert_eq!(housekeeper.name(), "admission");
        assert_eq!(housekeeper.sweep(), 1);
    }
}
