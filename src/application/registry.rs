//! Central registry for fixed-window counters.
//!
//! The registry owns the counter storage, the clock and the immutable policy
//! set. It keeps one [`RateLimitCounter`] per `(policy, identity)` pair.

use crate::application::ports::{Clock, Storage};
use crate::domain::{counter::RateLimitCounter, policy::PolicySet, policy::RateLimitPolicy};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Key of a counter: policy name plus identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    policy: String,
    identity: String,
}

impl CounterKey {
    /// Create a key.
    pub fn new(policy: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            identity: identity.into(),
        }
    }

    /// Policy name.
    pub fn policy(&self) -> &str {
        &self.policy
    }

    /// Identity key (IP address or user id).
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.policy, self.identity)
    }
}

/// Registry managing all rate limit counters.
///
/// Generic over the storage implementation. In production, use
/// `Arc<ShardedStorage>`; clones of the registry then share state.
#[derive(Clone)]
pub struct CounterRegistry<S>
where
    S: Storage<CounterKey, RateLimitCounter> + Clone,
{
    storage: S,
    clock: Arc<dyn Clock>,
    policies: PolicySet,
}

impl<S> CounterRegistry<S>
where
    S: Storage<CounterKey, RateLimitCounter> + Clone,
{
    /// Create a new registry with storage, clock, and the policy set.
    pub fn new(storage: S, clock: Arc<dyn Clock>, policies: PolicySet) -> Self {
        Self {
            storage,
            clock,
            policies,
        }
    }

    /// Access or create the counter for `key` with a callback.
    ///
    /// A missing counter is created empty with its window opening now. The
    /// callback receives the counter and the current time, and runs while the
    /// entry is locked.
    pub fn with_counter<F, R>(&self, key: CounterKey, policy: &RateLimitPolicy, f: F) -> R
    where
        F: FnOnce(&mut RateLimitCounter, DateTime<Utc>) -> R,
    {
        let now = self.clock.now();
        self.storage.with_entry_mut(
            key,
            || RateLimitCounter::new(policy, now),
            |counter| f(counter, now),
        )
    }

    /// Read an existing counter without creating one.
    pub fn inspect<F, R>(&self, key: &CounterKey, f: F) -> Option<R>
    where
        F: FnOnce(&RateLimitCounter) -> R,
    {
        self.storage.with_existing_mut(key, |counter| f(counter))
    }

    /// The immutable policy set.
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Current time according to the registry's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get the number of tracked counters.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Clear all tracked state.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Iterate over all counters with a callback.
    pub fn for_each<F>(&self, f: F)
    where
        F: FnMut(&CounterKey, &RateLimitCounter),
    {
        self.storage.for_each(f);
    }

    /// Remove counters for which the predicate returns false.
    pub fn cleanup<F>(&self, f: F)
    where
        F: FnMut(&CounterKey, &mut RateLimitCounter) -> bool,
    {
        self.storage.retain(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::storage::ShardedStorage;
    use std::sync::Arc;

    fn registry() -> CounterRegistry<Arc<ShardedStorage<CounterKey, RateLimitCounter>>> {
        CounterRegistry::new(
            Arc::new(ShardedStorage::new()),
            Arc::new(SystemClock::new()),
            PolicySet::defaults(),
        )
    }

    #[test]
    fn test_registry_creation() {
        let registry = registry();

        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
        assert!(registry.policies().contains("api"));
    }

    #[test]
    fn test_with_counter_creates_then_reuses() {
        let registry = registry();
        let policy = *registry.policies().get("api").unwrap();
        let key = CounterKey::new("api", "198.51.100.1");

        registry.with_counter(key.clone(), &policy, |counter, now| {
            assert_eq!(counter.count(), 0);
            counter.register(&policy, now);
        });
        registry.with_counter(key.clone(), &policy, |counter, now| {
            counter.register(&policy, now);
        });

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.inspect(&key, |c| c.count()), Some(2));
    }

    #[test]
    fn test_inspect_does_not_create() {
        let registry = registry();

        assert_eq!(registry.inspect(&CounterKey::new("api", "nobody"), |c| c.count()), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_same_identity_under_different_policies() {
        let registry = registry();
        let api = *registry.policies().get("api").unwrap();
        let auth = *registry.policies().get("auth").unwrap();

        registry.with_counter(CounterKey::new("api", "u1"), &api, |_, _| {});
        registry.with_counter(CounterKey::new("auth", "u1"), &auth, |_, _| {});

        assert_eq!(registry.len(), 2);

        let mut keys = Vec::new();
        registry.for_each(|key, _| keys.push(key.to_string()));
        keys.sort();
        assert_eq!(keys, vec!["api:u1", "auth:u1"]);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let registry = Arc::new(registry());
        let policy = *registry.policies().get("api").unwrap();
        let mut handles = vec![];

        for i in 0..10 {
            let registry_clone = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = CounterKey::new("api", format!("{}-{}", i, j));
                    registry_clone.with_counter(key, &policy, |_, _| {});
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1000);
    }
}
