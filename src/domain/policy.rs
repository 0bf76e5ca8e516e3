//! Named fixed-window rate limiting policies.
//!
//! A policy is a `(limit, window)` pair. Policies are grouped into an immutable
//! [`PolicySet`] that is built once at process start, either from the built-in
//! defaults, a builder, or any serde-compatible configuration source.

use chrono::TimeDelta;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error returned when a policy or policy set is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A policy must admit at least one action per window
    #[error("limit must be greater than 0")]
    ZeroLimit,
    /// A policy window must have a length
    #[error("window must be greater than 0")]
    ZeroWindow,
    /// The window cannot be represented as a wall-clock offset
    #[error("window of {0:?} is too large")]
    WindowTooLarge(Duration),
    /// Policy names are used as counter keys and must not be blank
    #[error("policy name must not be empty")]
    EmptyName,
    /// A named policy failed validation
    #[error("policy `{name}`: {source}")]
    Invalid {
        /// Name of the offending policy
        name: String,
        /// Underlying validation failure
        #[source]
        source: Box<PolicyError>,
    },
}

/// Fixed-window rate limiting policy.
///
/// Admits at most `limit` actions per identity within each window of length
/// `window`. The window is fixed, not sliding: a burst straddling a window
/// boundary can be admitted up to twice the limit.
///
/// # Example
/// ```
/// use interaction_throttle::RateLimitPolicy;
/// use std::time::Duration;
///
/// let policy = RateLimitPolicy::new(5, Duration::from_secs(60)).unwrap();
/// assert_eq!(policy.limit(), 5);
///
/// assert!(RateLimitPolicy::new(0, Duration::from_secs(60)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PolicyConfig")]
pub struct RateLimitPolicy {
    limit: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// Create a new policy.
    ///
    /// # Errors
    /// Returns `PolicyError` if `limit` or `window` is zero, or if the window is
    /// too large to add to a timestamp.
    pub fn new(limit: u32, window: Duration) -> Result<Self, PolicyError> {
        if limit == 0 {
            return Err(PolicyError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        if TimeDelta::from_std(window).is_err() {
            return Err(PolicyError::WindowTooLarge(window));
        }
        Ok(Self { limit, window })
    }

    /// Maximum admitted actions per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Length of the fixed window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Wire shape of a policy in configuration files.
#[derive(Debug, Clone, Copy, Deserialize)]
struct PolicyConfig {
    limit: u32,
    window_ms: u64,
}

impl TryFrom<PolicyConfig> for RateLimitPolicy {
    type Error = PolicyError;

    fn try_from(config: PolicyConfig) -> Result<Self, Self::Error> {
        RateLimitPolicy::new(config.limit, Duration::from_millis(config.window_ms))
    }
}

/// Built-in policies as `(name, limit, window in milliseconds)`.
pub const DEFAULT_POLICIES: &[(&str, u32, u64)] = &[
    ("auth", 10, 60_000),
    ("oauth_callback", 5, 60_000),
    ("session", 30, 60_000),
    ("api", 100, 60_000),
    ("upload", 20, 3_600_000),
    ("cron", 2, 60_000),
];

/// Immutable set of named policies.
///
/// Cheap to clone; all clones share the same underlying map.
///
/// # Example
/// ```
/// use interaction_throttle::{PolicySet, RateLimitPolicy};
/// use std::time::Duration;
///
/// let policies = PolicySet::builder()
///     .with_policy("api", RateLimitPolicy::new(100, Duration::from_secs(60)).unwrap())
///     .build()
///     .unwrap();
///
/// assert_eq!(policies.get("api").map(|p| p.limit()), Some(100));
/// assert!(policies.get("upload").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, RateLimitPolicy>")]
pub struct PolicySet {
    policies: Arc<BTreeMap<String, RateLimitPolicy>>,
}

impl PolicySet {
    /// Start building a policy set.
    pub fn builder() -> PolicySetBuilder {
        PolicySetBuilder::default()
    }

    /// The built-in policies (`auth`, `oauth_callback`, `session`, `api`,
    /// `upload`, `cron`).
    pub fn defaults() -> Self {
        let policies = DEFAULT_POLICIES
            .iter()
            .map(|&(name, limit, window_ms)| {
                (
                    name.to_string(),
                    RateLimitPolicy {
                        limit,
                        window: Duration::from_millis(window_ms),
                    },
                )
            })
            .collect();
        Self {
            policies: Arc::new(policies),
        }
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(name)
    }

    /// Check whether a policy with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    /// Iterate over policy names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Iterate over `(name, policy)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateLimitPolicy)> {
        self.policies.iter().map(|(name, policy)| (name.as_str(), policy))
    }

    /// Number of policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicySet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl TryFrom<BTreeMap<String, RateLimitPolicy>> for PolicySet {
    type Error = PolicyError;

    fn try_from(policies: BTreeMap<String, RateLimitPolicy>) -> Result<Self, Self::Error> {
        if policies.keys().any(|name| name.trim().is_empty()) {
            return Err(PolicyError::EmptyName);
        }
        Ok(Self {
            policies: Arc::new(policies),
        })
    }
}

/// Builder for a [`PolicySet`].
#[derive(Debug, Clone, Default)]
pub struct PolicySetBuilder {
    policies: BTreeMap<String, RateLimitPolicy>,
}

impl PolicySetBuilder {
    /// Start from the built-in defaults instead of an empty set.
    pub fn from_defaults() -> Self {
        Self {
            policies: (*PolicySet::defaults().policies).clone(),
        }
    }

    /// Add or replace a named policy.
    pub fn with_policy(mut self, name: impl Into<String>, policy: RateLimitPolicy) -> Self {
        self.policies.insert(name.into(), policy);
        self
    }

    /// Add or replace a named policy from raw values.
    ///
    /// # Errors
    /// Returns `PolicyError::Invalid` naming the policy if the values are rejected.
    pub fn with_limit(
        self,
        name: impl Into<String>,
        limit: u32,
        window: Duration,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        match RateLimitPolicy::new(limit, window) {
            Ok(policy) => Ok(self.with_policy(name, policy)),
            Err(source) => Err(PolicyError::Invalid {
                name,
                source: Box::new(source),
            }),
        }
    }

    /// Build the immutable set.
    ///
    /// # Errors
    /// Returns `PolicyError::EmptyName` if any policy has a blank name.
    pub fn build(self) -> Result<PolicySet, PolicyError> {
        PolicySet::try_from(self.policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_validation() {
        assert_eq!(
            RateLimitPolicy::new(0, Duration::from_secs(1)),
            Err(PolicyError::ZeroLimit)
        );
        assert_eq!(
            RateLimitPolicy::new(1, Duration::ZERO),
            Err(PolicyError::ZeroWindow)
        );
        assert!(matches!(
            RateLimitPolicy::new(1, Duration::MAX),
            Err(PolicyError::WindowTooLarge(_))
        ));

        let policy = RateLimitPolicy::new(5, Duration::from_secs(60)).unwrap();
        assert_eq!(policy.limit(), 5);
        assert_eq!(policy.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_defaults_are_valid() {
        let policies = PolicySet::defaults();

        assert_eq!(policies.len(), DEFAULT_POLICIES.len());
        for (name, policy) in policies.iter() {
            assert!(
                RateLimitPolicy::new(policy.limit(), policy.window()).is_ok(),
                "default policy {} should pass validation",
                name
            );
        }
        assert!(policies.contains("oauth_callback"));
    }

    #[test]
    fn test_builder_replaces_existing() {
        let policies = PolicySetBuilder::from_defaults()
            .with_limit("api", 7, Duration::from_secs(10))
            .unwrap()
            .build()
            .unwrap();

        let api = policies.get("api").unwrap();
        assert_eq!(api.limit(), 7);
        assert_eq!(api.window(), Duration::from_secs(10));
        assert_eq!(policies.len(), DEFAULT_POLICIES.len());
    }

    #[test]
    fn test_builder_names_invalid_policy() {
        let err = PolicySet::builder()
            .with_limit("upload", 0, Duration::from_secs(10))
            .unwrap_err();

        assert_eq!(err.to_string(), "policy `upload`: limit must be greater than 0");
    }

    #[test]
    fn test_builder_rejects_blank_name() {
        let result = PolicySet::builder()
            .with_policy("  ", RateLimitPolicy::new(1, Duration::from_secs(1)).unwrap())
            .build();

        assert_eq!(result, Err(PolicyError::EmptyName));
    }

    #[test]
    fn test_names_sorted() {
        let defaults = PolicySet::defaults();
        let names: Vec<&str> = defaults.names().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
