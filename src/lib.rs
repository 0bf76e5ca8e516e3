//! # interaction-throttle
//!
//! Volume control for bursty user interactions.
//!
//! Two independent components live in this crate:
//!
//! - [`AdmissionLimiter`] decides whether a write action (sign-in, upload, API
//!   call, ...) is admitted under a named fixed-window policy, keyed by the
//!   caller's identity (IP address or user id).
//! - [`EventAggregator`] turns interaction events (likes, follows, comments, ...)
//!   into notification records, folding bursts of similar events into one
//!   record such as "Grace and 3 others liked your design".
//!
//! Both are synchronous, in-memory and safe to share between threads. Neither
//! installs a `tracing` subscriber; they only emit events.
//!
//! ## Quick Start
//!
//! ```rust
//! use interaction_throttle::{AdmissionLimiter, PolicySet, RateLimitPolicy};
//! use std::time::Duration;
//!
//! let policies = PolicySet::builder()
//!     .with_policy("comment", RateLimitPolicy::new(5, Duration::from_secs(60)).unwrap())
//!     .build()
//!     .unwrap();
//! let limiter = AdmissionLimiter::builder().with_policies(policies).build().unwrap();
//!
//! let decision = limiter.check("203.0.113.7", "comment").unwrap();
//! assert!(decision.is_allowed());
//! assert_eq!(decision.remaining, 4);
//!
//! // Ready-made response headers
//! for (name, value) in decision.headers() {
//!     println!("{}: {}", name, value);
//! }
//! ```
//!
//! ## Identity keys
//!
//! Behind a proxy the client address comes from request headers. Use
//! [`identity_key`] to resolve it the same way everywhere:
//!
//! ```rust
//! use http::HeaderMap;
//! use interaction_throttle::identity_key;
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("x-real-ip", "198.51.100.4".parse().unwrap());
//! assert_eq!(identity_key(&headers), "198.51.100.4");
//! ```
//!
//! ## Notification grouping
//!
//! Likes, follows and comment likes for the same target merge into the latest
//! unread record while it was updated less than an hour before the event.
//! Comments, replies, new designs and badges always get a record of their own.
//! A user acting on their own content is never notified.
//!
//! ```rust
//! use interaction_throttle::{render_message, NotificationKind};
//!
//! assert_eq!(render_message(NotificationKind::Follow, "Ada", 1), "Ada started following you");
//! assert_eq!(
//!     render_message(NotificationKind::Like, "Ada", 3),
//!     "Ada and 2 others liked your design"
//! );
//! ```
//!
//! ## Configuration
//!
//! Policy sets deserialize with serde from a map of `name -> { limit, window_ms }`,
//! and every policy is validated on the way in:
//!
//! ```rust
//! use interaction_throttle::PolicySet;
//!
//! let policies: PolicySet = serde_json::from_str(
//!     r#"{ "auth": { "limit": 10, "window_ms": 60000 } }"#,
//! ).unwrap();
//! assert_eq!(policies.get("auth").unwrap().limit(), 10);
//! ```
//!
//! ## Memory
//!
//! Counters are reclaimed once their window started more than twice its length
//! ago, at most once per sweep interval (5 minutes by default) and only when a
//! check runs. Closed notification groups are dropped the same way by
//! `ingest`, or on demand by [`EventAggregator::prune`]. With the `async`
//! feature (on by default),
//! [`spawn_housekeeping`] runs both on a fixed interval for services with
//! sparse traffic.
//!
//! ## Observability
//!
//! ```rust
//! # use interaction_throttle::AdmissionLimiter;
//! # let limiter = AdmissionLimiter::builder().build().unwrap();
//! let snapshot = limiter.metrics().snapshot();
//! println!("Denial rate: {:.2}%", snapshot.denial_rate() * 100.0);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    counter::{AdmissionDecision, RateLimitCounter},
    message::{render_message, render_message_with, OthersPhrasing},
    notification::{
        EventError, GroupIndexKey, GroupKey, NotificationEvent, NotificationKind,
        NotificationRecord, RecordId,
    },
    policy::{PolicyError, PolicySet, PolicySetBuilder, RateLimitPolicy, DEFAULT_POLICIES},
    window::FixedWindow,
};

pub use application::{
    aggregator::{EventAggregator, EventAggregatorBuilder, GroupStorage, DEFAULT_GROUP_WINDOW},
    error::BuildError,
    limiter::{
        AdmissionError, AdmissionLimiter, AdmissionLimiterBuilder, CounterStorage,
        DEFAULT_SWEEP_INTERVAL,
    },
    metrics::{AdmissionMetrics, AdmissionSnapshot, AggregationMetrics, AggregationSnapshot},
    ports::{Clock, Housekeeper, Storage},
    registry::{CounterKey, CounterRegistry},
};

#[cfg(feature = "async")]
pub use application::housekeeping::{spawn_housekeeping, HousekeepingHandle, ShutdownError};

pub use infrastructure::{
    clock::SystemClock,
    identity::{identity_key, UNKNOWN_IDENTITY},
    storage::ShardedStorage,
};
