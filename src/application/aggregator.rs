//! Event aggregator.
//!
//! Turns interaction events into notification records. Groupable events fold
//! into the latest open record of their group; everything else opens a record
//! of its own. Only open groups are held in memory, finished records belong to
//! the caller.

use crate::application::error::BuildError;
use crate::application::limiter::DEFAULT_SWEEP_INTERVAL;
use crate::application::metrics::AggregationMetrics;
use crate::application::ports::{Clock, Housekeeper, Storage};
use crate::domain::message::OthersPhrasing;
use crate::domain::notification::{
    EventError, GroupIndexKey, NotificationEvent, NotificationRecord, RecordId,
};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::ShardedStorage;
use chrono::{DateTime, Utc};
use std::cell::Cell;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Default storage backing an [`EventAggregator`].
pub type GroupStorage = Arc<ShardedStorage<GroupIndexKey, NotificationRecord>>;

/// Default grouping window.
pub const DEFAULT_GROUP_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Groups interaction events into notification records.
///
/// Cheap to clone; clones share open groups, metrics and the id sequence.
///
/// # Example
/// ```
/// use interaction_throttle::{EventAggregator, NotificationEvent, NotificationKind};
/// use chrono::{TimeDelta, Utc};
///
/// let aggregator = EventAggregator::builder().build().unwrap();
/// let start = Utc::now();
///
/// let first = NotificationEvent::new(NotificationKind::Like, "u2", "Ada", "u1", start)
///     .with_target("design-7");
/// let second = NotificationEvent::new(NotificationKind::Like, "u3", "Grace", "u1",
///     start + TimeDelta::minutes(10))
///     .with_target("design-7");
///
/// aggregator.ingest(&first).unwrap();
/// let record = aggregator.ingest(&second).unwrap().unwrap();
///
/// assert_eq!(record.aggregate_count, 2);
/// assert_eq!(aggregator.render(&record), "Grace and 1 others liked your design");
/// ```
#[derive(Clone)]
pub struct EventAggregator<S = GroupStorage>
where
    S: Storage<GroupIndexKey, NotificationRecord> + Clone,
{
    groups: S,
    clock: Arc<dyn Clock>,
    metrics: AggregationMetrics,
    group_window: Duration,
    phrasing: OthersPhrasing,
    next_id: Arc<AtomicU64>,
    sweep_interval: Duration,
    last_sweep_ms: Arc<AtomicI64>,
}

impl EventAggregator<GroupStorage> {
    /// Start building an aggregator.
    pub fn builder() -> EventAggregatorBuilder {
        EventAggregatorBuilder::default()
    }
}

impl<S> EventAggregator<S>
where
    S: Storage<GroupIndexKey, NotificationRecord> + Clone,
{
    /// Process one event.
    ///
    /// Returns `Ok(None)` for self-actions, otherwise the created or updated
    /// record as it stands after the event. May prune closed groups first if
    /// the sweep interval has elapsed since the last prune.
    ///
    /// # Errors
    /// Returns an `EventError` if the event lacks a field its kind requires.
    pub fn ingest(
        &self,
        event: &NotificationEvent,
    ) -> Result<Option<NotificationRecord>, EventError> {
        if let Err(err) = event.validate() {
            self.metrics.record_rejected();
            debug!(kind = %event.kind, error = %err, "rejected notification event");
            return Err(err);
        }

        if event.is_self_action() {
            self.metrics.record_suppressed();
            trace!(kind = %event.kind, actor = %event.actor_id, "suppressed self notification");
            return Ok(None);
        }

        self.maybe_prune();

        let Some(index_key) = event.index_key() else {
            let record = NotificationRecord::open(self.next_record_id(), event);
            self.metrics.record_created();
            trace!(kind = %record.kind, id = %record.id, "opened notification");
            return Ok(Some(record));
        };

        Ok(Some(self.merge_or_open(index_key, event)))
    }

    fn merge_or_open(&self, index_key: GroupIndexKey, event: &NotificationEvent) -> NotificationRecord {
        // Set by the factory so the accessor knows the entry is brand new
        let fresh: Cell<Option<RecordId>> = Cell::new(None);

        let (record, merged) = self.groups.with_entry_mut(
            index_key,
            || {
                let id = self.next_record_id();
                fresh.set(Some(id));
                NotificationRecord::open(id, event)
            },
            |record| {
                if fresh.get() == Some(record.id) {
                    return (record.clone(), false);
                }
                if record.accepts(event.occurred_at, self.group_window) {
                    record.absorb(event);
                    return (record.clone(), true);
                }
                *record = NotificationRecord::open(self.next_record_id(), event);
                (record.clone(), false)
            },
        );

        if merged {
            self.metrics.record_merged();
            trace!(
                group = %record.group_key.as_ref().map(|k| k.as_str()).unwrap_or_default(),
                id = %record.id,
                count = record.aggregate_count,
                "merged notification"
            );
        } else {
            self.metrics.record_created();
            trace!(kind = %record.kind, id = %record.id, "opened notification");
        }
        record
    }

    /// Mark an open record as read so later events start a fresh one.
    ///
    /// Returns `false` if the record is no longer the open record of its group.
    pub fn acknowledge(&self, record: &NotificationRecord) -> bool {
        let Some(index_key) = record.index_key() else {
            return false;
        };
        self.groups
            .with_existing_mut(&index_key, |open| {
                if open.id == record.id {
                    open.read = true;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false)
    }

    /// Drop groups that can no longer accept events.
    ///
    /// A group is dropped once it is read or its window has elapsed relative
    /// to the clock. Returns how many groups were dropped.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        self.last_sweep_ms
            .store(now.timestamp_millis(), Ordering::Release);
        self.prune_at(now)
    }

    fn maybe_prune(&self) {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep_ms.load(Ordering::Acquire);
        let interval_ms = i64::try_from(self.sweep_interval.as_millis()).unwrap_or(i64::MAX);

        if now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        // Only the caller that wins the exchange prunes
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.prune_at(now);
    }

    fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let window = self.group_window;
        let mut removed = 0;

        self.groups.retain(|_, record| {
            let open = record.accepts(now, window);
            if !open {
                removed += 1;
            }
            open
        });

        self.metrics.record_pruned(removed);
        debug!(removed, remaining = self.groups.len(), "pruned notification groups");
        removed
    }

    /// Render a record's message with the configured phrasing.
    pub fn render(&self, record: &NotificationRecord) -> String {
        record.message_with(self.phrasing)
    }

    /// Snapshot of every open group's latest record.
    pub fn open_groups(&self) -> Vec<NotificationRecord> {
        let mut records = Vec::with_capacity(self.groups.len());
        self.groups.for_each(|_, record| records.push(record.clone()));
        records.sort_by_key(|record| record.id);
        records
    }

    fn next_record_id(&self) -> RecordId {
        RecordId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &AggregationMetrics {
        &self.metrics
    }

    /// Grouping window.
    pub fn group_window(&self) -> Duration {
        self.group_window
    }

    /// Minimum time between opportunistic prunes.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Phrasing used by [`render`](Self::render).
    pub fn phrasing(&self) -> OthersPhrasing {
        self.phrasing
    }

    /// Number of tracked groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if no groups are tracked.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drop every group.
    pub fn clear(&self) {
        self.groups.clear();
    }
}

impl<S> Housekeeper for EventAggregator<S>
where
    S: Storage<GroupIndexKey, NotificationRecord> + Clone,
{
    fn name(&self) -> &'static str {
        "aggregation"
    }

    fn sweep(&self) -> usize {
        self.prune()
    }
}

/// Builder for an [`EventAggregator`].
pub struct EventAggregatorBuilder {
    clock: Option<Arc<dyn Clock>>,
    group_window: Duration,
    phrasing: OthersPhrasing,
    sweep_interval: Duration,
}

impl Default for EventAggregatorBuilder {
    fn default() -> Self {
        Self {
            clock: None,
            group_window: DEFAULT_GROUP_WINDOW,
            phrasing: OthersPhrasing::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl EventAggregatorBuilder {
    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the grouping window. Default: 1 hour.
    pub fn with_group_window(mut self, window: Duration) -> Self {
        self.group_window = window;
        self
    }

    /// Set how "and N others" is phrased.
    pub fn with_phrasing(mut self, phrasing: OthersPhrasing) -> Self {
        self.phrasing = phrasing;
        self
    }

    /// Set the minimum time between opportunistic prunes run by `ingest`.
    ///
    /// Default: 5 minutes. Validated when the aggregator is built.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Build the aggregator over in-process sharded storage.
    ///
    /// # Errors
    /// Returns `BuildError::ZeroGroupWindow` if the group window is zero, or
    /// `BuildError::ZeroSweepInterval` if the sweep interval is zero.
    pub fn build(self) -> Result<EventAggregator, BuildError> {
        self.build_with(Arc::new(ShardedStorage::new()))
    }

    /// Build the aggregator over caller-provided group storage.
    ///
    /// # Errors
    /// Same as [`build`](Self::build).
    pub fn build_with<S>(self, groups: S) -> Result<EventAggregator<S>, BuildError>
    where
        S: Storage<GroupIndexKey, NotificationRecord> + Clone,
    {
        if self.group_window.is_zero() {
            return Err(BuildError::ZeroGroupWindow);
        }
        if self.sweep_interval.is_zero() {
            return Err(BuildError::ZeroSweepInterval);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let started = clock.now().timestamp_millis();

        Ok(EventAggregator {
            groups,
            clock,
            metrics: AggregationMetrics::new(),
            group_window: self.group_window,
            phrasing: self.phrasing,
            next_id: Arc::new(AtomicU64::new(0)),
            sweep_interval: self.sweep_interval,
            last_sweep_ms: Arc::new(AtomicI64::new(started)),
        })
    }
}
