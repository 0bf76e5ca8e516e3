//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use chrono::{DateTime, Utc};
use std::fmt::Debug;
use std::hash::Hash;

/// Port for obtaining the current wall-clock time.
///
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Port for concurrent key-value storage.
///
/// Implementations must make each `with_entry_mut` call atomic with respect to
/// other calls on the same key: counters and notification groups rely on it for
/// their read-modify-write. An external shared store can replace the in-process
/// map behind this trait without callers noticing.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Access an existing entry mutably without creating it.
    ///
    /// Returns `None` if the key is absent.
    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Port for components that hold expirable in-memory state.
///
/// Used by the periodic housekeeping task to reclaim memory even when no
/// traffic arrives to trigger opportunistic sweeps.
pub trait Housekeeper: Send + Sync {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    /// Drop expired state, returning how many entries were removed.
    fn sweep(&self) -> usize;
}
