//! Duplicate-scan suppression.
//!
//! Cameras double-decode frames and guests wave the same card twice; the
//! debounce guard makes sure one physical credential maps to at most one
//! in-flight evaluation, and that rapid re-presentations inside the window
//! are dropped silently.
//!
//! The guard is owned by the coordinator state and therefore already
//! serialized by the store's write lock; the store is the single-writer
//! actor for the in-flight set, which is what lets concurrent input sources
//! (camera loop, NFC callback, manual form) race on the same key safely.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};

/// Entries older than this multiple of the window are pruned from the
/// last-seen map to keep it from growing for the whole event.
const PRUNE_FACTOR: i32 = 16;

/// Suppresses duplicate and rapid re-submission of the same credential.
#[derive(Debug, Clone)]
pub struct DebounceGuard {
    window: Duration,
    last_seen: HashMap<String, DateTime<Utc>>,
    in_flight: HashSet<String>,
}

impl DebounceGuard {
    /// Create a guard with the given suppression window.
    ///
    /// Sub-millisecond windows collapse to zero; the engine configures this
    /// in whole milliseconds.
    #[must_use]
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: Duration::milliseconds(i64::try_from(window.as_millis()).unwrap_or(i64::MAX)),
            last_seen: HashMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Try to admit a key for processing.
    ///
    /// Returns `false` (reject) when the key is already in flight, or when
    /// it was last admitted within the window. On admission the key joins
    /// the in-flight set and the caller owns releasing it via
    /// [`DebounceGuard::release`]; processing time is bounded by the
    /// caller, not by this guard.
    pub fn admit(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if self.in_flight.contains(key) {
            return false;
        }
        if let Some(seen) = self.last_seen.get(key) {
            if now - *seen < self.window {
                return false;
            }
        }

        self.prune(now);
        self.last_seen.insert(key.to_string(), now);
        self.in_flight.insert(key.to_string());
        true
    }

    /// Release a key from the in-flight set.
    ///
    /// Must be called on completion of processing, success or failure.
    /// The last-seen timestamp stays, so an immediate re-scan after release
    /// is still absorbed by the window.
    pub fn release(&mut self, key: &str) {
        self.in_flight.remove(key);
    }

    /// Whether a key is currently being processed
    #[must_use]
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    /// Number of keys currently in flight
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Drop last-seen entries old enough to be irrelevant.
    ///
    /// In-flight keys are never pruned.
    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = self.window * PRUNE_FACTOR;
        if self.last_seen.len() < 1024 {
            return;
        }
        let in_flight = &self.in_flight;
        self.last_seen
            .retain(|key, seen| in_flight.contains(key) || now - *seen < horizon);
    }
}
