//! # Model Gateway Request Queue
//!
//! Bounded priority queue providing admission control and fairness under
//! load.
//!
//! Ordering is (priority desc, arrival asc), but within one priority tier
//! dequeue rotates across callers with weighted round-robin so a single
//! high-volume caller cannot starve the rest. Admission is refused outright
//! once the queue is at depth; entries whose deadline passes while queued
//! are reported as expired, never silently dropped.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use modelgw_core::{CallerId, InferenceRequest, Priority};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;
use tracing::debug;

/// Why admission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueRejection {
    /// The queue is at its configured depth
    #[error("queue full at depth {max_depth}")]
    Full {
        /// The configured depth that was hit
        max_depth: usize,
    },
}

/// Queue configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum entries held before admission is refused
    pub max_depth: usize,
    /// Per-caller round-robin weights; unknown callers weigh 1
    pub caller_weights: HashMap<CallerId, u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_depth: 1024,
            caller_weights: HashMap::new(),
        }
    }
}

/// Implemented by anything the queue can hold.
///
/// The gateway queues its own job type (request plus reply channel); tests
/// queue bare requests.
pub trait QueueItem {
    /// The caller the item belongs to, for fairness accounting
    fn caller(&self) -> &CallerId;
    /// Scheduling priority
    fn priority(&self) -> Priority;
    /// Absolute drop-dead time, if any
    fn deadline(&self) -> Option<DateTime<Utc>>;
    /// Called once on admission with the enqueue timestamp
    fn on_enqueued(&mut self, _at: DateTime<Utc>) {}
}

impl QueueItem for InferenceRequest {
    fn caller(&self) -> &CallerId {
        &self.caller
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    fn on_enqueued(&mut self, at: DateTime<Utc>) {
        self.enqueued_at = Some(at);
    }
}

/// One priority tier: per-caller FIFO lanes plus a rotation order.
struct Tier<T> {
    /// Rotation order; callers are appended on first enqueue
    rotation: Vec<CallerId>,
    /// Per-caller FIFO lanes in arrival order
    lanes: HashMap<CallerId, VecDeque<T>>,
    /// Index into `rotation` of the caller currently being served
    cursor: usize,
    /// Items served to the cursor caller in its current slot
    served_in_slot: u32,
}

impl<T> Tier<T> {
    fn new() -> Self {
        Self {
            rotation: Vec::new(),
            lanes: HashMap::new(),
            cursor: 0,
            served_in_slot: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.lanes.values().all(VecDeque::is_empty)
    }

    fn push(&mut self, caller: CallerId, item: T) {
        if !self.rotation.contains(&caller) {
            self.rotation.push(caller.clone());
        }
        self.lanes.entry(caller).or_default().push_back(item);
    }

    fn advance_cursor(&mut self) {
        self.served_in_slot = 0;
        if !self.rotation.is_empty() {
            self.cursor = (self.cursor + 1) % self.rotation.len();
        }
    }

    fn remove_current_caller(&mut self) {
        let caller = self.rotation.remove(self.cursor);
        self.lanes.remove(&caller);
        self.served_in_slot = 0;
        if self.cursor >= self.rotation.len() {
            self.cursor = 0;
        }
    }
}

struct Inner<T> {
    tiers: BTreeMap<Priority, Tier<T>>,
    total: usize,
    expired: Vec<T>,
}

/// Bounded priority queue with weighted round-robin fairness.
pub struct RequestQueue<T: QueueItem> {
    inner: Mutex<Inner<T>>,
    config: QueueConfig,
}

impl<T: QueueItem> RequestQueue<T> {
    /// Create a queue
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tiers: BTreeMap::new(),
                total: 0,
                expired: Vec::new(),
            }),
            config,
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(QueueConfig::default())
    }

    fn weight_of(&self, caller: &CallerId) -> u32 {
        self.config
            .caller_weights
            .get(caller)
            .copied()
            .unwrap_or(1)
            .max(1)
    }

    /// Admit an item, or refuse it if the queue is at depth.
    ///
    /// # Errors
    /// Returns [`EnqueueRejection::Full`] as backpressure; the queue never
    /// grows past its configured depth.
    pub fn enqueue(&self, mut item: T) -> Result<(), EnqueueRejection> {
        let mut inner = self.inner.lock();

        if inner.total >= self.config.max_depth {
            debug!(
                caller = %item.caller(),
                max_depth = self.config.max_depth,
                "Queue full, rejecting"
            );
            return Err(EnqueueRejection::Full {
                max_depth: self.config.max_depth,
            });
        }

        item.on_enqueued(Utc::now());
        let caller = item.caller().clone();
        let priority = item.priority();

        inner
            .tiers
            .entry(priority)
            .or_insert_with(Tier::new)
            .push(caller, item);
        inner.total += 1;
        Ok(())
    }

    /// Pop the next item to serve, or `None` when the queue is empty.
    ///
    /// Entries whose deadline has passed are moved aside and retrievable via
    /// [`take_expired`](Self::take_expired); they are never returned here.
    pub fn dequeue(&self) -> Option<T> {
        let now = Utc::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        loop {
            // Highest non-empty priority tier
            let priority = *inner
                .tiers
                .iter()
                .rev()
                .find(|(_, tier)| !tier.is_empty())
                .map(|(p, _)| p)?;

            // Drop drained tiers below so the BTreeMap stays small
            inner.tiers.retain(|p, tier| *p == priority || !tier.is_empty());

            let tier = inner
                .tiers
                .get_mut(&priority)
                .filter(|t| !t.rotation.is_empty())?;

            let caller = tier.rotation[tier.cursor].clone();
            let lane = tier.lanes.entry(caller.clone()).or_default();

            match lane.pop_front() {
                None => {
                    tier.remove_current_caller();
                    continue;
                }
                Some(item) => {
                    if item.deadline().is_some_and(|d| d < now) {
                        debug!(caller = %caller, "Dropping expired queue entry");
                        inner.expired.push(item);
                        inner.total -= 1;
                        continue;
                    }

                    let lane_now_empty = tier
                        .lanes
                        .get(&caller)
                        .map_or(true, VecDeque::is_empty);

                    tier.served_in_slot += 1;
                    if lane_now_empty {
                        tier.remove_current_caller();
                    } else if tier.served_in_slot >= self.weight_of(&caller) {
                        tier.advance_cursor();
                    }

                    inner.total -= 1;
                    return Some(item);
                }
            }
        }
    }

    /// Move all deadline-passed entries to the expired buffer.
    ///
    /// Returns how many were moved. Intended for a periodic sweeper; dequeue
    /// also catches expired entries on its own.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut moved = Vec::new();

        for tier in inner.tiers.values_mut() {
            for lane in tier.lanes.values_mut() {
                let mut keep = VecDeque::with_capacity(lane.len());
                while let Some(item) = lane.pop_front() {
                    if item.deadline().is_some_and(|d| d < now) {
                        moved.push(item);
                    } else {
                        keep.push_back(item);
                    }
                }
                *lane = keep;
            }
        }

        let count = moved.len();
        inner.total -= count;
        inner.expired.extend(moved);
        if count > 0 {
            debug!(count, "Swept expired queue entries");
        }
        count
    }

    /// Drain the expired buffer so the owner can report each entry.
    #[must_use]
    pub fn take_expired(&self) -> Vec<T> {
        std::mem::take(&mut self.inner.lock().expired)
    }

    /// Entries currently queued (excluding the expired buffer)
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().total
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
