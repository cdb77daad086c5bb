//! Distribution hub
//!
//! Keeps the most recent prediction records in a bounded ring and fans
//! every new record out to live subscribers. Each subscriber owns a
//! bounded queue; a full queue drops the newest record for that
//! subscriber only, so one stalled consumer never delays the others.
//!
//! History append, fan-out and subscriber registration all happen under a
//! single lock, which gives every subscriber a gap-free, duplicate-free
//! sequence: its replay snapshot followed by everything published after.

mod sink;

pub use sink::{pump, PumpExit, RecordSink};

use crate::config::DEFAULT_HISTORY_CAPACITY;
use crate::models::HistoryRecord;
use crate::observability::DetectorMetrics;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

pub type SubscriberId = u64;

/// Counters exposed through introspection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Records appended to history
    pub published: u64,
    /// Deliveries dropped because a subscriber queue was full
    pub dropped: u64,
    /// Subscribers removed because their queue was closed
    pub evicted: u64,
    pub subscribers: usize,
    pub history_len: usize,
}

/// A newly registered subscriber
///
/// `replay` holds the history as of registration, oldest first; the
/// receiver yields every record published afterwards.
pub struct Subscription {
    pub id: SubscriberId,
    pub replay: Vec<Arc<HistoryRecord>>,
    pub receiver: mpsc::Receiver<Arc<HistoryRecord>>,
}

struct HubState {
    history: VecDeque<Arc<HistoryRecord>>,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<HistoryRecord>>>,
    next_seq: u64,
    next_subscriber: SubscriberId,
    stats: HubStats,
}

pub struct DistributionHub {
    state: Mutex<HubState>,
    capacity: usize,
    queue_size: usize,
    metrics: DetectorMetrics,
}

impl DistributionHub {
    pub fn new(capacity: usize, queue_size: usize) -> Self {
        Self {
            state: Mutex::new(HubState {
                history: VecDeque::with_capacity(capacity.max(1)),
                subscribers: HashMap::new(),
                next_seq: 1,
                next_subscriber: 1,
                stats: HubStats::default(),
            }),
            capacity: capacity.max(1),
            queue_size: queue_size.max(1),
            metrics: DetectorMetrics::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a record to history and offer it to every subscriber
    ///
    /// Assigns the record's sequence number and returns the stored copy.
    pub fn publish(&self, mut record: HistoryRecord) -> Arc<HistoryRecord> {
        let mut state = self.lock();

        record.seq = state.next_seq;
        state.next_seq += 1;
        let record = Arc::new(record);

        if state.history.len() >= self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(Arc::clone(&record));
        state.stats.published += 1;

        let mut dropped = 0u64;
        let mut closed = Vec::new();
        for (id, sender) in &state.subscribers {
            match sender.try_send(Arc::clone(&record)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in &closed {
            state.subscribers.remove(id);
            debug!(subscriber_id = id, "Evicted closed subscriber");
        }
        state.stats.dropped += dropped;
        state.stats.evicted += closed.len() as u64;

        if dropped > 0 {
            self.metrics.inc_dropped_deliveries(dropped);
        }
        self.metrics.set_history_size(state.history.len() as i64);
        if !closed.is_empty() {
            self.metrics.set_active_subscribers(state.subscribers.len() as i64);
        }

        record
    }

    /// Register a subscriber and snapshot the history it must replay
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.queue_size);
        let mut state = self.lock();

        let id = state.next_subscriber;
        state.next_subscriber += 1;
        let replay = state.history.iter().cloned().collect();
        state.subscribers.insert(id, sender);
        self.metrics.set_active_subscribers(state.subscribers.len() as i64);

        Subscription {
            id,
            replay,
            receiver,
        }
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.lock();
        let removed = state.subscribers.remove(&id).is_some();
        if removed {
            self.metrics.set_active_subscribers(state.subscribers.len() as i64);
        }
        removed
    }

    /// Drop every subscriber, ending their live streams
    pub fn close_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.subscribers.len();
        state.subscribers.clear();
        self.metrics.set_active_subscribers(0);
        count
    }

    /// Current history, oldest first
    pub fn history(&self) -> Vec<Arc<HistoryRecord>> {
        self.lock().history.iter().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> HubStats {
        let state = self.lock();
        HubStats {
            subscribers: state.subscribers.len(),
            history_len: state.history.len(),
            ..state.stats
        }
    }
}

impl Default for DistributionHub {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, crate::config::DEFAULT_SUBSCRIBER_QUEUE)
    }
}
