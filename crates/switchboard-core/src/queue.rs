//! FIFO queue of events awaiting dispatch.

use crate::event::Event;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::warn;

/// Unbounded event queue, safe to push from any thread.
///
/// Never drops events; crossing the warn threshold only logs.
pub(crate) struct EventQueue {
    /// Internal queue storage
    queue: Mutex<VecDeque<Event>>,
    /// Queue length that triggers a warning
    warn_threshold: usize,
    /// Total events enqueued
    enqueued: AtomicU64,
    /// Total events taken for dispatch
    drained: AtomicU64,
    /// Largest length observed
    peak: AtomicUsize,
}

impl EventQueue {
    /// Create a queue that warns once it holds `warn_threshold` events.
    pub(crate) fn new(warn_threshold: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            warn_threshold,
            enqueued: AtomicU64::new(0),
            drained: AtomicU64::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Append an event.
    pub(crate) fn push(&self, event: Event) {
        let len = {
            let mut queue = self.queue.lock();
            queue.push_back(event);
            queue.len()
        };
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        let previous_peak = self.peak.fetch_max(len, Ordering::Relaxed);
        if len == self.warn_threshold && previous_peak < len {
            warn!(pending = len, "Event queue reached warn threshold");
        }
    }

    /// Take up to `limit` events from the front (all when `None`).
    ///
    /// Events pushed afterwards are left for the next call.
    pub(crate) fn take_snapshot(&self, limit: Option<usize>) -> Vec<Event> {
        let events: Vec<Event> = {
            let mut queue = self.queue.lock();
            let count = limit.map_or(queue.len(), |l| l.min(queue.len()));
            queue.drain(..count).collect()
        };
        self.drained.fetch_add(events.len() as u64, Ordering::Relaxed);
        events
    }

    /// Get the current number of events in the queue.
    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if the queue is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Get queue statistics.
    pub(crate) fn stats(&self) -> QueueStats {
        QueueStats {
            current_size: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Current queue size
    pub current_size: usize,
    /// Total events enqueued
    pub enqueued: u64,
    /// Total events taken for dispatch
    pub drained: u64,
    /// Largest queue size observed
    pub peak: usize,
}
