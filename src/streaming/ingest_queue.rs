// Bounded ingestion queue for the durability path
//
// Lock-free multi-producer queue built on crossbeam's ArrayQueue. Pushes
// never block: when the queue is full the newest point is dropped and
// counted. The live buffers are fed separately, so an overflow here only
// loses queue entries, never buffered samples.

use crate::streaming::types::Channel;
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Default capacity of the ingestion queue
pub const DEFAULT_INGEST_CAPACITY: usize = 10_000;

/// A point as it arrived from a producer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IngestPoint {
    pub channel: Channel,
    pub time: f64,
    pub value: f64,
}

/// Metrics for queue monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub total_pushed: u64,
    pub total_drained: u64,
    pub total_dropped: u64,
    pub current_size: usize,
    pub peak_size: usize,
    pub capacity: usize,
}

pub struct IngestQueue {
    queue: ArrayQueue<IngestPoint>,
    total_pushed: AtomicU64,
    total_drained: AtomicU64,
    total_dropped: AtomicU64,
    peak_size: AtomicUsize,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            total_pushed: AtomicU64::new(0),
            total_drained: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
            peak_size: AtomicUsize::new(0),
        }
    }

    /// Non-blocking push. Returns `false` when the point was dropped.
    pub fn push(&self, point: IngestPoint) -> bool {
        match self.queue.push(point) {
            Ok(()) => {
                self.total_pushed.fetch_add(1, Ordering::Relaxed);
                self.peak_size.fetch_max(self.queue.len(), Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.total_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Drain up to `max_items`, oldest first
    pub fn drain(&self, max_items: usize) -> Vec<IngestPoint> {
        let mut items = Vec::with_capacity(max_items.min(self.queue.len()));
        while items.len() < max_items {
            match self.queue.pop() {
                Some(point) => items.push(point),
                None => break,
            }
        }
        self.total_drained
            .fetch_add(items.len() as u64, Ordering::Relaxed);
        items
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            total_pushed: self.total_pushed.load(Ordering::Relaxed),
            total_drained: self.total_drained.load(Ordering::Relaxed),
            total_dropped: self.total_dropped.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            peak_size: self.peak_size.load(Ordering::Relaxed),
            capacity: self.queue.capacity(),
        }
    }
}
