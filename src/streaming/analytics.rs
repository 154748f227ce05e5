// Capped, append-only log of classifier results for the current session

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of events kept in memory
pub const DEFAULT_ANALYTICS_CAPACITY: usize = 500;

/// One classifier result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Wall-clock epoch seconds
    pub ts: f64,
    /// Recommendation strings for every positive label
    pub predictions: Vec<String>,
}

impl AnalyticsEvent {
    pub fn now(predictions: Vec<String>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
            predictions,
        }
    }
}

#[derive(Debug, Default)]
struct LogState {
    events: VecDeque<AnalyticsEvent>,
    /// Total appends over the log's lifetime, including evicted events
    appended: u64,
}

/// Ring-buffer-by-truncation over `AnalyticsEvent`s
#[derive(Debug)]
pub struct AnalyticsLog {
    state: Mutex<LogState>,
    capacity: usize,
}

impl AnalyticsLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LogState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, evicting the oldest entries beyond capacity
    pub fn append(&self, event: AnalyticsEvent) {
        let mut state = self.state.lock();
        state.events.push_back(event);
        state.appended += 1;
        while state.events.len() > self.capacity {
            state.events.pop_front();
        }
    }

    /// Copy of the retained events, oldest first
    pub fn snapshot(&self) -> Vec<AnalyticsEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    /// Events appended after `cursor` that are still retained, plus the
    /// cursor to pass next time
    pub fn events_since(&self, cursor: u64) -> (Vec<AnalyticsEvent>, u64) {
        let state = self.state.lock();
        let pending = state.appended.saturating_sub(cursor) as usize;
        let take = pending.min(state.events.len());
        let skip = state.events.len() - take;
        let events = state.events.iter().skip(skip).cloned().collect();
        (events, state.appended)
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AnalyticsLog {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYTICS_CAPACITY)
    }
}
