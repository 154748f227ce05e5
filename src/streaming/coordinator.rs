// Pipeline coordinator - owns all session-scoped streaming state
//
// Producers call `enqueue` from any task or thread. Background tasks read
// through the coordinator's buffers and logs; none of them touch raw
// storage directly.

use crate::signal_processing::{CleanerConfig, ContractionDetector, DetectorConfig, SignalCleaner};
use crate::streaming::{
    analytics::{AnalyticsLog, DEFAULT_ANALYTICS_CAPACITY},
    buffer::SessionBuffers,
    ingest_queue::{IngestPoint, IngestQueue, DEFAULT_INGEST_CAPACITY},
    payload::{InitialSnapshot, ViewerPayload},
    types::{Channel, Snapshot},
    viewers::ViewerRegistry,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Tunables for one session's pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Length of the live display window
    #[serde(default = "default_window_seconds")]
    pub window_seconds: f64,

    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,

    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,

    #[serde(default = "default_external_flush_secs")]
    pub external_flush_secs: u64,

    #[serde(default = "default_ingest_capacity")]
    pub ingest_capacity: usize,

    #[serde(default = "default_analytics_capacity")]
    pub analytics_capacity: usize,

    /// Cleaning applied to live payloads
    #[serde(default = "default_live_cleaner")]
    pub cleaner: CleanerConfig,

    #[serde(default)]
    pub detector: DetectorConfig,
}

fn default_window_seconds() -> f64 {
    180.0
}
fn default_broadcast_interval_ms() -> u64 {
    100
}
fn default_persist_interval_secs() -> u64 {
    10
}
fn default_external_flush_secs() -> u64 {
    300
}
fn default_ingest_capacity() -> usize {
    DEFAULT_INGEST_CAPACITY
}
fn default_analytics_capacity() -> usize {
    DEFAULT_ANALYTICS_CAPACITY
}
fn default_live_cleaner() -> CleanerConfig {
    CleanerConfig {
        max_rate: Some(80.0),
        ..CleanerConfig::default()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            persist_interval_secs: default_persist_interval_secs(),
            external_flush_secs: default_external_flush_secs(),
            ingest_capacity: default_ingest_capacity(),
            analytics_capacity: default_analytics_capacity(),
            cleaner: default_live_cleaner(),
            detector: DetectorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }

    pub fn external_flush_interval(&self) -> Duration {
        Duration::from_secs(self.external_flush_secs.max(1))
    }
}

pub struct PipelineCoordinator {
    session_id: Uuid,
    config: PipelineConfig,
    buffers: SessionBuffers,
    ingest: IngestQueue,
    analytics: AnalyticsLog,
    viewers: ViewerRegistry,
    cleaner: SignalCleaner,
    detector: ContractionDetector,
    started: Instant,
}

impl PipelineCoordinator {
    pub fn new(session_id: Uuid, config: PipelineConfig, viewers: ViewerRegistry) -> Self {
        Self {
            session_id,
            buffers: SessionBuffers::new(config.window_seconds),
            ingest: IngestQueue::new(config.ingest_capacity),
            analytics: AnalyticsLog::new(config.analytics_capacity),
            cleaner: SignalCleaner::new(config.cleaner.clone()),
            detector: ContractionDetector::new(config.detector.clone()),
            viewers,
            config,
            started: Instant::now(),
        }
    }

    /// Record one sample.
    ///
    /// The buffers are always updated. The durability queue push is
    /// non-blocking and silently drops the point when full; the return value
    /// says whether it was queued.
    pub fn enqueue(&self, channel: Channel, time: f64, value: f64) -> bool {
        self.buffers.add(channel, time, value);
        self.ingest.push(IngestPoint {
            channel,
            time,
            value,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn buffers(&self) -> &SessionBuffers {
        &self.buffers
    }

    pub fn ingest_queue(&self) -> &IngestQueue {
        &self.ingest
    }

    pub fn analytics(&self) -> &AnalyticsLog {
        &self.analytics
    }

    pub fn viewers(&self) -> &ViewerRegistry {
        &self.viewers
    }

    /// Seconds since the coordinator was created
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Full-retention view bounded to the last `seconds`
    pub fn trace(&self, seconds: f64) -> Snapshot {
        self.buffers.full.snapshot_window(seconds)
    }

    pub fn initial_snapshot(&self) -> InitialSnapshot {
        self.buffers.live.snapshot().into()
    }

    /// Build the broadcast payload from the current live window.
    ///
    /// CPU-bound; async callers should run it on a blocking thread.
    pub fn build_payload(&self) -> ViewerPayload {
        let snapshot = self.buffers.live.snapshot();
        ViewerPayload::build(
            &snapshot,
            self.elapsed(),
            self.analytics.snapshot(),
            &self.cleaner,
            &self.detector,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn coordinator(config: PipelineConfig) -> PipelineCoordinator {
        PipelineCoordinator::new(Uuid::new_v4(), config, ViewerRegistry::new())
    }

    #[test]
    fn test_enqueue_updates_both_buffers_and_queue() {
        let coord = coordinator(PipelineConfig::default());
        assert!(coord.enqueue(Channel::Bpm, 0.0, 140.0));
        assert!(coord.enqueue(Channel::Uterus, 0.0, 10.0));

        assert_eq!(coord.buffers().live.len(Channel::Bpm), 1);
        assert_eq!(coord.buffers().full.len(Channel::Uterus), 1);
        assert_eq!(coord.ingest_queue().len(), 2);
    }

    #[test]
    fn test_queue_overflow_still_updates_buffer() {
        let coord = coordinator(PipelineConfig {
            ingest_capacity: 2,
            ..Default::default()
        });
        assert!(coord.enqueue(Channel::Bpm, 0.0, 1.0));
        assert!(coord.enqueue(Channel::Bpm, 1.0, 2.0));
        assert!(!coord.enqueue(Channel::Bpm, 2.0, 3.0));

        let snapshot = coord.buffers().live.snapshot();
        assert_eq!(snapshot.bpm.len(), 3);
        assert_eq!(snapshot.latest_time, 2.0);
        assert_eq!(coord.ingest_queue().metrics().total_dropped, 1);
    }

    #[test]
    fn test_trace_is_bounded_but_full_buffer_is_not() {
        let coord = coordinator(PipelineConfig {
            window_seconds: 10.0,
            ..Default::default()
        });
        for i in 0..100 {
            coord.enqueue(Channel::Bpm, i as f64, 140.0);
        }
        assert_eq!(coord.buffers().full.len(Channel::Bpm), 100);
        assert_eq!(coord.buffers().live.len(Channel::Bpm), 11);
        assert_eq!(coord.trace(30.0).bpm.len(), 31);
    }

    #[test]
    fn test_concurrent_producers() {
        let coord = Arc::new(coordinator(PipelineConfig::default()));
        let handles: Vec<_> = Channel::ALL
            .into_iter()
            .map(|channel| {
                let coord = Arc::clone(&coord);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        coord.enqueue(channel, i as f64 * 0.25, 1.0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = coord.buffers().full.snapshot();
        assert_eq!(snapshot.bpm.len(), 500);
        assert_eq!(snapshot.uterus.len(), 500);
        assert!(snapshot.bpm.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn test_pipeline_config_defaults_from_empty_json() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.window_seconds, 180.0);
        assert_eq!(config.broadcast_interval(), Duration::from_millis(100));
        assert_eq!(config.cleaner.max_rate, Some(80.0));
        assert_eq!(config.detector.merge_gap, 30.0);
    }
}
