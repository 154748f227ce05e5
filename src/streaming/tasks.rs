// Periodic background loops of a session
//
// Each loop is a `tokio::select!` over the session's cancellation token and
// a fixed interval. Failures inside a tick are logged and the loop carries
// on at the same cadence; only cancellation ends a loop.

use crate::classifier::{ClassifierError, ExternalFlusher};
use crate::storage::{PipelineRecord, SessionStore};
use crate::streaming::coordinator::PipelineCoordinator;
use crate::streaming::types::Channel;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Broadcaster diagnostics are logged at roughly this cadence
const DIAGNOSTIC_PERIOD: Duration = Duration::from_secs(5);

/// Upper bound on the final persistence write during teardown
const FINAL_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Push cleaned live payloads to every connected viewer
pub fn spawn_broadcaster(
    coordinator: Arc<PipelineCoordinator>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(coordinator.config().broadcast_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_diagnostic = Instant::now();
        info!("Broadcaster started for session {}", coordinator.session_id());

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Broadcaster cancelled");
                    break;
                }

                _ = tick.tick() => {
                    if coordinator.viewers().is_empty() {
                        continue;
                    }

                    let coord = Arc::clone(&coordinator);
                    let encoded = tokio::task::spawn_blocking(move || {
                        serde_json::to_string(&coord.build_payload())
                    })
                    .await;

                    let json = match encoded {
                        Ok(Ok(json)) => json,
                        Ok(Err(e)) => {
                            error!("Failed to serialize viewer payload: {}", e);
                            continue;
                        }
                        Err(e) => {
                            error!("Payload task failed: {}", e);
                            continue;
                        }
                    };

                    let delivered = coordinator.viewers().broadcast(Arc::from(json));

                    if last_diagnostic.elapsed() >= DIAGNOSTIC_PERIOD {
                        let buffers = coordinator.buffers();
                        info!(
                            "Sent snapshot to {} viewer(s); bpm={} uterus={} latest={:.2}",
                            delivered,
                            buffers.live.len(Channel::Bpm),
                            buffers.live.len(Channel::Uterus),
                            buffers.live.latest_time()
                        );
                        last_diagnostic = Instant::now();
                    }
                }
            }
        }
    })
}

/// Writes the full trace and new analytics events to the store
pub struct PersistenceFlusher {
    coordinator: Arc<PipelineCoordinator>,
    store: Arc<dyn SessionStore>,
    /// Analytics append count already persisted
    event_cursor: u64,
}

impl PersistenceFlusher {
    pub fn new(coordinator: Arc<PipelineCoordinator>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            coordinator,
            store,
            event_cursor: 0,
        }
    }

    /// One persistence pass. Returns the number of ingest-queue points
    /// drained since the previous pass.
    pub async fn flush_once(&mut self) -> usize {
        let session_id = self.coordinator.session_id();
        let drained = self.coordinator.ingest_queue().drain(usize::MAX).len();

        let snapshot = self.coordinator.buffers().full.snapshot();
        let record = PipelineRecord {
            bpm: snapshot.bpm,
            uterus: snapshot.uterus,
            window_seconds: self.coordinator.buffers().window_seconds(),
        };
        if let Err(e) = self.store.upsert_pipeline(session_id, &record).await {
            warn!("Failed to persist pipeline for session {}: {}", session_id, e);
        }

        let (events, next_cursor) = self.coordinator.analytics().events_since(self.event_cursor);
        let first = next_cursor - events.len() as u64;
        self.event_cursor = first.max(self.event_cursor);
        for (k, event) in events.iter().enumerate() {
            match self.store.append_event(session_id, event).await {
                Ok(()) => self.event_cursor = first + k as u64 + 1,
                Err(e) => {
                    warn!("Failed to persist analytics event for session {}: {}", session_id, e);
                    break;
                }
            }
        }

        debug!(
            "Persisted session {}: {} new point(s), bpm={} uterus={}",
            session_id,
            drained,
            record.bpm.len(),
            record.uterus.len()
        );
        drained
    }
}

/// Persist on a fixed cadence, with one last pass on cancellation
pub fn spawn_persistence_flusher(
    mut flusher: PersistenceFlusher,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(flusher.coordinator.config().persist_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Persistence flusher started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    if timeout(FINAL_FLUSH_TIMEOUT, flusher.flush_once()).await.is_err() {
                        warn!("Final persistence flush timed out");
                    }
                    info!("Persistence flusher cancelled");
                    break;
                }

                _ = tick.tick() => {
                    flusher.flush_once().await;
                }
            }
        }
    })
}

/// Call the external classifier on a fixed cadence
pub fn spawn_external_flusher(
    flusher: Arc<ExternalFlusher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(flusher.coordinator().config().external_flush_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("External flusher started");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("External flusher cancelled");
                    break;
                }

                _ = tick.tick() => {
                    if flusher.coordinator().buffers().full.is_empty() {
                        debug!("No samples yet, skipping classifier call");
                        continue;
                    }

                    // the classifier call can take a while; stay cancellable
                    let result = tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("External flusher cancelled during classifier call");
                            break;
                        }
                        result = flusher.flush_once() => result,
                    };

                    match result {
                        Ok(_) => {}
                        Err(ClassifierError::NotConfigured) => {
                            debug!("Classifier not configured, skipping");
                        }
                        Err(e) => warn!("Classifier call failed, retrying next tick: {}", e),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classifier, ClassifierResult, Predictions, StaticRecommendations};
    use crate::storage::{
        Dataset, MemorySessionStore, NewSession, SessionStatus, StorageError, StorageResult,
    };
    use crate::streaming::{AnalyticsEvent, CsvExport, PipelineConfig, ViewerRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Model service that is always down
    #[derive(Default)]
    struct DownClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for DownClassifier {
        async fn predict(&self, _export: CsvExport, _threshold: f64) -> ClassifierResult<Predictions> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ClassifierError::Status(500))
        }
    }

    /// Store whose writes all fail
    #[derive(Default)]
    struct BrokenStore {
        upserts: AtomicUsize,
        appends: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn create_session(&self, _session: &NewSession) -> StorageResult<Uuid> {
            Ok(Uuid::new_v4())
        }

        async fn set_status(&self, session_id: Uuid, _status: SessionStatus) -> StorageResult<()> {
            Err(StorageError::SessionNotFound(session_id))
        }

        async fn upsert_pipeline(&self, session_id: Uuid, _pipeline: &PipelineRecord) -> StorageResult<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::SessionNotFound(session_id))
        }

        async fn append_event(&self, session_id: Uuid, _event: &AnalyticsEvent) -> StorageResult<()> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::SessionNotFound(session_id))
        }

        async fn get_pipeline(&self, session_id: Uuid) -> StorageResult<PipelineRecord> {
            Err(StorageError::SessionNotFound(session_id))
        }

        async fn get_analytics(&self, session_id: Uuid) -> StorageResult<Vec<AnalyticsEvent>> {
            Err(StorageError::SessionNotFound(session_id))
        }
    }

    fn one_second_coordinator() -> Arc<PipelineCoordinator> {
        let config = PipelineConfig {
            persist_interval_secs: 1,
            external_flush_secs: 1,
            ..PipelineConfig::default()
        };
        Arc::new(PipelineCoordinator::new(
            Uuid::new_v4(),
            config,
            ViewerRegistry::new(),
        ))
    }

    async fn setup() -> (Arc<PipelineCoordinator>, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let id = store
            .create_session(&NewSession {
                user_id: Uuid::new_v4(),
                user_name: None,
                dataset: Dataset::Hypoxia,
                study_number: 3,
            })
            .await
            .unwrap();
        let coord = Arc::new(PipelineCoordinator::new(
            id,
            PipelineConfig::default(),
            ViewerRegistry::new(),
        ));
        (coord, store)
    }

    #[tokio::test]
    async fn test_persistence_writes_full_trace_and_new_events_once() {
        let (coord, store) = setup().await;
        coord.enqueue(Channel::Bpm, 0.0, 140.0);
        coord.enqueue(Channel::Uterus, 0.0, 10.0);
        coord.analytics().append(AnalyticsEvent::now(vec!["a".into()]));

        let mut flusher = PersistenceFlusher::new(Arc::clone(&coord), store.clone());
        assert_eq!(flusher.flush_once().await, 2);
        assert_eq!(flusher.flush_once().await, 0);

        let id = coord.session_id();
        let record = store.get_pipeline(id).await.unwrap();
        assert_eq!(record.bpm.len(), 1);
        assert_eq!(record.window_seconds, 180.0);
        assert_eq!(store.get_analytics(id).await.unwrap().len(), 1);

        coord.analytics().append(AnalyticsEvent::now(vec!["b".into()]));
        flusher.flush_once().await;
        let events = store.get_analytics(id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].predictions, vec!["b"]);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_cursor() {
        let store = Arc::new(MemorySessionStore::new());
        // session id unknown to the store: every write fails
        let coord = Arc::new(PipelineCoordinator::new(
            Uuid::new_v4(),
            PipelineConfig::default(),
            ViewerRegistry::new(),
        ));
        coord.analytics().append(AnalyticsEvent::now(vec![]));

        let mut flusher = PersistenceFlusher::new(Arc::clone(&coord), store);
        flusher.flush_once().await;
        assert_eq!(flusher.event_cursor, 0);
    }

    #[tokio::test]
    async fn test_broadcaster_delivers_and_stops_on_cancel() {
        let (coord, _store) = setup().await;
        coord.enqueue(Channel::Bpm, 0.0, 150.0);
        let (_id, mut rx) = coord.viewers().register();

        let cancel = CancellationToken::new();
        let handle = spawn_broadcaster(Arc::clone(&coord), cancel.clone());

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["heartRate"], 150.0);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_persistence_final_flush_on_cancel() {
        let (coord, store) = setup().await;
        let cancel = CancellationToken::new();
        let handle = spawn_persistence_flusher(
            PersistenceFlusher::new(Arc::clone(&coord), store.clone()),
            cancel.clone(),
        );

        coord.enqueue(Channel::Uterus, 1.0, 25.0);
        cancel.cancel();
        handle.await.unwrap();

        let record = store.get_pipeline(coord.session_id()).await.unwrap();
        assert_eq!(record.uterus.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_flusher_keeps_ticking_after_classifier_errors() {
        let coord = one_second_coordinator();
        coord.enqueue(Channel::Uterus, 0.0, 20.0);
        let classifier = Arc::new(DownClassifier::default());
        let flusher = ExternalFlusher::new(
            Arc::clone(&coord),
            Some(classifier.clone() as Arc<dyn Classifier>),
            Arc::new(StaticRecommendations::new()),
            0.5,
        );

        let cancel = CancellationToken::new();
        let handle = spawn_external_flusher(Arc::new(flusher), cancel.clone());

        // ticks at 0, 1, 2, 3 and 4 s
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 5);
        assert!(!handle.is_finished());
        assert!(coord.analytics().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_flusher_keeps_ticking_after_store_errors() {
        let coord = one_second_coordinator();
        coord.enqueue(Channel::Bpm, 0.0, 140.0);
        coord.analytics().append(AnalyticsEvent::now(vec!["a".into()]));
        let store = Arc::new(BrokenStore::default());

        let cancel = CancellationToken::new();
        let handle = spawn_persistence_flusher(
            PersistenceFlusher::new(Arc::clone(&coord), store.clone()),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(store.upserts.load(Ordering::SeqCst), 5);
        // the unsent event is retried on every pass
        assert_eq!(store.appends.load(Ordering::SeqCst), 5);
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
        // final pass on cancellation
        assert_eq!(store.upserts.load(Ordering::SeqCst), 6);
    }
}
