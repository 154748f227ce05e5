// Session lifecycle
//
// A session wires one coordinator to its producers, background tasks and
// the optional emulator. At most one session is active at a time; the
// `SessionManager` enforces that and owns teardown ordering.

use crate::classifier::{
    Classifier, ExternalFlusher, RecommendationLookup, DEFAULT_CLASSIFIER_THRESHOLD,
};
use crate::storage::{Dataset, NewSession, SessionStatus, SessionStore};
use crate::streaming::{
    coordinator::{PipelineConfig, PipelineCoordinator},
    emulator::Emulator,
    source::spawn_serial_reader,
    tasks::{spawn_broadcaster, spawn_external_flusher, spawn_persistence_flusher, PersistenceFlusher},
    types::{Channel, StreamError, StreamResult},
    viewers::ViewerRegistry,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Time producers get to observe their stop signal
pub const PRODUCER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub user_name: Option<String>,
    pub dataset: Dataset,
    pub study_number: u32,
}

impl StartRequest {
    pub fn validate(&self) -> StreamResult<()> {
        if !self.dataset.contains(self.study_number) {
            return Err(StreamError::InvalidConfig(format!(
                "study_number {} out of range 1..={} for dataset {}",
                self.study_number,
                self.dataset.max_study_number(),
                self.dataset
            )));
        }
        Ok(())
    }
}

/// Per-deployment settings applied to every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub pipeline: PipelineConfig,
    pub bpm_port: Option<String>,
    pub uterus_port: Option<String>,
    pub baud_rate: u32,
    /// Command template with `{dataset}` and `{number}` placeholders
    pub emulator_command: Option<String>,
    pub classifier_threshold: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            bpm_port: None,
            uterus_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            emulator_command: None,
            classifier_threshold: DEFAULT_CLASSIFIER_THRESHOLD,
        }
    }
}

impl SessionSettings {
    fn ports(&self) -> impl Iterator<Item = (Channel, &String)> {
        [
            (Channel::Bpm, self.bpm_port.as_ref()),
            (Channel::Uterus, self.uterus_port.as_ref()),
        ]
        .into_iter()
        .filter_map(|(channel, port)| port.map(|p| (channel, p)))
    }
}

/// Long-lived collaborators shared by all sessions
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn SessionStore>,
    pub classifier: Option<Arc<dyn Classifier>>,
    pub recommendations: Arc<dyn RecommendationLookup>,
    pub viewers: ViewerRegistry,
}

/// Cheap handle to the running session's shared state
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub coordinator: Arc<PipelineCoordinator>,
    pub flusher: Arc<ExternalFlusher>,
}

pub struct Session {
    handle: SessionHandle,
    store: Arc<dyn SessionStore>,
    task_cancel: CancellationToken,
    producer_cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    producers: Vec<JoinHandle<()>>,
    emulator: Option<Emulator>,
}

impl Session {
    /// Create the session record, then start the emulator, producers and
    /// background tasks
    pub async fn start(
        request: &StartRequest,
        settings: &SessionSettings,
        deps: &SessionDeps,
    ) -> StreamResult<Self> {
        request.validate()?;

        let id = deps
            .store
            .create_session(&NewSession {
                user_id: request.user_id,
                user_name: request.user_name.clone(),
                dataset: request.dataset,
                study_number: request.study_number,
            })
            .await?;

        let emulator = match &settings.emulator_command {
            Some(template) => match Emulator::spawn(template, request.dataset, request.study_number)
            {
                Ok(emulator) => Some(emulator),
                Err(e) => {
                    if let Err(status_err) = deps.store.set_status(id, SessionStatus::Error).await {
                        warn!("Failed to mark session {} as error: {}", id, status_err);
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        let coordinator = Arc::new(PipelineCoordinator::new(
            id,
            settings.pipeline.clone(),
            deps.viewers.clone(),
        ));

        let producer_cancel = CancellationToken::new();
        let producers = settings
            .ports()
            .map(|(channel, port)| {
                spawn_serial_reader(
                    port.clone(),
                    settings.baud_rate,
                    channel,
                    Arc::clone(&coordinator),
                    producer_cancel.clone(),
                )
            })
            .collect();

        let flusher = Arc::new(ExternalFlusher::new(
            Arc::clone(&coordinator),
            deps.classifier.clone(),
            Arc::clone(&deps.recommendations),
            settings.classifier_threshold,
        ));

        let task_cancel = CancellationToken::new();
        let tasks = vec![
            spawn_broadcaster(Arc::clone(&coordinator), task_cancel.clone()),
            spawn_persistence_flusher(
                PersistenceFlusher::new(Arc::clone(&coordinator), Arc::clone(&deps.store)),
                task_cancel.clone(),
            ),
            spawn_external_flusher(Arc::clone(&flusher), task_cancel.clone()),
        ];

        if let Err(e) = deps.store.set_status(id, SessionStatus::Running).await {
            warn!("Failed to mark session {} as running: {}", id, e);
        }
        info!(
            "Session {} started: dataset={} study={}",
            id, request.dataset, request.study_number
        );

        Ok(Self {
            handle: SessionHandle {
                id,
                coordinator,
                flusher,
            },
            store: Arc::clone(&deps.store),
            task_cancel,
            producer_cancel,
            tasks,
            producers,
            emulator,
        })
    }

    pub fn id(&self) -> Uuid {
        self.handle.id
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Tear down in order: tasks, producers, emulator, status
    pub async fn stop(self) -> StreamResult<()> {
        let id = self.handle.id;
        info!("Stopping session {}", id);

        self.task_cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Background task of session {} failed: {}", id, e);
            }
        }

        self.producer_cancel.cancel();
        for producer in self.producers {
            let abort = producer.abort_handle();
            if tokio::time::timeout(PRODUCER_JOIN_TIMEOUT, producer).await.is_err() {
                warn!("Producer of session {} did not stop in time, aborting", id);
                abort.abort();
            }
        }

        if let Some(emulator) = self.emulator {
            emulator.stop().await;
        }

        self.store.set_status(id, SessionStatus::Stopped).await?;
        info!("Session {} stopped", id);
        Ok(())
    }
}

/// Owner of the single active session
pub struct SessionManager {
    settings: SessionSettings,
    deps: SessionDeps,
    /// Serializes start/stop
    lifecycle: Mutex<Option<Session>>,
    /// Lock-free read path for request handlers
    active: RwLock<Option<SessionHandle>>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, deps: SessionDeps) -> Self {
        Self {
            settings,
            deps,
            lifecycle: Mutex::new(None),
            active: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn viewers(&self) -> &ViewerRegistry {
        &self.deps.viewers
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.deps.store
    }

    /// Handle of the running session, if any
    pub fn active(&self) -> Option<SessionHandle> {
        self.active.read().clone()
    }

    pub async fn start(&self, request: &StartRequest) -> StreamResult<Uuid> {
        let mut current = self.lifecycle.lock().await;
        if current.is_some() {
            return Err(StreamError::AlreadyRunning);
        }

        let session = Session::start(request, &self.settings, &self.deps).await?;
        let id = session.id();
        *self.active.write() = Some(session.handle().clone());
        *current = Some(session);
        Ok(id)
    }

    /// Stop the running session. Returns its id, or `None` when idle.
    pub async fn stop(&self) -> StreamResult<Option<Uuid>> {
        let mut current = self.lifecycle.lock().await;
        let Some(session) = current.take() else {
            return Ok(None);
        };
        self.active.write().take();

        let id = session.id();
        session.stop().await?;
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::StaticRecommendations;
    use crate::storage::MemorySessionStore;

    fn manager() -> (SessionManager, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let deps = SessionDeps {
            store: store.clone(),
            classifier: None,
            recommendations: Arc::new(StaticRecommendations::new()),
            viewers: ViewerRegistry::new(),
        };
        (SessionManager::new(SessionSettings::default(), deps), store)
    }

    fn request(dataset: Dataset, study_number: u32) -> StartRequest {
        StartRequest {
            user_id: Uuid::new_v4(),
            user_name: None,
            dataset,
            study_number,
        }
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (manager, store) = manager();
        let id = manager.start(&request(Dataset::Hypoxia, 5)).await.unwrap();
        assert_eq!(store.get(id).unwrap().status, SessionStatus::Running);

        let handle = manager.active().unwrap();
        assert_eq!(handle.id, id);
        handle.coordinator.enqueue(Channel::Bpm, 0.0, 140.0);

        assert_eq!(manager.stop().await.unwrap(), Some(id));
        assert!(manager.active().is_none());

        let entry = store.get(id).unwrap();
        assert_eq!(entry.status, SessionStatus::Stopped);
        // final persistence pass ran during teardown
        assert_eq!(entry.pipeline.bpm.len(), 1);
    }

    #[tokio::test]
    async fn test_second_start_conflicts() {
        let (manager, _store) = manager();
        manager.start(&request(Dataset::Regular, 1)).await.unwrap();
        assert!(matches!(
            manager.start(&request(Dataset::Regular, 2)).await,
            Err(StreamError::AlreadyRunning)
        ));
        manager.stop().await.unwrap();
        assert!(manager.start(&request(Dataset::Regular, 2)).await.is_ok());
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_study_number() {
        let (manager, store) = manager();
        assert!(matches!(
            manager.start(&request(Dataset::Hypoxia, 51)).await,
            Err(StreamError::InvalidConfig(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let (manager, _store) = manager();
        assert_eq!(manager.stop().await.unwrap(), None);
    }
}
