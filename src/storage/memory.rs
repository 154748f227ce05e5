use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::storage::traits::{SessionStore, StorageError, StorageResult};
use crate::storage::types::{NewSession, PipelineRecord, SessionStatus};
use crate::streaming::AnalyticsEvent;

/// Stored state of one session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub session: NewSession,
    pub status: SessionStatus,
    pub pipeline: PipelineRecord,
    pub analytics: Vec<AnalyticsEvent>,
}

/// In-process SessionStore used when no database is configured
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: Uuid) -> Option<SessionEntry> {
        self.sessions.read().get(&session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn update<F>(&self, session_id: Uuid, f: F) -> StorageResult<()>
    where
        F: FnOnce(&mut SessionEntry),
    {
        let mut sessions = self.sessions.write();
        let entry = sessions
            .get_mut(&session_id)
            .ok_or(StorageError::SessionNotFound(session_id))?;
        f(entry);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: &NewSession) -> StorageResult<Uuid> {
        let id = Uuid::new_v4();
        self.sessions.write().insert(
            id,
            SessionEntry {
                session: session.clone(),
                status: SessionStatus::Starting,
                pipeline: PipelineRecord::default(),
                analytics: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn set_status(&self, session_id: Uuid, status: SessionStatus) -> StorageResult<()> {
        self.update(session_id, |entry| entry.status = status)
    }

    async fn upsert_pipeline(&self, session_id: Uuid, pipeline: &PipelineRecord) -> StorageResult<()> {
        self.update(session_id, |entry| entry.pipeline = pipeline.clone())
    }

    async fn append_event(&self, session_id: Uuid, event: &AnalyticsEvent) -> StorageResult<()> {
        self.update(session_id, |entry| entry.analytics.push(event.clone()))
    }

    async fn get_pipeline(&self, session_id: Uuid) -> StorageResult<PipelineRecord> {
        self.get(session_id)
            .map(|entry| entry.pipeline)
            .ok_or(StorageError::SessionNotFound(session_id))
    }

    async fn get_analytics(&self, session_id: Uuid) -> StorageResult<Vec<AnalyticsEvent>> {
        self.get(session_id)
            .map(|entry| entry.analytics)
            .ok_or(StorageError::SessionNotFound(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Dataset;
    use crate::streaming::Sample;

    fn new_session() -> NewSession {
        NewSession {
            user_id: Uuid::new_v4(),
            user_name: Some("midwife".to_string()),
            dataset: Dataset::Regular,
            study_number: 12,
        }
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let store = MemorySessionStore::new();
        let id = store.create_session(&new_session()).await.unwrap();
        assert_eq!(store.get(id).unwrap().status, SessionStatus::Starting);

        store.set_status(id, SessionStatus::Running).await.unwrap();
        let record = PipelineRecord {
            bpm: vec![Sample::new(0.0, 140.0)],
            uterus: vec![],
            window_seconds: 180.0,
        };
        store.upsert_pipeline(id, &record).await.unwrap();
        store
            .append_event(id, &AnalyticsEvent { ts: 1.0, predictions: vec![] })
            .await
            .unwrap();

        assert_eq!(store.get_pipeline(id).await.unwrap(), record);
        assert_eq!(store.get_analytics(id).await.unwrap().len(), 1);
        assert_eq!(store.get(id).unwrap().status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = MemorySessionStore::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            store.set_status(missing, SessionStatus::Stopped).await,
            Err(StorageError::SessionNotFound(id)) if id == missing
        ));
        tokio_test::assert_err!(store.get_pipeline(missing).await);
        tokio_test::assert_err!(store.append_event(missing, &AnalyticsEvent::now(vec![])).await);
    }

    #[test]
    fn test_blocking_executor() {
        let store = MemorySessionStore::new();
        let id = tokio_test::block_on(store.create_session(&new_session())).unwrap();
        tokio_test::assert_ok!(tokio_test::block_on(
            store.set_status(id, SessionStatus::Error)
        ));
        assert_eq!(store.get(id).unwrap().status, SessionStatus::Error);
        assert_eq!(store.len(), 1);
    }
}
