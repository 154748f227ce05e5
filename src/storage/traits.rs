use async_trait::async_trait;
use uuid::Uuid;

use crate::storage::types::{NewSession, PipelineRecord, SessionStatus};
use crate::streaming::AnalyticsEvent;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable record of monitoring sessions, keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session record in `starting` state and return its id
    async fn create_session(&self, session: &NewSession) -> StorageResult<Uuid>;

    async fn set_status(&self, session_id: Uuid, status: SessionStatus) -> StorageResult<()>;

    /// Replace the stored trace of a session
    async fn upsert_pipeline(&self, session_id: Uuid, pipeline: &PipelineRecord) -> StorageResult<()>;

    /// Append one classifier event to the session's analytics history
    async fn append_event(&self, session_id: Uuid, event: &AnalyticsEvent) -> StorageResult<()>;

    async fn get_pipeline(&self, session_id: Uuid) -> StorageResult<PipelineRecord>;

    async fn get_analytics(&self, session_id: Uuid) -> StorageResult<Vec<AnalyticsEvent>>;
}
