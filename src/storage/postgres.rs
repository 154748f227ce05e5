use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::storage::traits::{SessionStore, StorageError, StorageResult};
use crate::storage::types::{NewSession, PipelineRecord, SessionStatus};
use crate::streaming::AnalyticsEvent;

/// PostgreSQL implementation of SessionStore
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for sessions
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                dataset VARCHAR(16) NOT NULL,
                study_number INTEGER NOT NULL,
                started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                stopped_at TIMESTAMPTZ,
                status VARCHAR(16) NOT NULL DEFAULT 'starting',
                meta JSONB NOT NULL DEFAULT '{}'::jsonb,
                pipeline JSONB NOT NULL
                    DEFAULT '{"bpm": [], "uterus": [], "window_seconds": 180}'::jsonb,
                CONSTRAINT sessions_dataset_chk CHECK (dataset IN ('hypoxia', 'regular')),
                CONSTRAINT sessions_status_chk
                    CHECK (status IN ('starting', 'running', 'stopped', 'error'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sessions_user
                ON sessions(user_id, started_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn create_session(&self, session: &NewSession) -> StorageResult<Uuid> {
        let id = Uuid::new_v4();
        let meta = match &session.user_name {
            Some(name) => json!({ "user_name": name }),
            None => json!({}),
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, dataset, study_number, status, meta)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(session.user_id)
        .bind(session.dataset.as_str())
        .bind(session.study_number as i32)
        .bind(SessionStatus::Starting.as_str())
        .bind(meta)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn set_status(&self, session_id: Uuid, status: SessionStatus) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = $2,
                stopped_at = CASE WHEN $3 THEN NOW() ELSE stopped_at END
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(status.as_str())
        .bind(status.is_terminal())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    async fn upsert_pipeline(&self, session_id: Uuid, pipeline: &PipelineRecord) -> StorageResult<()> {
        let pipeline_json = serde_json::to_value(pipeline)?;

        let result = sqlx::query("UPDATE sessions SET pipeline = $2 WHERE id = $1")
            .bind(session_id)
            .bind(pipeline_json)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    async fn append_event(&self, session_id: Uuid, event: &AnalyticsEvent) -> StorageResult<()> {
        let event_json = serde_json::to_value(event)?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET meta = jsonb_set(
                COALESCE(meta, '{}'::jsonb),
                '{analytics}',
                COALESCE(meta->'analytics', '[]'::jsonb) || jsonb_build_array($2::jsonb),
                true
            )
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(event_json)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound(session_id));
        }
        Ok(())
    }

    async fn get_pipeline(&self, session_id: Uuid) -> StorageResult<PipelineRecord> {
        let row = sqlx::query("SELECT pipeline FROM sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::SessionNotFound(session_id))?;

        let pipeline: Value = row.try_get("pipeline")?;
        Ok(serde_json::from_value(pipeline)?)
    }

    async fn get_analytics(&self, session_id: Uuid) -> StorageResult<Vec<AnalyticsEvent>> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(meta->'analytics', '[]'::jsonb) AS analytics
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::SessionNotFound(session_id))?;

        let analytics: Value = row.try_get("analytics")?;
        Ok(serde_json::from_value(analytics)?)
    }
}
