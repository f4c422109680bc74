use crate::error::{AppError, Result};
use crate::models::{Session, SessionStatus};
use crate::repository::DbPool;
use chrono::Utc;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionRepository {
    pool: DbPool,
}

impl SessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, language_id: &str, source_code: &str) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            language_id: language_id.to_string(),
            source_code: source_code.to_string(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (id, language_id, source_code, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.language_id)
        .bind(&session.source_code)
        .bind(session.status)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Result<Session> {
        self.try_get(id)
            .await?
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
    }

    pub async fn try_get(&self, id: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    pub async fn update_source(&self, id: &str, source_code: &str) -> Result<Session> {
        let result = sqlx::query("UPDATE sessions SET source_code = ? WHERE id = ?")
            .bind(source_code)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::SessionNotFound(id.to_string()));
        }

        self.get(id).await
    }

    pub async fn close(&self, id: &str) -> Result<Session> {
        let result = sqlx::query("UPDATE sessions SET status = ? WHERE id = ?")
            .bind(SessionStatus::Inactive)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::SessionNotFound(id.to_string()));
        }

        self.get(id).await
    }
}
