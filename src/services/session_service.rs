use crate::error::{AppError, Result};
use crate::models::{Execution, Language, Session};
use crate::repository::{ExecutionRepository, LanguageRepository, SessionRepository};

pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

pub const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct SessionService {
    session_repo: SessionRepository,
    language_repo: LanguageRepository,
    execution_repo: ExecutionRepository,
}

impl SessionService {
    pub fn new(
        session_repo: SessionRepository,
        language_repo: LanguageRepository,
        execution_repo: ExecutionRepository,
    ) -> Self {
        Self {
            session_repo,
            language_repo,
            execution_repo,
        }
    }

    /// Create a session seeded with the language's starter template.
    pub async fn create_session(&self, language_id: &str) -> Result<(Session, Language)> {
        let language = self.language_repo.get(language_id).await?;
        let session = self
            .session_repo
            .create(&language.id, &language.template_code)
            .await?;

        tracing::info!(session_id = %session.id, language_id, "Session created");
        Ok((session, language))
    }

    pub async fn get_session(&self, id: &str) -> Result<(Session, Language)> {
        let session = self.session_repo.get(id).await?;
        let language = self.language_repo.get(&session.language_id).await?;
        Ok((session, language))
    }

    /// Autosave. Empty and oversized sources are rejected before the write.
    pub async fn update_source(&self, id: &str, source_code: &str) -> Result<Session> {
        if source_code.is_empty() {
            return Err(AppError::SourceTooLarge(
                "Source code cannot be empty".to_string(),
            ));
        }
        if source_code.len() > MAX_SOURCE_BYTES {
            return Err(AppError::SourceTooLarge(format!(
                "Source code exceeds {} bytes (got {})",
                MAX_SOURCE_BYTES,
                source_code.len()
            )));
        }

        self.session_repo.update_source(id, source_code).await
    }

    /// Flip the session to INACTIVE. Existing executions stay readable; new
    /// admissions are refused.
    pub async fn close_session(&self, id: &str) -> Result<Session> {
        let session = self.session_repo.close(id).await?;
        tracing::info!(session_id = %id, "Session closed");
        Ok(session)
    }

    /// Execution history, newest first.
    pub async fn list_executions(
        &self,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Execution>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(AppError::InvalidParameter(vec![format!(
                "limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"
            )]));
        }

        // 404 for unknown sessions rather than an empty list.
        self.session_repo.get(session_id).await?;
        self.execution_repo.list_by_session(session_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;
    use crate::repository::{establish_connection, seed_languages};

    async fn service() -> SessionService {
        let pool = establish_connection("sqlite::memory:").await.unwrap();
        seed_languages(&pool, 5000, 256).await.unwrap();
        SessionService::new(
            SessionRepository::new(pool.clone()),
            LanguageRepository::new(pool.clone()),
            ExecutionRepository::new(pool),
        )
    }

    #[tokio::test]
    async fn create_seeds_the_starter_template() {
        let service = service().await;
        let (session, language) = service.create_session("python").await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.language_id, "python");
        assert_eq!(session.source_code, language.template_code);
    }

    #[tokio::test]
    async fn create_with_unknown_language_is_not_found() {
        let service = service().await;
        let err = service.create_session("cobol").await.unwrap_err();
        assert!(matches!(err, AppError::LanguageNotFound(_)));
    }

    #[tokio::test]
    async fn autosave_rejects_empty_and_oversized_sources() {
        let service = service().await;
        let (session, _) = service.create_session("shell").await.unwrap();

        let err = service.update_source(&session.id, "").await.unwrap_err();
        assert!(matches!(err, AppError::SourceTooLarge(_)));

        let huge = "x".repeat(MAX_SOURCE_BYTES + 1);
        let err = service.update_source(&session.id, &huge).await.unwrap_err();
        assert!(matches!(err, AppError::SourceTooLarge(_)));

        let updated = service
            .update_source(&session.id, "echo updated")
            .await
            .unwrap();
        assert_eq!(updated.source_code, "echo updated");
    }

    #[tokio::test]
    async fn close_flips_to_inactive_and_keeps_history_readable() {
        let service = service().await;
        let (session, _) = service.create_session("shell").await.unwrap();

        let closed = service.close_session(&session.id).await.unwrap();
        assert_eq!(closed.status, SessionStatus::Inactive);

        assert!(
            service
                .list_executions(&session.id, None)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn history_limit_bounds_are_enforced() {
        let service = service().await;
        let (session, _) = service.create_session("shell").await.unwrap();

        let err = service
            .list_executions(&session.id, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidParameter(_)));

        let err = service
            .list_executions("missing", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound(_)));
    }
}
