use crate::api::dto::language::LanguageDetail;
use crate::models::{Language, Session, SessionStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub language_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: SessionStatus,
}

impl From<Session> for SessionStatusResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub source_code: String,
    pub created_at: String,
    pub updated_at: String,
    pub language: LanguageDetail,
}

impl SessionDetailResponse {
    pub fn from_parts(session: Session, language: Language) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            source_code: session.source_code,
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
            language: LanguageDetail::from(language),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateSourceRequest {
    pub source_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    pub time_limit: Option<i64>,
    pub memory_limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub execution_id: String,
    pub status: crate::models::ExecutionStatus,
}
