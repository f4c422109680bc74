use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An editing session: one language, the current source text.
///
/// Sessions are never deleted by the service; closing a session flips it to
/// INACTIVE, which refuses new executions but keeps history readable.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: String,
    pub language_id: String,
    pub source_code: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Inactive,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Inactive => "INACTIVE",
        }
    }
}
