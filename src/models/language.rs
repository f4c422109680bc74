use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A supported language toolchain. Rows are seeded at startup and never
/// mutated afterwards; compile/run command templates live in the runtime
/// catalogue, keyed by `runtime`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Language {
    pub id: String,
    pub name: String,
    pub runtime: RuntimeKey,
    pub version: String,
    pub file_name: String,
    pub template_code: String,
    pub default_time_limit_ms: i64,
    pub default_memory_mb: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Closed set of runtime toolchain keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKey {
    Python,
    Node,
    Gcc,
    #[sqlx(rename = "g++")]
    #[serde(rename = "g++")]
    Gpp,
    Java,
    Go,
    Php,
    Ruby,
    Shell,
}

impl RuntimeKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKey::Python => "python",
            RuntimeKey::Node => "node",
            RuntimeKey::Gcc => "gcc",
            RuntimeKey::Gpp => "g++",
            RuntimeKey::Java => "java",
            RuntimeKey::Go => "go",
            RuntimeKey::Php => "php",
            RuntimeKey::Ruby => "ruby",
            RuntimeKey::Shell => "shell",
        }
    }
}

impl std::fmt::Display for RuntimeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
