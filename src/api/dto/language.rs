use crate::models::{Language, RuntimeKey};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct LanguageSummary {
    pub id: String,
    pub name: String,
    pub runtime: RuntimeKey,
    pub version: String,
    pub default_time_limit_ms: i64,
    pub default_memory_mb: i64,
}

impl From<Language> for LanguageSummary {
    fn from(language: Language) -> Self {
        Self {
            id: language.id,
            name: language.name,
            runtime: language.runtime,
            version: language.version,
            default_time_limit_ms: language.default_time_limit_ms,
            default_memory_mb: language.default_memory_mb,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LanguageDetail {
    pub id: String,
    pub name: String,
    pub runtime: RuntimeKey,
    pub version: String,
    pub file_name: String,
    pub template_code: String,
    pub default_time_limit_ms: i64,
    pub default_memory_mb: i64,
}

impl From<Language> for LanguageDetail {
    fn from(language: Language) -> Self {
        Self {
            id: language.id,
            name: language.name,
            runtime: language.runtime,
            version: language.version,
            file_name: language.file_name,
            template_code: language.template_code,
            default_time_limit_ms: language.default_time_limit_ms,
            default_memory_mb: language.default_memory_mb,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LanguagesListResponse {
    pub total: usize,
    pub languages: Vec<LanguageSummary>,
}
