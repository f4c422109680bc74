use crate::error::{AppError, Result};
use crate::models::Language;
use crate::repository::DbPool;

#[derive(Clone)]
pub struct LanguageRepository {
    pool: DbPool,
}

impl LanguageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Language>> {
        let languages = sqlx::query_as::<_, Language>("SELECT * FROM languages ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(languages)
    }

    pub async fn get(&self, id: &str) -> Result<Language> {
        let language = sqlx::query_as::<_, Language>("SELECT * FROM languages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::LanguageNotFound(id.to_string()))?;

        Ok(language)
    }
}
