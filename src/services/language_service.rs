use crate::error::Result;
use crate::models::Language;
use crate::repository::LanguageRepository;

#[derive(Clone)]
pub struct LanguageService {
    repo: LanguageRepository,
}

impl LanguageService {
    pub fn new(repo: LanguageRepository) -> Self {
        Self { repo }
    }

    pub async fn list_languages(&self) -> Result<Vec<Language>> {
        self.repo.list().await
    }

    pub async fn get_language(&self, id: &str) -> Result<Language> {
        self.repo.get(id).await
    }
}
