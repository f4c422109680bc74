use crate::api::dto::language::{LanguageDetail, LanguageSummary, LanguagesListResponse};
use crate::api::routes::AppState;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn list_languages(State(state): State<AppState>) -> Result<Json<LanguagesListResponse>> {
    let languages = state.language_service.list_languages().await?;
    let response = LanguagesListResponse {
        total: languages.len(),
        languages: languages.into_iter().map(LanguageSummary::from).collect(),
    };
    Ok(Json(response))
}

pub async fn get_language(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LanguageDetail>> {
    let language = state.language_service.get_language(&id).await?;
    Ok(Json(LanguageDetail::from(language)))
}
