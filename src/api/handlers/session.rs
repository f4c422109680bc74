use crate::api::dto::execution::{ExecutionResponse, ExecutionsListResponse};
use crate::api::dto::session::{
    CreateSessionRequest, RunRequest, RunResponse, SessionDetailResponse, SessionStatusResponse,
    UpdateSourceRequest,
};
use crate::api::routes::AppState;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionStatusResponse>)> {
    let language_id = req
        .language_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::InvalidParameter(vec!["language_id is required".to_string()]))?;

    let (session, _) = state.session_service.create_session(&language_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionStatusResponse::from(session)),
    ))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetailResponse>> {
    let (session, language) = state.session_service.get_session(&id).await?;
    Ok(Json(SessionDetailResponse::from_parts(session, language)))
}

pub async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSourceRequest>,
) -> Result<Json<SessionStatusResponse>> {
    let source_code = req.source_code.ok_or_else(|| {
        AppError::InvalidParameter(vec!["source_code is required".to_string()])
    })?;

    let session = state.session_service.update_source(&id, &source_code).await?;
    Ok(Json(SessionStatusResponse::from(session)))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>> {
    let session = state.session_service.close_session(&id).await?;
    Ok(Json(SessionStatusResponse::from(session)))
}

/// Body is optional: absent limits fall back to the configured defaults.
pub async fn run_code(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RunRequest>>,
) -> Result<(StatusCode, Json<RunResponse>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let execution = state
        .execution_service
        .submit(&id, req.time_limit, req.memory_limit)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RunResponse {
            execution_id: execution.id,
            status: execution.status,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ExecutionsListResponse>> {
    let executions = state
        .session_service
        .list_executions(&id, query.limit)
        .await?;

    Ok(Json(ExecutionsListResponse {
        session_id: id,
        executions: executions.into_iter().map(ExecutionResponse::from).collect(),
    }))
}
