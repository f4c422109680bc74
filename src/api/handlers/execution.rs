use crate::api::dto::execution::ExecutionResponse;
use crate::api::routes::AppState;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
};

pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionResponse>> {
    let execution = state.execution_service.get_execution(&id).await?;
    Ok(Json(ExecutionResponse::from(execution)))
}
