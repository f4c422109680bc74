use super::handlers::{execution, health, language, session};
use super::middleware::cors::add_cors;
use crate::services::{ExecutionService, LanguageService, SessionService};
use axum::{
    Router,
    routing::{get, patch, post},
};

#[derive(Clone)]
pub struct AppState {
    pub language_service: LanguageService,
    pub session_service: SessionService,
    pub execution_service: ExecutionService,
}

pub fn create_router(
    language_service: LanguageService,
    session_service: SessionService,
    execution_service: ExecutionService,
) -> Router {
    let state = AppState {
        language_service,
        session_service,
        execution_service,
    };

    let routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Language catalogue
        .route("/languages", get(language::list_languages))
        .route("/languages/{id}", get(language::get_language))
        // Sessions
        .route("/code-sessions", post(session::create_session))
        .route(
            "/code-sessions/{id}",
            get(session::get_session).patch(session::update_source),
        )
        .route("/code-sessions/{id}/close", patch(session::close_session))
        .route("/code-sessions/{id}/run", post(session::run_code))
        .route(
            "/code-sessions/{id}/executions",
            get(session::list_executions),
        )
        // Execution polling
        .route("/executions/{id}", get(execution::get_execution))
        .with_state(state);

    add_cors(routes)
}
