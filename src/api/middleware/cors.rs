use axum::Router;
use tower_http::cors::{Any, CorsLayer};

/// Wide-open CORS: the editing surface is a browser client and the service
/// carries no credentials.
pub fn add_cors(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors)
}
