//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use std::path::Path;

use self::state::AppState;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the application router. Static UI files are served from
/// `static_dir` for every path outside `/api/v1`.
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let app = Router::new().nest("/api/v1", routes::api_routes());

    let app = match static_dir {
        Some(dir) if dir.is_dir() => app.fallback_service(ServeDir::new(dir)),
        Some(dir) => {
            tracing::warn!(dir = %dir.display(), "static UI directory missing, serving API only");
            app.fallback(fallback)
        }
        None => app.fallback(fallback),
    };

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}
