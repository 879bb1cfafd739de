pub mod entities;
pub mod projects;
pub mod runs;
pub mod sse;
pub mod workflows;

use axum::Router;

use chainflow_core::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/api/projects", projects::router())
        .nest("/api/workflows", workflows::router())
        .nest("/api/entities", entities::router())
        .nest("/api/runs", runs::router())
        .nest("/api/sse", sse::router())
}
