//! Core error type for the Chainflow engine.
//!
//! `ServerError` is used throughout the core domain (stores, chain engine,
//! generation client). When the `axum` feature is enabled, it also implements
//! `IntoResponse` so it can be used directly as an axum handler error type.

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Workflow '{0}' has no entities to run")]
    EmptyWorkflow(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Step timed out after {0}s")]
    Timeout(u64),

    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Database(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl ServerError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::EmptyWorkflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Generation(_) => StatusCode::BAD_GATEWAY,
            ServerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Cancelled(_) => StatusCode::CONFLICT,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), axum::Json(body)).into_response()
    }
}

/// Same status as the underlying error, with the run id alongside.
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for crate::chain::ChainFailure {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.source.to_string(),
            "runId": self.run_id,
        });
        (self.source.status_code(), axum::Json(body)).into_response()
    }
}
