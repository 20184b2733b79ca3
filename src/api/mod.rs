//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use self::state::AppState;
use crate::error::AnalysisError;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// Wrap a payload in the `{ data, meta }` envelope.
pub fn envelope<T: Serialize>(data: &T) -> Result<Json<Value>, ApiError> {
    let data = serde_json::to_value(data).map_err(|e| AnalysisError::Internal(e.into()))?;
    Ok(Json(json!({
        "data": data,
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    })))
}

/// Handler error mapped onto `{ error: { kind, message } }`.
#[derive(Debug)]
pub struct ApiError(pub AnalysisError);

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            AnalysisError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            AnalysisError::Internal(e) => {
                tracing::error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        let message = match &self.0 {
            AnalysisError::Validation(msg) => msg.clone(),
            AnalysisError::Internal(_) => "internal error".to_string(),
        };
        (
            status,
            Json(json!({ "error": { "kind": kind, "message": message } })),
        )
            .into_response()
    }
}
