//! Core REST surface: CRUD over the data model, search, audit, and the
//! LLM job endpoints. Thin handlers over the stores; all JSON, datetimes
//! ISO-8601 UTC.

pub mod audit;
pub mod backup;
pub mod events;
pub mod llm_jobs;
pub mod memories;
pub mod reminders;
pub mod search;
pub mod server;
pub mod settings;
pub mod state;
pub mod system;
pub mod tasks;

pub use server::start_http_server;
pub use state::ApiState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Error shape returned by every endpoint: `{"detail": "..."}` with a
/// stable status code.
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({"detail": self.detail}))).into_response()
    }
}

impl From<crate::Error> for ApiError {
    fn from(error: crate::Error) -> Self {
        let status = match &error {
            crate::Error::Validation(_) => StatusCode::BAD_REQUEST,
            crate::Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(%error, "request failed");
        }

        Self {
            status,
            detail: error.to_string(),
        }
    }
}

/// Parse an ISO-8601 datetime from a request body field.
pub(crate) fn parse_datetime_field(
    raw: &str,
    field: &str,
) -> Result<chrono::DateTime<chrono::Utc>, ApiError> {
    crate::db::parse_db_datetime(raw)
        .ok_or_else(|| ApiError::bad_request(format!("invalid datetime in {field}: {raw:?}")))
}
