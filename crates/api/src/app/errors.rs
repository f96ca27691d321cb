use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use salesgate_sales::SalesError;

/// Body message for every authentication failure.
pub const UNAUTHORIZED_MESSAGE: &str = "missing or invalid credentials";
/// Body message for every permission failure.
pub const FORBIDDEN_MESSAGE: &str = "insufficient permissions";

pub fn sales_error_to_response(err: SalesError) -> axum::response::Response {
    match err {
        SalesError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        SalesError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        SalesError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        SalesError::Storage(msg) => {
            tracing::error!(error = %msg, "sales storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", "storage unavailable")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
