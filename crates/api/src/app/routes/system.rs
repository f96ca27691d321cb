use axum::{Json, extract::Extension, http::StatusCode};

use salesgate_auth::Principal;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Every claim value carried by the caller's token.
pub async fn me(Extension(principal): Extension<Principal>) -> Json<Vec<String>> {
    Json(principal.claims().values().map(str::to_string).collect())
}
