use axum::{
    extract::State,
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use salesgate_auth::SharedGate;

use crate::app::errors;

#[derive(Clone)]
pub struct AuthState {
    pub gate: SharedGate,
}

/// Authenticate the request and attach its `Principal`.
///
/// Every rejection gets the same 401 body; the reason is logged by the gate.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let header = req.headers().get(AUTHORIZATION).map(|v| v.as_bytes());

    match state.gate.evaluate(header, Utc::now()).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(_) => errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", errors::UNAUTHORIZED_MESSAGE),
    }
}
