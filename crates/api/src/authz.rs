//! API-side authorization guard for sales operations.
//!
//! Runs in each handler before the repository is touched.

use axum::http::StatusCode;
use axum::response::Response;

use salesgate_auth::{AuthzError, OperationAuthorization, Principal, authorize, missing_permissions};

use crate::app::errors;

/// Check `operation` for the current principal; a denial becomes a generic 403.
pub fn authorize_operation<O: OperationAuthorization>(principal: &Principal, operation: &O) -> Result<(), Response> {
    authorize(principal, operation).map_err(|AuthzError::PermissionDenied { requirement }| {
        let missing: Vec<&str> = missing_permissions(principal, &requirement)
            .into_iter()
            .map(|p| p.as_str())
            .collect();
        tracing::warn!(
            identity = principal.identity(),
            operation = operation.name(),
            %requirement,
            ?missing,
            "permission denied"
        );
        errors::json_error(StatusCode::FORBIDDEN, "forbidden", errors::FORBIDDEN_MESSAGE)
    })
}
