//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use salesgate_auth::SharedGate;
use salesgate_sales::SalesRepository;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

pub type SharedSales = Arc<dyn SalesRepository>;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(gate: SharedGate, sales: SharedSales) -> Router {
    let auth_state = middleware::AuthState { gate };

    // Protected routes: every request passes the gate first.
    let protected = routes::router()
        .layer(Extension(sales))
        .layer(axum::middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header::AUTHORIZATION};
    use salesgate_auth::testing::{TRUSTED_JWKS, TokenFactory};
    use salesgate_auth::{GateConfig, KeyDiscovery, RequestGate};
    use salesgate_sales::InMemorySalesRepository;
    use serde_json::json;
    use tower::ServiceExt;

    const ISSUER: &str = "https://login.example.com/tenant/v2.0/";
    const AUDIENCE: &str = "sales-api";

    fn app() -> Router {
        let config = GateConfig::new(ISSUER, AUDIENCE, KeyDiscovery::Jwks { document: TRUSTED_JWKS.to_string() });
        let gate = Arc::new(RequestGate::from_config(&config).unwrap());
        build_app(gate, Arc::new(InMemorySalesRepository::seeded()))
    }

    async fn status(request: Request<Body>) -> StatusCode {
        app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_skips_the_gate() {
        let req = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(status(req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn basic_auth_is_not_a_bearer_token() {
        let req = Request::get("/sales")
            .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(req).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn writer_without_read_permission_may_still_read() {
        let token = TokenFactory::new(ISSUER, AUDIENCE).mint(json!({ "permissions": ["Sales.ReadWrite"] }));
        let req = Request::get("/sales/3")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(req).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let token = TokenFactory::new(ISSUER, AUDIENCE).mint(json!({ "permissions": ["Sales.Read"] }));
        let req = Request::get("/sales/nope")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(req).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn token_without_permissions_is_forbidden() {
        let token = TokenFactory::new(ISSUER, AUDIENCE).mint(json!({}));
        let req = Request::get("/sales")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status(req).await, StatusCode::FORBIDDEN);
    }
}
