use std::sync::Arc;

use reqwest::StatusCode;
use salesgate_auth::testing::{ROGUE_KEY, TRUSTED_JWKS, TokenFactory};
use salesgate_auth::{GateConfig, KeyDiscovery, RequestGate};
use salesgate_sales::InMemorySalesRepository;
use serde_json::{Value, json};

const ISSUER: &str = "https://login.example.com/tenant/v2.0/";
const AUDIENCE: &str = "sales-api";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, pinned keys, ephemeral port.
        let config = GateConfig::new(ISSUER, AUDIENCE, KeyDiscovery::Jwks { document: TRUSTED_JWKS.to_string() });
        let gate = Arc::new(RequestGate::from_config(&config).expect("gate builds from pinned keys"));
        let app = salesgate_api::app::build_app(gate, Arc::new(InMemorySalesRepository::seeded()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn token_with(permissions: &[&str]) -> String {
    TokenFactory::new(ISSUER, AUDIENCE).mint(json!({
        "name": "Test User",
        "permissions": permissions,
    }))
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for path in ["/sales", "/sales/1", "/me"] {
        let res = client.get(srv.url(path)).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{path}");
    }
}

#[tokio::test]
async fn reader_can_list_sales() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(srv.url("/sales"))
        .bearer_auth(token_with(&["Sales.Read"]))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Vec<Value> = res.json().await.unwrap();
    assert_eq!(body.len(), 10);
    assert_eq!(body[0], json!({ "id": "1", "name": "Item 1", "price": 101.0 }));
}

#[tokio::test]
async fn reader_cannot_delete() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = token_with(&["Sales.Read"]);

    let res = client.delete(srv.url("/sales/1")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    // Nothing was removed.
    let res = client.get(srv.url("/sales/1")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn permission_is_checked_before_the_body() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .post(srv.url("/sales"))
        .bearer_auth(token_with(&["Sales.Read"]))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rejections_share_one_generic_body() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let untrusted = TokenFactory::new("https://evil.example.com/", AUDIENCE)
        .mint(json!({ "permissions": ["Sales.ReadWrite"] }));
    let forged = TokenFactory::new(ISSUER, AUDIENCE)
        .signed_with(ROGUE_KEY)
        .mint(json!({ "permissions": ["Sales.ReadWrite"] }));
    let expired = TokenFactory::new(ISSUER, AUDIENCE).mint(json!({
        "permissions": ["Sales.ReadWrite"],
        "exp": chrono::Utc::now().timestamp() - 3600,
    }));

    let mut bodies = Vec::new();
    for token in [untrusted, forged, expired, "garbage".to_string()] {
        let res = client.get(srv.url("/sales")).bearer_auth(token).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        bodies.push(res.text().await.unwrap());
    }
    let anonymous = client.get(srv.url("/sales")).send().await.unwrap();
    bodies.push(anonymous.text().await.unwrap());

    assert!(bodies.windows(2).all(|w| w[0] == w[1]), "{bodies:?}");
    let body: Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn me_returns_claim_values() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(srv.url("/me"))
        .bearer_auth(token_with(&["Sales.Read"]))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let values: Vec<String> = res.json().await.unwrap();
    for expected in ["Test User", "Sales.Read", ISSUER, AUDIENCE, "test-user"] {
        assert!(values.iter().any(|v| v == expected), "missing {expected} in {values:?}");
    }
}

#[tokio::test]
async fn writer_lifecycle_create_update_delete() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = token_with(&["Sales.ReadWrite"]);

    let res = client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Widget", "price": 12.5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let res = client
        .post(srv.url(&format!("/sales/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "Widget XL", "price": 20.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url(&format!("/sales/{id}"))).bearer_auth(&token).send().await.unwrap();
    let fetched: Value = res.json().await.unwrap();
    assert_eq!(fetched, json!({ "id": id, "name": "Widget XL", "price": 20.0 }));

    let res = client.delete(srv.url(&format!("/sales/{id}"))).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.url(&format!("/sales/{id}"))).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_records_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = token_with(&["Sales.ReadWrite"]);

    let res = client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "name": "", "price": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "id": "1", "name": "Dup", "price": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
