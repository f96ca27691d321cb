use std::sync::Arc;

use anyhow::Context;
use salesgate_auth::{GateConfig, RequestGate};
use salesgate_sales::InMemorySalesRepository;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    salesgate_observability::init();

    let config = GateConfig::from_env().context("invalid gate configuration")?;
    let gate = Arc::new(RequestGate::from_config(&config).context("failed to set up signing key source")?);

    // Keys are fetched lazily if the issuer is not reachable yet.
    if let Err(e) = gate.validator().key_cache().warm().await {
        tracing::warn!(error = %e, "could not prefetch signing keys");
    }

    let app = salesgate_api::app::build_app(gate, Arc::new(InMemorySalesRepository::seeded()));

    let addr = std::env::var("SALESGATE_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, issuer = %config.issuer, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
