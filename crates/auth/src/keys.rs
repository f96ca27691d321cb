//! Issuer signing-key metadata: JWK sets and the sources they are fetched from.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{GateConfig, KeyDiscovery};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeySourceError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid key metadata: {0}")]
    InvalidDocument(String),

    #[error("metadata issuer {found:?} does not match configured issuer {expected:?}")]
    IssuerMismatch { expected: String, found: String },

    #[error("cannot read key file: {0}")]
    Io(String),
}

impl KeySourceError {
    /// Whether another attempt may succeed (network trouble, 5xx, throttling).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidDocument(_) | Self::IssuerMismatch { .. } | Self::Io(_) => false,
        }
    }

    fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout { url: url.to_string() }
        } else {
            Self::Http { url: url.to_string(), message: err.to_string() }
        }
    }
}

/// Verification keys of one issuer, indexed by key id.
#[derive(Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, DecodingKey>,
}

impl KeySet {
    /// Parse a JWKS document (`{"keys": [...]}`).
    ///
    /// Keys that cannot verify signatures (no `kid`, encryption-only, unsupported
    /// key type or bad parameters) are skipped; a document left with no usable
    /// key is rejected.
    pub fn from_jwks_json(document: &str) -> Result<Self, KeySourceError> {
        let root: Value = serde_json::from_str(document)
            .map_err(|e| KeySourceError::InvalidDocument(format!("jwks is not JSON: {e}")))?;
        let entries = root
            .get("keys")
            .and_then(Value::as_array)
            .ok_or_else(|| KeySourceError::InvalidDocument("jwks has no `keys` array".to_string()))?;

        let mut keys = HashMap::with_capacity(entries.len());
        for entry in entries {
            match usable_key(entry) {
                Ok((kid, key)) => {
                    keys.insert(kid, key);
                }
                Err(reason) => tracing::warn!(%reason, "skipping unusable signing key"),
            }
        }

        if keys.is_empty() {
            return Err(KeySourceError::InvalidDocument("jwks contains no usable signing keys".to_string()));
        }
        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl core::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut kids: Vec<&str> = self.key_ids().collect();
        kids.sort_unstable();
        f.debug_struct("KeySet").field("kids", &kids).finish()
    }
}

fn usable_key(entry: &Value) -> Result<(String, DecodingKey), String> {
    let jwk: Jwk = serde_json::from_value(entry.clone()).map_err(|e| format!("unparseable jwk: {e}"))?;
    let kid = jwk
        .common
        .key_id
        .clone()
        .filter(|kid| !kid.is_empty())
        .ok_or_else(|| "jwk without kid".to_string())?;
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return Err(format!("jwk {kid} is an encryption key"));
    }
    let key = DecodingKey::from_jwk(&jwk).map_err(|e| format!("jwk {kid}: {e}"))?;
    Ok((kid, key))
}

/// Supplier of an issuer's current key set.
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<KeySet, KeySourceError>;

    /// Where the keys come from, for logs.
    fn describe(&self) -> String;
}

/// A fixed key set configured up front.
#[derive(Debug, Clone)]
pub struct PinnedKeys {
    keys: KeySet,
}

impl PinnedKeys {
    pub fn new(keys: KeySet) -> Self {
        Self { keys }
    }

    pub fn from_jwks_json(document: &str) -> Result<Self, KeySourceError> {
        KeySet::from_jwks_json(document).map(Self::new)
    }

    pub fn from_file(path: &Path) -> Result<Self, KeySourceError> {
        let document = std::fs::read_to_string(path)
            .map_err(|e| KeySourceError::Io(format!("{}: {e}", path.display())))?;
        Self::from_jwks_json(&document)
    }
}

#[async_trait]
impl KeySource for PinnedKeys {
    async fn fetch(&self) -> Result<KeySet, KeySourceError> {
        Ok(self.keys.clone())
    }

    fn describe(&self) -> String {
        format!("pinned key set ({} keys)", self.keys.len())
    }
}

/// Subset of the OpenID provider metadata the gate relies on.
#[derive(Debug, Clone, Deserialize)]
struct ProviderMetadata {
    issuer: String,
    jwks_uri: String,
}

/// Keys published by an OpenID provider: discovery document, then `jwks_uri`.
#[derive(Debug, Clone)]
pub struct OidcDiscovery {
    client: reqwest::Client,
    metadata_url: String,
    issuer: String,
}

impl OidcDiscovery {
    pub fn new(
        metadata_url: impl Into<String>,
        issuer: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, KeySourceError> {
        let metadata_url = metadata_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeySourceError::from_reqwest(&metadata_url, e))?;
        Ok(Self { client, metadata_url, issuer: issuer.into() })
    }

    async fn get_text(&self, url: &str) -> Result<String, KeySourceError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| KeySourceError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySourceError::Status { url: url.to_string(), status: status.as_u16() });
        }

        response.text().await.map_err(|e| KeySourceError::from_reqwest(url, e))
    }
}

#[async_trait]
impl KeySource for OidcDiscovery {
    async fn fetch(&self) -> Result<KeySet, KeySourceError> {
        let body = self.get_text(&self.metadata_url).await?;
        let metadata: ProviderMetadata = serde_json::from_str(&body)
            .map_err(|e| KeySourceError::InvalidDocument(format!("provider metadata: {e}")))?;

        if metadata.issuer != self.issuer {
            return Err(KeySourceError::IssuerMismatch {
                expected: self.issuer.clone(),
                found: metadata.issuer,
            });
        }

        let jwks = self.get_text(&metadata.jwks_uri).await?;
        KeySet::from_jwks_json(&jwks)
    }

    fn describe(&self) -> String {
        self.metadata_url.clone()
    }
}

/// Build the key source described by the configuration.
pub fn key_source_from_config(config: &GateConfig) -> Result<Arc<dyn KeySource>, KeySourceError> {
    let source: Arc<dyn KeySource> = match &config.discovery {
        KeyDiscovery::Metadata { url } => {
            Arc::new(OidcDiscovery::new(url.clone(), config.issuer.clone(), config.fetch_timeout)?)
        }
        KeyDiscovery::JwksFile { path } => Arc::new(PinnedKeys::from_file(path)?),
        KeyDiscovery::Jwks { document } => Arc::new(PinnedKeys::from_jwks_json(document)?),
    };
    Ok(source)
}
