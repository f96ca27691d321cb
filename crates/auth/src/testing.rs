//! Token minting for tests, backed by the RSA fixtures in `testdata/`.
//!
//! `TRUSTED_KEY` matches the single key in `TRUSTED_JWKS`; `NEXT_KEY` is the
//! second key of `ROTATED_JWKS`; `ROGUE_KEY` is published nowhere.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Map, Value, json};

pub const TRUSTED_KEY: &[u8] = include_bytes!("../testdata/trusted.pem");
pub const NEXT_KEY: &[u8] = include_bytes!("../testdata/next.pem");
pub const ROGUE_KEY: &[u8] = include_bytes!("../testdata/rogue.pem");

pub const TRUSTED_KID: &str = "trusted-key-1";
pub const NEXT_KID: &str = "next-key-2";

pub const TRUSTED_JWKS: &str = include_str!("../testdata/jwks.json");
pub const ROTATED_JWKS: &str = include_str!("../testdata/jwks-rotated.json");

#[derive(Debug, Clone)]
pub struct TokenFactory {
    issuer: String,
    audience: String,
    kid: Option<String>,
    algorithm: Algorithm,
    signing_key: &'static [u8],
    lifetime: Duration,
}

impl TokenFactory {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            kid: Some(TRUSTED_KID.to_string()),
            algorithm: Algorithm::RS256,
            signing_key: TRUSTED_KEY,
            lifetime: Duration::minutes(10),
        }
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn without_kid(mut self) -> Self {
        self.kid = None;
        self
    }

    /// Sign with another PEM key (the header still carries the configured kid).
    pub fn signed_with(mut self, pem: &'static [u8]) -> Self {
        self.signing_key = pem;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Mint a token with `iss`, `aud`, `sub`, `iat` and `exp` defaults.
    ///
    /// `overrides` is a JSON object merged over the defaults; a `null` value
    /// removes the claim.
    pub fn mint(&self, overrides: Value) -> String {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".into(), json!(self.issuer));
        claims.insert("aud".into(), json!(self.audience));
        claims.insert("sub".into(), json!("test-user"));
        claims.insert("iat".into(), json!(now.timestamp()));
        claims.insert("exp".into(), json!((now + self.lifetime).timestamp()));

        if let Value::Object(extra) = overrides {
            for (name, value) in extra {
                if value.is_null() {
                    claims.remove(&name);
                } else {
                    claims.insert(name, value);
                }
            }
        }

        let mut header = Header::new(self.algorithm);
        header.kid = self.kid.clone();
        let key = EncodingKey::from_rsa_pem(self.signing_key).expect("fixture key is a valid RSA PEM");
        jsonwebtoken::encode(&header, &claims, &key).expect("fixture token encodes")
    }
}
