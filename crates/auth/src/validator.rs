//! Bearer token validation against the configured trust root.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::cache::{KeyCache, RefreshPolicy};
use crate::claims::{ClaimSet, VerifiedClaims};
use crate::config::GateConfig;
use crate::keys::{KeySource, KeySourceError, key_source_from_config};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no bearer token presented")]
    MissingToken,

    #[error("token is not a well-formed JWT")]
    MalformedToken,

    #[error("token issuer or signing key is not trusted")]
    UntrustedIssuer,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token audience does not match")]
    AudienceMismatch,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("issuer signing keys are unavailable")]
    IssuerUnavailable,
}

type Payload = Map<String, Value>;

pub struct TokenValidator {
    issuer: String,
    audience: String,
    allowed_algorithms: Vec<Algorithm>,
    clock_skew: ChronoDuration,
    keys: Arc<KeyCache>,
}

impl TokenValidator {
    pub fn new(config: &GateConfig, keys: Arc<KeyCache>) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            allowed_algorithms: config.allowed_algorithms.clone(),
            clock_skew: ChronoDuration::from_std(config.clock_skew).unwrap_or_else(|_| ChronoDuration::zero()),
            keys,
        }
    }

    pub fn with_source(config: &GateConfig, source: Arc<dyn KeySource>) -> Self {
        let cache = Arc::new(KeyCache::new(source, RefreshPolicy::from_config(config)));
        Self::new(config, cache)
    }

    /// Validator whose keys come from `config.discovery`.
    pub fn from_config(config: &GateConfig) -> Result<Self, KeySourceError> {
        Ok(Self::with_source(config, key_source_from_config(config)?))
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.keys
    }

    /// Validate a raw bearer token.
    ///
    /// Checks run in a fixed order (structure, issuer and key, signature,
    /// audience, time window) and the first failure is reported.
    pub async fn validate(&self, raw: Option<&str>, now: DateTime<Utc>) -> Result<VerifiedClaims, ValidationError> {
        let token = raw
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ValidationError::MissingToken)?;

        let header = jsonwebtoken::decode_header(token).map_err(|_| ValidationError::MalformedToken)?;
        let unverified = peek_payload(token)?;

        // Routing only: the issuer is re-read from the verified payload below.
        let issuer = unverified.get("iss").and_then(Value::as_str);
        if issuer != Some(self.issuer.as_str()) {
            return Err(ValidationError::UntrustedIssuer);
        }
        let kid = header.kid.as_deref().ok_or(ValidationError::UntrustedIssuer)?;

        let snapshot = self.keys.snapshot().await.map_err(|err| {
            tracing::warn!(error = %err, "cannot obtain issuer signing keys");
            ValidationError::IssuerUnavailable
        })?;
        let key = snapshot.key(kid).ok_or(ValidationError::UntrustedIssuer)?;

        if !self.allowed_algorithms.contains(&header.alg) {
            return Err(ValidationError::InvalidSignature);
        }

        let verified = jsonwebtoken::decode::<Payload>(token, key, &signature_only(header.alg))
            .map_err(|err| classify(err.kind()))?
            .claims;

        if verified.get("iss").and_then(Value::as_str) != Some(self.issuer.as_str()) {
            return Err(ValidationError::UntrustedIssuer);
        }
        self.check_audience(&verified)?;
        self.check_time_window(&verified, now)?;

        Ok(VerifiedClaims::new(ClaimSet::from_json(&verified)))
    }

    fn check_audience(&self, payload: &Payload) -> Result<(), ValidationError> {
        let matches = match payload.get("aud") {
            Some(Value::String(aud)) => *aud == self.audience,
            Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(self.audience.as_str())),
            _ => false,
        };
        if matches { Ok(()) } else { Err(ValidationError::AudienceMismatch) }
    }

    fn check_time_window(&self, payload: &Payload, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let expires_at = timestamp(payload, "exp")?.ok_or(ValidationError::MalformedToken)?;
        // Past the representable range means "not yet expired".
        if let Some(expiry) = expires_at.checked_add_signed(self.clock_skew) {
            if now >= expiry {
                return Err(ValidationError::Expired);
            }
        }
        if let Some(not_before) = timestamp(payload, "nbf")? {
            let earliest = not_before.checked_sub_signed(self.clock_skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
            if now < earliest {
                return Err(ValidationError::NotYetValid);
            }
        }
        Ok(())
    }
}

/// Signature and algorithm checks only; claims are checked by the validator.
fn signature_only(alg: Algorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation
}

fn classify(kind: &ErrorKind) -> ValidationError {
    match kind {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::MissingRequiredClaim(_) => ValidationError::MalformedToken,
        _ => ValidationError::InvalidSignature,
    }
}

fn peek_payload(token: &str) -> Result<Payload, ValidationError> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(ValidationError::MalformedToken);
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| ValidationError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| ValidationError::MalformedToken)
}

fn timestamp(payload: &Payload, claim: &str) -> Result<Option<DateTime<Utc>>, ValidationError> {
    let Some(value) = payload.get(claim) else {
        return Ok(None);
    };
    let secs = match (value.as_i64(), value.as_f64()) {
        (Some(secs), _) => secs,
        // NumericDate may carry fractional seconds.
        (None, Some(secs)) if secs.is_finite() => secs.trunc() as i64,
        _ => return Err(ValidationError::MalformedToken),
    };
    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or(ValidationError::MalformedToken)
}
