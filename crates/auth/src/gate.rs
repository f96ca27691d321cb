//! Per-request authentication gate.
//!
//! Each request walks a small terminal state machine:
//!
//! ```text
//! Unauthenticated --token found--> Authenticating --verified--> Authenticated(Principal)
//!        |                               |
//!        +--no token--> Rejected <--failed--+
//! ```
//!
//! Nothing is carried between requests. Permission checks happen afterwards,
//! in the handler, against the operation's requirement.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::GateConfig;
use crate::keys::KeySourceError;
use crate::principal::{Principal, PrincipalBuilder};
use crate::validator::{TokenValidator, ValidationError};

/// Uniform authentication failure.
///
/// Displays the same generic message for every cause; the underlying reason
/// is available to logs and tests through [`Unauthorized::reason`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unauthorized")]
pub struct Unauthorized {
    reason: ValidationError,
}

impl Unauthorized {
    pub fn new(reason: ValidationError) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> ValidationError {
        self.reason
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    Authenticating,
    Authenticated(Principal),
    Rejected(Unauthorized),
}

enum GateEvent {
    TokenFound,
    NoToken(ValidationError),
    Verified(Principal),
    Failed(ValidationError),
}

impl GateState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Rejected(_))
    }

    fn advance(self, event: GateEvent) -> Self {
        match (self, event) {
            (Self::Unauthenticated, GateEvent::TokenFound) => Self::Authenticating,
            (Self::Unauthenticated, GateEvent::NoToken(reason)) => Self::Rejected(Unauthorized::new(reason)),
            (Self::Authenticating, GateEvent::Verified(principal)) => Self::Authenticated(principal),
            (Self::Authenticating, GateEvent::Failed(reason)) => Self::Rejected(Unauthorized::new(reason)),
            (terminal @ (Self::Authenticated(_) | Self::Rejected(_)), _) => terminal,
            // Out-of-order events never authenticate.
            (_, _) => Self::Rejected(Unauthorized::new(ValidationError::MissingToken)),
        }
    }

    /// Collapse to the verdict handed to collaborators.
    ///
    /// A request that never reached a terminal state is treated like one
    /// without credentials.
    pub fn into_verdict(self) -> Result<Principal, Unauthorized> {
        match self {
            Self::Authenticated(principal) => Ok(principal),
            Self::Rejected(unauthorized) => Err(unauthorized),
            Self::Unauthenticated | Self::Authenticating => {
                Err(Unauthorized::new(ValidationError::MissingToken))
            }
        }
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively. An absent header, another scheme
/// or an empty token count as no token; bytes that are not visible ASCII make
/// the header malformed.
pub fn extract_bearer(header: Option<&[u8]>) -> Result<&str, ValidationError> {
    let header = header.ok_or(ValidationError::MissingToken)?;
    let header = std::str::from_utf8(header).map_err(|_| ValidationError::MalformedToken)?;
    if !header.bytes().all(|b| b == b' ' || b == b'\t' || b.is_ascii_graphic()) {
        return Err(ValidationError::MalformedToken);
    }

    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or(ValidationError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(ValidationError::MissingToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ValidationError::MissingToken);
    }
    Ok(token)
}

pub struct RequestGate {
    validator: TokenValidator,
    builder: PrincipalBuilder,
}

impl RequestGate {
    pub fn new(validator: TokenValidator, builder: PrincipalBuilder) -> Self {
        Self { validator, builder }
    }

    pub fn from_config(config: &GateConfig) -> Result<Self, KeySourceError> {
        Ok(Self::new(
            TokenValidator::from_config(config)?,
            PrincipalBuilder::from_config(config),
        ))
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Run the state machine for one request and return its terminal state.
    pub async fn run(&self, authorization: Option<&[u8]>, now: DateTime<Utc>) -> GateState {
        let state = GateState::Unauthenticated;

        let token = match extract_bearer(authorization) {
            Ok(token) => token,
            Err(reason) => return state.advance(GateEvent::NoToken(reason)),
        };
        let state = state.advance(GateEvent::TokenFound);

        match self.validator.validate(Some(token), now).await {
            Ok(claims) => state.advance(GateEvent::Verified(self.builder.build(claims))),
            Err(reason) => state.advance(GateEvent::Failed(reason)),
        }
    }

    /// Authenticate one request: the principal, or a uniform unauthorized verdict.
    pub async fn evaluate(&self, authorization: Option<&[u8]>, now: DateTime<Utc>) -> Result<Principal, Unauthorized> {
        let verdict = self.run(authorization, now).await.into_verdict();
        match &verdict {
            Ok(principal) => tracing::debug!(identity = principal.identity(), "request authenticated"),
            Err(unauthorized) => tracing::warn!(reason = %unauthorized.reason(), "request rejected"),
        }
        verdict
    }
}

/// Shared handle used by transports.
pub type SharedGate = Arc<RequestGate>;
