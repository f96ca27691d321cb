use std::collections::BTreeSet;

use crate::claims::{ClaimSet, VerifiedClaims};
use crate::config::GateConfig;
use crate::permissions::Permission;

/// The authenticated caller for the duration of one request.
///
/// Immutable once built; the only constructor consumes `VerifiedClaims`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    identity: String,
    claims: ClaimSet,
    permissions: BTreeSet<Permission>,
}

impl Principal {
    /// Identity label (name claim, else `sub`). May be empty.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    pub fn permissions(&self) -> &BTreeSet<Permission> {
        &self.permissions
    }
}

/// Turns verified claims into a `Principal`.
///
/// - No IO
/// - No failure path (input is already verified)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalBuilder {
    permission_claim: String,
    name_claim: String,
}

impl PrincipalBuilder {
    pub fn new(permission_claim: impl Into<String>, name_claim: impl Into<String>) -> Self {
        Self {
            permission_claim: permission_claim.into(),
            name_claim: name_claim.into(),
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.permission_claim.clone(), config.name_claim.clone())
    }

    pub fn build(&self, verified: VerifiedClaims) -> Principal {
        let claims = verified.into_claims();

        let identity = claims
            .first(&self.name_claim)
            .or_else(|| claims.first("sub"))
            .unwrap_or_default()
            .to_string();

        let permissions = claims
            .get(&self.permission_claim)
            .iter()
            .map(|value| Permission::new(value.clone()))
            .collect();

        Principal { identity, claims, permissions }
    }
}
