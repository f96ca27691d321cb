//! Bearer-token authentication and claim-based authorization.
//!
//! No HTTP routing and no storage here. The transport hands the raw
//! `Authorization` header to the [`RequestGate`] and acts on its verdict.

pub mod authorize;
pub mod cache;
pub mod claims;
pub mod config;
pub mod gate;
pub mod keys;
pub mod permissions;
pub mod principal;
pub mod validator;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use authorize::{
    AuthzError, OperationAuthorization, PermissionRequirement, SalesOperation, authorize, has_permission,
    missing_permissions, satisfies,
};
pub use cache::{KeyCache, KeySnapshot, RefreshPolicy};
pub use claims::{ClaimSet, VerifiedClaims};
pub use config::{ConfigError, GateConfig, KeyDiscovery};
pub use gate::{GateState, RequestGate, SharedGate, Unauthorized, extract_bearer};
pub use keys::{KeySet, KeySource, KeySourceError, OidcDiscovery, PinnedKeys};
pub use permissions::{Permission, SALES_READ, SALES_READ_WRITE};
pub use principal::{Principal, PrincipalBuilder};
pub use validator::{TokenValidator, ValidationError};
