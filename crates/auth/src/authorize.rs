use serde::Serialize;
use thiserror::Error;

use crate::permissions::{Permission, SALES_READ, SALES_READ_WRITE};
use crate::principal::Principal;

/// Permissions an operation demands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "permissions", rename_all = "snake_case")]
pub enum PermissionRequirement {
    /// Satisfied when at least one listed permission is held (never when empty).
    AnyOf(Vec<Permission>),
    /// Satisfied when every listed permission is held (always when empty).
    AllOf(Vec<Permission>),
}

impl PermissionRequirement {
    pub fn any_of(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::AnyOf(permissions.into_iter().collect())
    }

    pub fn all_of(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::AllOf(permissions.into_iter().collect())
    }

    pub fn permissions(&self) -> &[Permission] {
        match self {
            Self::AnyOf(p) | Self::AllOf(p) => p,
        }
    }
}

impl core::fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let rule = match self {
            Self::AnyOf(_) => "any of",
            Self::AllOf(_) => "all of",
        };
        let names: Vec<&str> = self.permissions().iter().map(Permission::as_str).collect();
        write!(f, "{rule} [{}]", names.join(", "))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("permission denied: requires {requirement}")]
    PermissionDenied { requirement: PermissionRequirement },
}

/// Operation-side authorization contract.
///
/// Implemented by every protected operation; the API layer checks the
/// requirement before touching any state.
pub trait OperationAuthorization {
    /// Short operation name for logs.
    fn name(&self) -> &'static str;

    fn requirement(&self) -> PermissionRequirement;
}

/// Protected operations on sales records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesOperation {
    List,
    Read,
    Create,
    Update,
    Delete,
}

impl OperationAuthorization for SalesOperation {
    fn name(&self) -> &'static str {
        match self {
            Self::List => "sales.list",
            Self::Read => "sales.read",
            Self::Create => "sales.create",
            Self::Update => "sales.update",
            Self::Delete => "sales.delete",
        }
    }

    fn requirement(&self) -> PermissionRequirement {
        match self {
            Self::List | Self::Read => PermissionRequirement::any_of([SALES_READ, SALES_READ_WRITE]),
            Self::Create | Self::Update | Self::Delete => PermissionRequirement::all_of([SALES_READ_WRITE]),
        }
    }
}

/// Set-membership test (case-sensitive).
pub fn has_permission(principal: &Principal, permission: &Permission) -> bool {
    principal.permissions().contains(permission)
}

pub fn satisfies(principal: &Principal, requirement: &PermissionRequirement) -> bool {
    match requirement {
        PermissionRequirement::AnyOf(required) => required.iter().any(|p| has_permission(principal, p)),
        PermissionRequirement::AllOf(required) => required.iter().all(|p| has_permission(principal, p)),
    }
}

/// Permissions from `requirement` the principal does not hold.
pub fn missing_permissions<'a>(principal: &Principal, requirement: &'a PermissionRequirement) -> Vec<&'a Permission> {
    requirement
        .permissions()
        .iter()
        .filter(|p| !has_permission(principal, p))
        .collect()
}

/// Authorize a principal for an operation.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize<O: OperationAuthorization + ?Sized>(principal: &Principal, operation: &O) -> Result<(), AuthzError> {
    let requirement = operation.requirement();
    if satisfies(principal, &requirement) {
        Ok(())
    } else {
        Err(AuthzError::PermissionDenied { requirement })
    }
}
