use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque, case-sensitive strings carried in the token's
/// permission claim (e.g. "Sales.Read"). There is no wildcard: a principal holds
/// exactly the permissions its verified claims list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read access to sales records.
pub const SALES_READ: Permission = Permission::from_static("Sales.Read");

/// Read-write access to sales records.
pub const SALES_READ_WRITE: Permission = Permission::from_static("Sales.ReadWrite");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_compare_case_sensitively() {
        assert_eq!(Permission::new("Sales.Read"), SALES_READ);
        assert_ne!(Permission::new("sales.read"), SALES_READ);
    }

    #[test]
    fn permission_serializes_as_plain_string() {
        let json = serde_json::to_string(&SALES_READ_WRITE).unwrap();
        assert_eq!(json, "\"Sales.ReadWrite\"");
    }
}
