use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Immutable claim set: claim name to the ordered list of its string values.
///
/// JSON claim payloads are flattened into strings once, at construction:
/// - strings become one value
/// - arrays become one value per element (non-string elements as JSON text)
/// - numbers, booleans and objects become their compact JSON text
/// - `null` contributes nothing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClaimSet(BTreeMap<String, Vec<String>>);

impl ClaimSet {
    pub fn from_json(payload: &Map<String, Value>) -> Self {
        let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in payload {
            let values = claims.entry(name.clone()).or_default();
            match value {
                Value::Array(items) => values.extend(items.iter().filter_map(scalar_text)),
                other => values.extend(scalar_text(other)),
            }
        }
        claims.retain(|_, values| !values.is_empty());
        Self(claims)
    }

    /// All values asserted under `name` (empty if the claim is absent).
    pub fn get(&self, name: &str) -> &[String] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Every claim value, in claim-name order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().flatten().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N, V> FromIterator<(N, V)> for ClaimSet
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in iter {
            claims.entry(name.into()).or_default().push(value.into());
        }
        Self(claims)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Claims that passed every validation step.
///
/// Only the token validator can construct this type, so a `Principal` (built
/// exclusively from `VerifiedClaims`) can never originate from unverified input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    claims: ClaimSet,
}

impl VerifiedClaims {
    pub(crate) fn new(claims: ClaimSet) -> Self {
        Self { claims }
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    pub fn into_claims(self) -> ClaimSet {
        self.claims
    }
}
