//! Gate configuration: the trust root and validation knobs.
//!
//! Everything the gate consults is passed in explicitly through `GateConfig`;
//! nothing is resolved from process-wide state after construction.

use std::path::PathBuf;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;

pub const DEFAULT_PERMISSION_CLAIM: &str = "permissions";
pub const DEFAULT_NAME_CLAIM: &str = "name";
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(30);

const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60 * 60);
const MAX_METADATA_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRY_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Where the issuer's signing keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyDiscovery {
    /// OpenID Connect discovery document; keys are read from its `jwks_uri`.
    Metadata { url: String },
    /// JWK set stored in a local file.
    JwksFile { path: PathBuf },
    /// Inline JWK set document.
    Jwks { document: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Expected `iss` of every accepted token.
    pub issuer: String,
    /// This service's identifier; must appear in the token's `aud`.
    pub audience: String,
    pub discovery: KeyDiscovery,
    /// Claim whose values form the principal's permission set.
    pub permission_claim: String,
    /// Claim used as the principal's identity label (falls back to `sub`).
    pub name_claim: String,
    pub allowed_algorithms: Vec<Algorithm>,
    pub clock_skew: Duration,
    /// How long fetched key metadata stays fresh.
    pub metadata_ttl: Duration,
    /// Upper bound for a single metadata fetch attempt.
    pub fetch_timeout: Duration,
    pub fetch_attempts: u32,
    /// Base delay between fetch attempts (doubled per attempt).
    pub retry_backoff: Duration,
    /// After a failed refresh, stale keys are served this long before retrying.
    pub retry_cooldown: Duration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("exactly one of SALESGATE_METADATA_URL or SALESGATE_JWKS_FILE must be set")]
    AmbiguousDiscovery,
}

impl GateConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, discovery: KeyDiscovery) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            discovery,
            permission_claim: DEFAULT_PERMISSION_CLAIM.to_string(),
            name_claim: DEFAULT_NAME_CLAIM.to_string(),
            allowed_algorithms: vec![Algorithm::RS256],
            clock_skew: DEFAULT_CLOCK_SKEW,
            metadata_ttl: DEFAULT_METADATA_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
        }
    }

    pub fn with_permission_claim(mut self, claim: impl Into<String>) -> Self {
        self.permission_claim = claim.into();
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    /// Load from `SALESGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup (environment, test maps).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let issuer = required("SALESGATE_ISSUER")?;
        let audience = required("SALESGATE_AUDIENCE")?;

        let discovery = match (lookup("SALESGATE_METADATA_URL"), lookup("SALESGATE_JWKS_FILE")) {
            (Some(url), None) => KeyDiscovery::Metadata { url },
            (None, Some(path)) => KeyDiscovery::JwksFile { path: PathBuf::from(path) },
            (None, None) => return Err(ConfigError::Missing("SALESGATE_METADATA_URL")),
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousDiscovery),
        };

        let mut config = Self::new(issuer, audience, discovery);

        if let Some(claim) = lookup("SALESGATE_PERMISSION_CLAIM") {
            config.permission_claim = claim;
        }
        if let Some(claim) = lookup("SALESGATE_NAME_CLAIM") {
            config.name_claim = claim;
        }
        if let Some(raw) = lookup("SALESGATE_ALLOWED_ALGORITHMS") {
            config.allowed_algorithms = parse_algorithms(&raw)?;
        }
        if let Some(secs) = parse_secs(&lookup, "SALESGATE_CLOCK_SKEW_SECS")? {
            config.clock_skew = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "SALESGATE_METADATA_TTL_SECS")? {
            config.metadata_ttl = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "SALESGATE_FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "SALESGATE_RETRY_COOLDOWN_SECS")? {
            config.retry_cooldown = secs;
        }
        if let Some(raw) = lookup("SALESGATE_FETCH_ATTEMPTS") {
            config.fetch_attempts = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "SALESGATE_FETCH_ATTEMPTS", value: raw })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the gate unsafe or unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::Invalid {
                var: "SALESGATE_CLOCK_SKEW_SECS",
                value: self.clock_skew.as_secs().to_string(),
            });
        }
        if self.metadata_ttl > MAX_METADATA_TTL {
            return Err(ConfigError::Invalid {
                var: "SALESGATE_METADATA_TTL_SECS",
                value: self.metadata_ttl.as_secs().to_string(),
            });
        }
        if self.fetch_timeout > MAX_FETCH_TIMEOUT {
            return Err(ConfigError::Invalid {
                var: "SALESGATE_FETCH_TIMEOUT_SECS",
                value: self.fetch_timeout.as_secs().to_string(),
            });
        }
        if self.retry_cooldown > MAX_RETRY_COOLDOWN {
            return Err(ConfigError::Invalid {
                var: "SALESGATE_RETRY_COOLDOWN_SECS",
                value: self.retry_cooldown.as_secs().to_string(),
            });
        }
        if self.fetch_attempts == 0 {
            return Err(ConfigError::Invalid { var: "SALESGATE_FETCH_ATTEMPTS", value: "0".to_string() });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid { var: "SALESGATE_FETCH_TIMEOUT_SECS", value: "0".to_string() });
        }
        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::Missing("SALESGATE_ALLOWED_ALGORITHMS"));
        }
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn parse_algorithms(raw: &str) -> Result<Vec<Algorithm>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.parse::<Algorithm>().map_err(|_| ConfigError::Invalid {
                var: "SALESGATE_ALLOWED_ALGORITHMS",
                value: name.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_settings_are_present() {
        let config = GateConfig::from_lookup(lookup(&[
            ("SALESGATE_ISSUER", "https://login.example.com/tenant/v2.0/"),
            ("SALESGATE_AUDIENCE", "sales-api"),
            ("SALESGATE_METADATA_URL", "https://login.example.com/.well-known/openid-configuration"),
        ]))
        .unwrap();

        assert_eq!(config.permission_claim, "permissions");
        assert_eq!(config.name_claim, "name");
        assert_eq!(config.allowed_algorithms, vec![Algorithm::RS256]);
        assert_eq!(config.clock_skew, DEFAULT_CLOCK_SKEW);
        assert_eq!(config.metadata_ttl, DEFAULT_METADATA_TTL);
        assert_eq!(config.fetch_attempts, 3);
        assert!(matches!(config.discovery, KeyDiscovery::Metadata { .. }));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = GateConfig::from_lookup(lookup(&[
            ("SALESGATE_ISSUER", "iss"),
            ("SALESGATE_AUDIENCE", "aud"),
            ("SALESGATE_JWKS_FILE", "/etc/salesgate/jwks.json"),
            ("SALESGATE_PERMISSION_CLAIM", "scp"),
            ("SALESGATE_ALLOWED_ALGORITHMS", "RS256, ES256"),
            ("SALESGATE_CLOCK_SKEW_SECS", "60"),
            ("SALESGATE_METADATA_TTL_SECS", "600"),
            ("SALESGATE_FETCH_TIMEOUT_SECS", "2"),
            ("SALESGATE_FETCH_ATTEMPTS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.permission_claim, "scp");
        assert_eq!(config.allowed_algorithms, vec![Algorithm::RS256, Algorithm::ES256]);
        assert_eq!(config.clock_skew, Duration::from_secs(60));
        assert_eq!(config.metadata_ttl, Duration::from_secs(600));
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert_eq!(config.fetch_attempts, 5);
        assert_eq!(
            config.discovery,
            KeyDiscovery::JwksFile { path: PathBuf::from("/etc/salesgate/jwks.json") }
        );
    }

    #[test]
    fn missing_issuer_is_reported() {
        let err = GateConfig::from_lookup(lookup(&[("SALESGATE_AUDIENCE", "aud")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("SALESGATE_ISSUER"));
    }

    #[test]
    fn both_discovery_sources_are_rejected() {
        let err = GateConfig::from_lookup(lookup(&[
            ("SALESGATE_ISSUER", "iss"),
            ("SALESGATE_AUDIENCE", "aud"),
            ("SALESGATE_METADATA_URL", "https://idp/.well-known/openid-configuration"),
            ("SALESGATE_JWKS_FILE", "jwks.json"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::AmbiguousDiscovery);
    }

    #[test]
    fn unreasonable_values_are_rejected() {
        let base = [
            ("SALESGATE_ISSUER", "iss"),
            ("SALESGATE_AUDIENCE", "aud"),
            ("SALESGATE_JWKS_FILE", "jwks.json"),
        ];

        let mut vars = base.to_vec();
        vars.push(("SALESGATE_CLOCK_SKEW_SECS", "7200"));
        assert!(matches!(
            GateConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { var: "SALESGATE_CLOCK_SKEW_SECS", .. })
        ));

        let mut vars = base.to_vec();
        vars.push(("SALESGATE_ALLOWED_ALGORITHMS", "RS256,NOPE"));
        assert!(matches!(
            GateConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { var: "SALESGATE_ALLOWED_ALGORITHMS", .. })
        ));

        let mut vars = base.to_vec();
        vars.push(("SALESGATE_FETCH_ATTEMPTS", "0"));
        assert!(GateConfig::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn lifetimes_beyond_their_caps_are_rejected() {
        let base = [
            ("SALESGATE_ISSUER", "iss"),
            ("SALESGATE_AUDIENCE", "aud"),
            ("SALESGATE_JWKS_FILE", "jwks.json"),
        ];

        for var in [
            "SALESGATE_METADATA_TTL_SECS",
            "SALESGATE_FETCH_TIMEOUT_SECS",
            "SALESGATE_RETRY_COOLDOWN_SECS",
        ] {
            let mut vars = base.to_vec();
            vars.push((var, "18446744073709551615"));
            match GateConfig::from_lookup(lookup(&vars)) {
                Err(ConfigError::Invalid { var: rejected, .. }) => assert_eq!(rejected, var),
                other => panic!("{var}: expected rejection, got {other:?}"),
            }
        }

        let mut vars = base.to_vec();
        vars.push(("SALESGATE_RETRY_COOLDOWN_SECS", "120"));
        assert_eq!(GateConfig::from_lookup(lookup(&vars)).unwrap().retry_cooldown, Duration::from_secs(120));
    }

    #[test]
    fn builder_values_are_checked_too() {
        let config = GateConfig::new("iss", "aud", KeyDiscovery::Jwks { document: "{}".to_string() })
            .with_metadata_ttl(Duration::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { var: "SALESGATE_METADATA_TTL_SECS", .. })
        ));
    }
}
