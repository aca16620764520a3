use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable read by [`OidcConfig::from_env`]
pub const OIDC_CONFIG_ENV: &str = "OIDC_AUTH_CONFIG";

pub const DEFAULT_KEY_FETCH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_ALLOWED_CLOCK_DRIFT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_LOOKUP: &str = "header:Authorization";
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";
pub const DEFAULT_CONTEXT_KEY: &str = "user";

/// OIDC validation configuration
///
/// Only `issuer` is required; every other field falls back to its default
/// when absent from the serialized form.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// Issuer URL, compared verbatim against the `iss` claim
    pub issuer: String,
    /// Overrides `<issuer>/.well-known/openid-configuration`
    pub discovery_uri: Option<String>,
    /// Overrides the `jwks_uri` advertised by the discovery document
    pub jwks_uri: Option<String>,
    /// Required `typ` header value (e.g. `at+jwt`), any type when unset
    pub required_token_type: Option<String>,
    /// Audience that must appear in the `aud` claim, any audience when unset
    pub required_audience: Option<String>,
    /// Timeout for discovery and JWKS fetches in seconds (default: 5)
    pub key_fetch_timeout_secs: u64,
    /// Tolerance added to `exp` in seconds (default: 10)
    pub allowed_clock_drift_secs: u64,
    /// Ordered `<source>:<name>` list, e.g. `header:Authorization,cookie:session`
    pub token_lookup: String,
    /// Scheme expected in front of header tokens (default: Bearer, also used when blank)
    pub auth_scheme: String,
    /// Key under which accepted tokens are exposed to handlers (default: user)
    pub context_key: String,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            discovery_uri: None,
            jwks_uri: None,
            required_token_type: None,
            required_audience: None,
            key_fetch_timeout_secs: DEFAULT_KEY_FETCH_TIMEOUT_SECS,
            allowed_clock_drift_secs: DEFAULT_ALLOWED_CLOCK_DRIFT_SECS,
            token_lookup: DEFAULT_TOKEN_LOOKUP.to_string(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            context_key: DEFAULT_CONTEXT_KEY.to_string(),
        }
    }
}

impl OidcConfig {
    /// Configuration for `issuer` with every other option defaulted
    pub fn for_issuer(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            ..Self::default()
        }
    }

    /// Load OIDC configuration from the `OIDC_AUTH_CONFIG` environment variable
    pub fn from_env() -> Result<Self, ConfigError> {
        let json = std::env::var(OIDC_CONFIG_ENV)
            .map_err(|_| ConfigError::MissingEnvironment(OIDC_CONFIG_ENV))?;
        serde_json::from_str(&json).map_err(|source| ConfigError::InvalidEnvironment {
            name: OIDC_CONFIG_ENV,
            source,
        })
    }

    pub fn key_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.key_fetch_timeout_secs)
    }

    pub fn allowed_clock_drift(&self) -> Duration {
        Duration::from_secs(self.allowed_clock_drift_secs)
    }
}
