use crate::claims::{TokenClaims, ValidatedToken};
use crate::config::OidcConfig;
use crate::discovery::{discovery_url, fetch_jwks_uri};
use crate::error::{ConfigError, ValidationError};
use crate::jws::UnverifiedHeader;
use chrono::{DateTime, TimeDelta, Utc};
use log::info;
use std::time::Duration;
use url::Url;

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            source,
        })
}

/// Fetch timeout, clock drift and the drift as a signed delta
fn check_durations(config: &OidcConfig) -> Result<(Duration, Duration, TimeDelta), ConfigError> {
    let key_fetch_timeout = config.key_fetch_timeout();
    if key_fetch_timeout.is_zero() {
        return Err(ConfigError::InvalidDuration {
            field: "key_fetch_timeout_secs",
            value: key_fetch_timeout,
        });
    }
    let allowed_clock_drift = config.allowed_clock_drift();
    let clock_drift =
        TimeDelta::from_std(allowed_clock_drift).map_err(|_| ConfigError::InvalidDuration {
            field: "allowed_clock_drift_secs",
            value: allowed_clock_drift,
        })?;
    Ok((key_fetch_timeout, allowed_clock_drift, clock_drift))
}

/// What a token must satisfy to be accepted for one issuer
///
/// Resolved once from an [`OidcConfig`] and immutable afterwards.
#[derive(Debug, Clone)]
pub struct IssuerPolicy {
    issuer: String,
    discovery_uri: String,
    jwks_uri: String,
    required_audience: Option<String>,
    required_token_type: Option<String>,
    allowed_clock_drift: Duration,
    clock_drift: TimeDelta,
    key_fetch_timeout: Duration,
}

impl IssuerPolicy {
    /// Resolve the policy of `config`, fetching the discovery document unless
    /// the JWKS URI is configured explicitly
    pub async fn resolve(
        config: &OidcConfig,
        client: &reqwest::Client,
    ) -> Result<Self, ConfigError> {
        let issuer = config.issuer.trim();
        if issuer.is_empty() {
            return Err(ConfigError::MissingIssuer);
        }
        check_url("issuer", issuer)?;
        check_durations(config)?;

        let discovery_uri = non_blank(&config.discovery_uri).unwrap_or_else(|| discovery_url(issuer));
        check_url("discovery_uri", &discovery_uri)?;

        let jwks_uri = match non_blank(&config.jwks_uri) {
            Some(jwks_uri) => jwks_uri,
            None => {
                let jwks_uri =
                    fetch_jwks_uri(client, &discovery_uri, config.key_fetch_timeout())
                        .await
                        .map_err(ConfigError::Discovery)?;
                info!("discovered jwks_uri={jwks_uri} from {discovery_uri}");
                jwks_uri
            }
        };

        Self::build(config, discovery_uri, jwks_uri)
    }

    pub(crate) fn build(
        config: &OidcConfig,
        discovery_uri: String,
        jwks_uri: String,
    ) -> Result<Self, ConfigError> {
        check_url("jwks_uri", &jwks_uri)?;
        let (key_fetch_timeout, allowed_clock_drift, clock_drift) = check_durations(config)?;

        Ok(Self {
            issuer: config.issuer.trim().to_string(),
            discovery_uri,
            jwks_uri,
            required_audience: non_blank(&config.required_audience),
            required_token_type: non_blank(&config.required_token_type),
            allowed_clock_drift,
            clock_drift,
            key_fetch_timeout,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn discovery_uri(&self) -> &str {
        &self.discovery_uri
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    pub fn required_audience(&self) -> Option<&str> {
        self.required_audience.as_deref()
    }

    pub fn required_token_type(&self) -> Option<&str> {
        self.required_token_type.as_deref()
    }

    pub fn allowed_clock_drift(&self) -> Duration {
        self.allowed_clock_drift
    }

    pub fn key_fetch_timeout(&self) -> Duration {
        self.key_fetch_timeout
    }

    /// Type gate, applied before any key is resolved
    pub fn check_token_type(&self, header: &UnverifiedHeader) -> Result<(), ValidationError> {
        let Some(required) = &self.required_token_type else {
            return Ok(());
        };
        let received = header
            .token_type
            .as_deref()
            .ok_or(ValidationError::MissingTokenType)?;
        if received != required {
            return Err(ValidationError::TokenTypeMismatch {
                required: required.clone(),
                received: received.to_string(),
            });
        }
        Ok(())
    }

    /// Expiration, issuer and audience checks on a verified claim set
    pub(crate) fn check_claims(
        &self,
        header: &UnverifiedHeader,
        claims: TokenClaims,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, ValidationError> {
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or_else(|| {
            ValidationError::MalformedToken(format!("exp {} out of range", claims.exp))
        })?;
        // drift only ever extends validity
        let expired = expires_at
            .checked_add_signed(self.clock_drift)
            .is_some_and(|deadline| deadline < now);
        if expired {
            return Err(ValidationError::TokenExpired(expires_at));
        }

        let issuer = claims.iss.unwrap_or_default();
        if issuer != self.issuer {
            return Err(ValidationError::IssuerMismatch {
                expected: self.issuer.clone(),
                received: issuer,
            });
        }

        let audience = claims.aud.map(|aud| aud.into_vec()).unwrap_or_default();
        if let Some(required) = &self.required_audience {
            if !audience.iter().any(|aud| aud == required) {
                return Err(ValidationError::AudienceMismatch {
                    required: required.clone(),
                    received: audience,
                });
            }
        }

        Ok(ValidatedToken {
            key_id: header.key_id.clone(),
            token_type: header.token_type.clone(),
            issuer,
            subject: claims.sub,
            audience,
            expires_at,
            issued_at: claims.iat.and_then(|iat| DateTime::from_timestamp(iat, 0)),
            extra: claims.extra,
        })
    }
}
