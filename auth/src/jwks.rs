//! Signing keys of one issuer, fetched from its JWKS endpoint
//!
//! The current [`KeySet`] is shared by every in-flight validation. Lookups take
//! a read lock just long enough to clone an `Arc`; a refresh fetches the new
//! set without holding any lock and only takes the write lock to swap it in,
//! so readers never see a partially updated set.

use crate::discovery::fetch_bytes;
use crate::error::{FetchError, ValidationError};
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use log::{debug, info, warn};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Number of refreshes a single cache miss may trigger before giving up
pub const MAX_REFRESH_ATTEMPTS: usize = 1;

/// Signature algorithm pinned by a JWK `alg`; encryption algorithms pin nothing
fn signature_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        KeyAlgorithm::RSA1_5
        | KeyAlgorithm::RSA_OAEP
        | KeyAlgorithm::RSA_OAEP_256
        | KeyAlgorithm::UNKNOWN_ALGORITHM => None,
    }
}

/// A verification key published by the issuer
#[derive(Clone)]
pub struct PublicKey {
    kid: String,
    algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl PublicKey {
    /// Build a verification key from a JWK
    ///
    /// Returns `Ok(None)` for keys that can never verify a token: keys without
    /// a `kid` and keys reserved for encryption.
    pub fn from_jwk(jwk: &Jwk) -> Result<Option<Self>, jsonwebtoken::errors::Error> {
        let Some(kid) = jwk.common.key_id.as_deref().filter(|kid| !kid.is_empty()) else {
            return Ok(None);
        };
        if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
            return Ok(None);
        }
        let algorithm = jwk.common.key_algorithm.and_then(signature_algorithm);
        let decoding_key = DecodingKey::from_jwk(jwk)?;
        Ok(Some(Self {
            kid: kid.to_string(),
            algorithm,
            decoding_key,
        }))
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm pinned by the JWK `alg` member, if any
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

/// Ordered set of verification keys, replaced wholesale on refresh
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<Arc<PublicKey>>,
}

impl KeySet {
    /// Keep every usable signing key of a JWKS document, in document order
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut keys = Vec::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            match PublicKey::from_jwk(jwk) {
                Ok(Some(key)) => keys.push(Arc::new(key)),
                Ok(None) => debug!("skipping jwk kid={:?}", jwk.common.key_id),
                Err(e) => warn!("skipping unusable jwk kid={:?}: {e}", jwk.common.key_id),
            }
        }
        Self { keys }
    }

    /// First key carrying `kid`
    pub fn find(&self, kid: &str) -> Option<Arc<PublicKey>> {
        self.keys.iter().find(|key| key.kid == kid).cloned()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|key| key.kid.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

async fn fetch_key_set(
    client: &reqwest::Client,
    jwks_uri: &str,
    timeout: Duration,
) -> Result<KeySet, FetchError> {
    let body = fetch_bytes(client, jwks_uri, timeout).await?;
    let jwks: JwkSet = serde_json::from_slice(&body).map_err(|source| FetchError::Parse {
        url: jwks_uri.to_string(),
        source,
    })?;
    Ok(KeySet::from_jwks(&jwks))
}

/// Cached key set of one issuer
///
/// Refreshes only in reaction to a lookup miss, never on a timer. Concurrent
/// misses each trigger their own refresh: there is no single-flight coalescing,
/// so a burst of tokens signed with a freshly rotated key costs one fetch per
/// request that missed.
pub struct KeyCache {
    client: reqwest::Client,
    jwks_uri: String,
    fetch_timeout: Duration,
    current: RwLock<Arc<KeySet>>,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("jwks_uri", &self.jwks_uri)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("keys", &self.snapshot().key_ids().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyCache {
    /// Create a cache primed with the key set currently served at `jwks_uri`
    pub async fn new(
        client: reqwest::Client,
        jwks_uri: String,
        fetch_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let keys = fetch_key_set(&client, &jwks_uri, fetch_timeout).await?;
        info!("loaded {} signing keys from {jwks_uri}", keys.len());
        Ok(Self::with_keys(client, jwks_uri, fetch_timeout, keys))
    }

    /// Create a cache primed with an already known key set
    pub fn with_keys(
        client: reqwest::Client,
        jwks_uri: String,
        fetch_timeout: Duration,
        keys: KeySet,
    ) -> Self {
        Self {
            client,
            jwks_uri,
            fetch_timeout,
            current: RwLock::new(Arc::new(keys)),
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// The key set as of now; later refreshes do not affect the returned value
    pub fn snapshot(&self) -> Arc<KeySet> {
        // the guarded value is only ever replaced whole, a poisoned lock still holds a complete set
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Find the key identified by `kid`, refreshing the set once on a miss
    pub async fn resolve(&self, kid: &str) -> Result<Arc<PublicKey>, ValidationError> {
        for attempt in 0..=MAX_REFRESH_ATTEMPTS {
            if attempt > 0 {
                debug!("key {kid:?} not in cache, refreshing from {}", self.jwks_uri);
                self.refresh().await?;
            }
            if let Some(key) = self.snapshot().find(kid) {
                return Ok(key);
            }
        }
        Err(ValidationError::KeyNotFound(kid.to_string()))
    }

    /// Fetch the full key set and replace the cached one
    ///
    /// On failure the previous set stays in place.
    pub(crate) async fn refresh(&self) -> Result<(), FetchError> {
        let keys = fetch_key_set(&self.client, &self.jwks_uri, self.fetch_timeout).await?;
        info!(
            "refreshed key set from {}: {} keys",
            self.jwks_uri,
            keys.len()
        );
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(keys);
        Ok(())
    }
}
