//! OIDC discovery: locating the key-publication endpoint of an issuer
//!
//! Runs once while a validator is being built, never per request.

use crate::error::FetchError;
use serde::Deserialize;
use std::time::Duration;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Discovery document (partial), every other field is ignored
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    jwks_uri: String,
}

/// Derive the discovery document URL of an issuer
pub fn discovery_url(issuer: &str) -> String {
    let base = issuer.strip_suffix('/').unwrap_or(issuer);
    format!("{base}{WELL_KNOWN_PATH}")
}

/// GET `url` within `timeout` and return the full body
pub(crate) async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .header(http::header::ACCEPT, "application/json")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(url, timeout, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::from_reqwest(url, timeout, e))?;
    Ok(body.to_vec())
}

/// Fetch the discovery document at `url` and return its `jwks_uri`
pub async fn fetch_jwks_uri(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let body = fetch_bytes(client, url, timeout).await?;
    let document: DiscoveryDocument =
        serde_json::from_slice(&body).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })?;

    if document.jwks_uri.trim().is_empty() {
        return Err(FetchError::EmptyJwksUri {
            url: url.to_string(),
        });
    }
    Ok(document.jwks_uri)
}
