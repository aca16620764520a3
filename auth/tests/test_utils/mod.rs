#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oidc_auth::config::OidcConfig;
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use std::sync::OnceLock;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const AUDIENCE: &str = "test-audience";
pub const JWKS_PATH: &str = "/jwks";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Test key pair for signing tokens, published under `kid`
pub struct TestKeyPair {
    pub kid: String,
    pub encoding_key: EncodingKey,
    /// Public half as a JWK
    pub jwk: Value,
}

impl TestKeyPair {
    /// Generate a new RSA key pair for testing
    pub fn generate(kid: &str) -> Self {
        let mut rng = rand::thread_rng();
        let private_key =
            RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate RSA private key");
        let private_pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("failed to encode private key as PEM");
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .expect("failed to create encoding key");

        let public_key = private_key.to_public_key();
        let jwk = json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });

        Self {
            kid: kid.to_string(),
            encoding_key,
            jwk,
        }
    }

    /// Sign `claims` with a header naming this key and the given `typ`
    pub fn sign_with_type(&self, claims: &Value, token_type: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        header.typ = token_type.map(String::from);
        encode(&header, claims, &self.encoding_key).expect("failed to encode token")
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_type(claims, Some("JWT"))
    }
}

/// Two independent keys, generated once per test binary
pub fn rotation_keys() -> &'static (TestKeyPair, TestKeyPair) {
    static KEYS: OnceLock<(TestKeyPair, TestKeyPair)> = OnceLock::new();
    KEYS.get_or_init(|| (TestKeyPair::generate("k1"), TestKeyPair::generate("k2")))
}

/// Claims for `issuer` expiring `expires_in_secs` from now
pub fn claims(issuer: &str, expires_in_secs: i64) -> Value {
    let now = Utc::now();
    json!({
        "iss": issuer,
        "sub": "user123",
        "aud": AUDIENCE,
        "email": "user@example.com",
        "exp": (now + Duration::seconds(expires_in_secs)).timestamp(),
        "iat": now.timestamp(),
    })
}

pub fn jwks(keys: &[&TestKeyPair]) -> Value {
    json!({ "keys": keys.iter().map(|key| key.jwk.clone()).collect::<Vec<_>>() })
}

/// Mock identity provider serving discovery and a JWKS endpoint
pub struct MockIssuer {
    pub server: MockServer,
}

impl MockIssuer {
    pub async fn start(keys: &[&TestKeyPair]) -> Self {
        let issuer = Self {
            server: MockServer::start().await,
        };
        issuer.publish(keys).await;
        issuer
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    pub fn config(&self) -> OidcConfig {
        OidcConfig {
            required_audience: Some(AUDIENCE.to_string()),
            ..OidcConfig::for_issuer(self.issuer())
        }
    }

    async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": self.issuer(),
                "jwks_uri": self.jwks_uri(),
            })))
            .mount(&self.server)
            .await;
    }

    async fn publish(&self, keys: &[&TestKeyPair]) {
        self.mount_discovery().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks(keys)))
            .mount(&self.server)
            .await;
    }

    /// Replace the published key set; recorded requests are cleared
    pub async fn rotate(&self, keys: &[&TestKeyPair]) {
        self.server.reset().await;
        self.publish(keys).await;
    }

    /// Make the JWKS endpoint fail; recorded requests are cleared
    pub async fn break_jwks(&self) {
        self.server.reset().await;
        self.mount_discovery().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
    }

    /// Number of JWKS fetches since start or the last reset
    pub async fn jwks_fetches(&self) -> usize {
        self.server
            .received_requests()
            .await
            .expect("request recording enabled")
            .iter()
            .filter(|request| request.url.path() == JWKS_PATH)
            .count()
    }
}
