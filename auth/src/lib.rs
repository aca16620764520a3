//! OpenID Connect bearer token validation
//!
//! This crate validates bearer tokens issued by an OpenID Connect provider.
//! It resolves the issuer's signing keys through discovery, keeps them in a
//! rotation-aware cache and checks every token against the issuer policy:
//!
//! - **Discovery**: `jwks_uri` is read from the issuer's `/.well-known/openid-configuration`
//! - **Key cache**: an unknown `kid` triggers one bounded refresh of the key set
//! - **Token lookup**: tokens are taken from headers, query strings, path
//!   parameters, cookies or form fields, in configured order
//! - **Axum middleware**: rejected requests answer 400 or 401, accepted tokens
//!   are exposed to handlers through request extensions
//!
//! # Example
//!
//! ```rust,no_run
//! use oidc_auth::config::OidcConfig;
//! use oidc_auth::types::{HttpRequestParts, RequestParts};
//! use oidc_auth::validator::OidcValidator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OidcConfig {
//!     required_audience: Some("my-api".to_string()),
//!     ..OidcConfig::for_issuer("https://accounts.google.com")
//! };
//! let validator = OidcValidator::new(config).await?;
//!
//! let mut headers = http::HeaderMap::new();
//! headers.insert(http::header::AUTHORIZATION, "Bearer id_token_here".parse()?);
//! let parts = HttpRequestParts {
//!     headers,
//!     method: http::Method::GET,
//!     uri: "/api/endpoint".parse()?,
//!     ..Default::default()
//! };
//!
//! let token = validator.validate_request(&parts as &dyn RequestParts).await?;
//! println!("Authenticated: {:?}", token.subject);
//! # Ok(())
//! # }
//! ```

/// Request views consumed by the token extractors
pub mod types;

/// Error taxonomy of configuration and validation
pub mod error;

/// Validator configuration
pub mod config;

/// OpenID Connect discovery
pub mod discovery;

/// Rotation-aware JWKS cache
pub mod jwks;

/// Token lookup chain
pub mod extractor;

/// Unverified JWS header parsing
pub mod jws;

/// Token claims
pub mod claims;

/// Per-issuer validation rules
pub mod policy;

/// Token validation state machine
pub mod validator;

/// Axum middleware for HTTP authentication
pub mod axum;
