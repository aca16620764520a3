//! Error types for token validation and validator construction
//!
//! Per-request failures are [`ValidationError`]s; failures while building a
//! validator are [`ConfigError`]s and keep the validator from ever becoming ready.

use chrono::{DateTime, Utc};
use http::StatusCode;
use std::time::Duration;

/// Failure talking to the discovery or key-publication endpoint
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport-level failure (connection, TLS, body read)
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The configured fetch timeout elapsed
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    /// The endpoint answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    /// The body was not the expected JSON document
    #[error("invalid document from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    /// The discovery document did not name a key-publication endpoint
    #[error("discovery document at {url} has an empty jwks_uri")]
    EmptyJwksUri { url: String },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, timeout: Duration, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Stable classification of a [`ValidationError`], for logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No configured source yielded a token
    TokenMissing,
    /// The token or its header could not be parsed
    MalformedToken,
    /// More than one signature block
    AmbiguousSignature,
    /// No `kid` in the protected header
    MissingKeyId,
    /// No `typ` while a token type is required
    MissingTokenType,
    /// `typ` differs from the required type
    TokenTypeMismatch,
    /// `kid` unknown even after a refresh
    KeyNotFound,
    /// The key set could not be refreshed
    FetchFailed,
    /// Signature verification failed
    InvalidSignature,
    /// `exp` plus drift lies in the past
    TokenExpired,
    /// `iss` differs from the configured issuer
    IssuerMismatch,
    /// Required audience absent from `aud`
    AudienceMismatch,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TokenMissing => "token_missing",
            ErrorKind::MalformedToken => "malformed_token",
            ErrorKind::AmbiguousSignature => "ambiguous_signature",
            ErrorKind::MissingKeyId => "missing_key_id",
            ErrorKind::MissingTokenType => "missing_token_type",
            ErrorKind::TokenTypeMismatch => "token_type_mismatch",
            ErrorKind::KeyNotFound => "key_not_found",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::InvalidSignature => "invalid_signature",
            ErrorKind::TokenExpired => "token_expired",
            ErrorKind::IssuerMismatch => "issuer_mismatch",
            ErrorKind::AudienceMismatch => "audience_mismatch",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was rejected
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// No configured source yielded a token
    #[error("missing or malformed jwt")]
    TokenMissing,
    /// The token or its protected header could not be parsed
    #[error("malformed token: {0}")]
    MalformedToken(String),
    /// The token carries more than one signature block
    #[error("token carries {0} signatures, exactly one is supported")]
    AmbiguousSignature(usize),
    /// The protected header does not name its key
    #[error("token header does not contain key id (kid)")]
    MissingKeyId,
    /// A token type is required but the header declares none
    #[error("token header does not contain type (typ)")]
    MissingTokenType,
    /// The declared token type is not the required one
    #[error("token type {required:?} required, but received {received:?}")]
    TokenTypeMismatch { required: String, received: String },
    /// The key id is unknown even after refreshing the key set
    #[error("unable to find key {0:?}")]
    KeyNotFound(String),
    /// Refreshing the key set failed, the previous set is kept
    #[error("unable to fetch signing keys: {0}")]
    FetchFailed(#[from] FetchError),
    /// The signature does not verify against the resolved key
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    /// `exp` plus the allowed clock drift lies in the past
    #[error("token has expired: {0}")]
    TokenExpired(DateTime<Utc>),
    /// `iss` is not exactly the configured issuer
    #[error("required issuer {expected:?} was not found, received {received:?}")]
    IssuerMismatch { expected: String, received: String },
    /// The required audience is not among the `aud` values
    #[error("required audience {required:?} was not found, received {received:?}")]
    AudienceMismatch {
        required: String,
        received: Vec<String>,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::TokenMissing => ErrorKind::TokenMissing,
            ValidationError::MalformedToken(_) => ErrorKind::MalformedToken,
            ValidationError::AmbiguousSignature(_) => ErrorKind::AmbiguousSignature,
            ValidationError::MissingKeyId => ErrorKind::MissingKeyId,
            ValidationError::MissingTokenType => ErrorKind::MissingTokenType,
            ValidationError::TokenTypeMismatch { .. } => ErrorKind::TokenTypeMismatch,
            ValidationError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            ValidationError::FetchFailed(_) => ErrorKind::FetchFailed,
            ValidationError::InvalidSignature(_) => ErrorKind::InvalidSignature,
            ValidationError::TokenExpired(_) => ErrorKind::TokenExpired,
            ValidationError::IssuerMismatch { .. } => ErrorKind::IssuerMismatch,
            ValidationError::AudienceMismatch { .. } => ErrorKind::AudienceMismatch,
        }
    }

    /// Whether the request itself was unusable, as opposed to carrying a bad credential
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TokenMissing | ErrorKind::MalformedToken
        )
    }

    /// HTTP status a framework should answer with
    pub fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::UNAUTHORIZED
        }
    }
}

/// Failure while building a validator
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No issuer configured
    #[error("oidc validation requires an issuer")]
    MissingIssuer,
    /// A configured or discovered URL does not parse
    #[error("invalid {field} {value:?}: {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    /// A lookup entry is not of the form `<source>:<name>`
    #[error("invalid token lookup entry {0:?}, expected <source>:<name>")]
    InvalidTokenLookup(String),
    /// A lookup entry names a source that does not exist
    #[error("unknown token source {0:?}, expected one of header, query, param, cookie, form")]
    UnknownTokenSource(String),
    /// A duration is zero or out of range
    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration {
        field: &'static str,
        value: Duration,
    },
    /// The HTTP client could not be built
    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// The discovery document could not be fetched or read
    #[error("unable to fetch jwks_uri from discovery document: {0}")]
    Discovery(#[source] FetchError),
    /// The initial key set could not be fetched
    #[error("unable to fetch initial key set: {0}")]
    KeyFetch(#[source] FetchError),
    /// The configuration environment variable is not set
    #[error("{0} environment variable not set")]
    MissingEnvironment(&'static str),
    /// The configuration environment variable is not valid JSON
    #[error("failed to parse {name}: {source}")]
    InvalidEnvironment {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
