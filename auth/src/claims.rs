use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Audience can be either a string or an array of strings in OIDC tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        match self {
            Audience::Single(s) => vec![s],
            Audience::Multiple(v) => v,
        }
    }
}

/// Claim set as signed by the issuer
///
/// A missing `exp` reads as the epoch, so such tokens are always expired.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenClaims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<Audience>,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    /// Every other claim, untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A token whose signature and claims passed every check of its issuer policy
///
/// Lives for one request and is never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedToken {
    /// `kid` of the key that verified the signature
    pub key_id: String,
    /// Declared `typ` header
    pub token_type: Option<String>,
    pub issuer: String,
    pub subject: Option<String>,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    /// Claims other than `iss`, `sub`, `aud`, `exp` and `iat`
    pub extra: Map<String, Value>,
}

impl ValidatedToken {
    /// A non-registered claim, e.g. `email` or `groups`
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
