//! Token extraction from inbound requests
//!
//! A [`TokenLookup`] is compiled once from a declarative list such as
//! `header:Authorization,query:token` and tried in order at request time.

use crate::config::DEFAULT_AUTH_SCHEME;
use crate::error::{ConfigError, ValidationError};
use crate::types::RequestParts;
use cookie::Cookie;
use http::HeaderName;
use http::header::COOKIE;
use log::debug;

/// One place a token may be carried in a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// `<name>: <scheme> <token>`
    Header { name: HeaderName, scheme: String },
    /// `?<name>=<token>`
    Query(String),
    /// Matched route parameter `<name>`
    Param(String),
    /// Cookie `<name>`
    Cookie(String),
    /// Urlencoded body field `<name>`
    Form(String),
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn from_header(parts: &dyn RequestParts, name: &HeaderName, scheme: &str) -> Option<String> {
    let value = parts.headers().get(name)?.to_str().ok()?;
    let (prefix, rest) = value.split_at_checked(scheme.len())?;
    if !prefix.eq_ignore_ascii_case(scheme) {
        return None;
    }
    non_empty(rest.strip_prefix(' ')?.trim())
}

fn from_query(parts: &dyn RequestParts, name: &str) -> Option<String> {
    let query = parts.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| non_empty(&value))
}

fn from_cookie(parts: &dyn RequestParts, name: &str) -> Option<String> {
    parts
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .and_then(|cookie| non_empty(cookie.value()))
}

impl TokenSource {
    /// Compile one `<source>:<name>` entry
    pub fn parse(entry: &str, auth_scheme: &str) -> Result<Self, ConfigError> {
        let (source, name) = entry
            .split_once(':')
            .map(|(source, name)| (source.trim(), name.trim()))
            .filter(|(_, name)| !name.is_empty())
            .ok_or_else(|| ConfigError::InvalidTokenLookup(entry.to_string()))?;

        match source {
            "header" => {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ConfigError::InvalidTokenLookup(entry.to_string()))?;
                let scheme = match auth_scheme.trim() {
                    "" => DEFAULT_AUTH_SCHEME,
                    scheme => scheme,
                };
                Ok(TokenSource::Header {
                    name,
                    scheme: scheme.to_string(),
                })
            }
            "query" => Ok(TokenSource::Query(name.to_string())),
            "param" => Ok(TokenSource::Param(name.to_string())),
            "cookie" => Ok(TokenSource::Cookie(name.to_string())),
            "form" => Ok(TokenSource::Form(name.to_string())),
            other => Err(ConfigError::UnknownTokenSource(other.to_string())),
        }
    }

    /// The raw token carried by this source, if any
    pub fn extract(&self, parts: &dyn RequestParts) -> Option<String> {
        match self {
            TokenSource::Header { name, scheme } => from_header(parts, name, scheme),
            TokenSource::Query(name) => from_query(parts, name),
            TokenSource::Param(name) => parts.path_param(name).and_then(non_empty),
            TokenSource::Cookie(name) => from_cookie(parts, name),
            TokenSource::Form(name) => parts.form_field(name).and_then(non_empty),
        }
    }
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Header { name, .. } => write!(f, "header:{name}"),
            TokenSource::Query(name) => write!(f, "query:{name}"),
            TokenSource::Param(name) => write!(f, "param:{name}"),
            TokenSource::Cookie(name) => write!(f, "cookie:{name}"),
            TokenSource::Form(name) => write!(f, "form:{name}"),
        }
    }
}

/// Ordered token sources, the first one carrying a token wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLookup {
    sources: Vec<TokenSource>,
}

impl TokenLookup {
    /// Compile a comma separated `<source>:<name>` list
    pub fn parse(lookup: &str, auth_scheme: &str) -> Result<Self, ConfigError> {
        let sources = lookup
            .split(',')
            .map(|entry| TokenSource::parse(entry, auth_scheme))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[TokenSource] {
        &self.sources
    }

    /// Whether a request body has to be read to run this lookup
    pub fn needs_form(&self) -> bool {
        self.sources
            .iter()
            .any(|source| matches!(source, TokenSource::Form(_)))
    }

    /// Token carried by the sources ahead of the first form source
    ///
    /// A hit here makes reading the request body unnecessary.
    pub fn extract_before_form(&self, parts: &dyn RequestParts) -> Option<String> {
        self.sources
            .iter()
            .take_while(|source| !matches!(source, TokenSource::Form(_)))
            .find_map(|source| source.extract(parts))
    }

    pub fn extract(&self, parts: &dyn RequestParts) -> Result<String, ValidationError> {
        for source in &self.sources {
            if let Some(token) = source.extract(parts) {
                debug!("token found in {source}");
                return Ok(token);
            }
        }
        Err(ValidationError::TokenMissing)
    }
}
