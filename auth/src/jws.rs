//! Reading a token's protected header before its signature is checked
//!
//! Nothing returned here is trusted: the header only selects the key to try
//! and drives the type gate that runs ahead of signature verification.
//! Tokens are accepted in compact serialization or as a JWS JSON document;
//! a JSON document is normalised to compact form when it holds exactly one
//! signature.

use crate::error::ValidationError;
use jsonwebtoken::{Algorithm, decode_header};
use serde::Deserialize;

/// JWS JSON serialization, general or flattened
#[derive(Debug, Deserialize)]
struct JwsJson {
    payload: String,
    protected: Option<String>,
    signature: Option<String>,
    signatures: Option<Vec<JwsJsonSignature>>,
}

#[derive(Debug, Deserialize)]
struct JwsJsonSignature {
    protected: Option<String>,
    signature: String,
}

fn compact_from_json(raw: &str) -> Result<String, ValidationError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ValidationError::MalformedToken(format!("invalid JWS JSON: {e}")))?;
    // a multi-signature document is ambiguous whatever else it holds
    if let Some(signatures) = value.get("signatures").and_then(|s| s.as_array()) {
        if signatures.len() > 1 {
            return Err(ValidationError::AmbiguousSignature(signatures.len()));
        }
    }
    let document: JwsJson = serde_json::from_value(value)
        .map_err(|e| ValidationError::MalformedToken(format!("invalid JWS JSON: {e}")))?;

    let (protected, signature) = match document.signatures {
        Some(mut signatures) => {
            let entry = signatures.pop().ok_or_else(|| {
                ValidationError::MalformedToken("JWS JSON without signatures".to_string())
            })?;
            (entry.protected, Some(entry.signature))
        }
        None => (document.protected, document.signature),
    };

    let protected = protected.ok_or_else(|| {
        ValidationError::MalformedToken("signature without protected header".to_string())
    })?;
    let signature = signature
        .ok_or_else(|| ValidationError::MalformedToken("JWS JSON without signature".to_string()))?;
    Ok(format!("{protected}.{}.{signature}", document.payload))
}

/// Protected header fields read without verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnverifiedHeader {
    pub key_id: String,
    /// `typ`, absent when missing or empty
    pub token_type: Option<String>,
    pub algorithm: Algorithm,
}

/// A single-signature token in compact form, with its unverified header
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    compact: String,
    header: UnverifiedHeader,
}

impl UnverifiedToken {
    pub fn compact(&self) -> &str {
        &self.compact
    }

    pub fn header(&self) -> &UnverifiedHeader {
        &self.header
    }
}

/// Parse the protected header of `raw`
///
/// Fails with `AmbiguousSignature` for multi-signature documents,
/// `MalformedToken` for anything unparsable and `MissingKeyId` when the
/// header does not name its key.
pub fn parse_unverified(raw: &str) -> Result<UnverifiedToken, ValidationError> {
    let raw = raw.trim();
    let compact = if raw.starts_with('{') {
        compact_from_json(raw)?
    } else {
        raw.to_string()
    };

    if compact.split('.').count() != 3 {
        return Err(ValidationError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    }

    let header = decode_header(&compact)
        .map_err(|e| ValidationError::MalformedToken(format!("invalid JWT header: {e}")))?;
    let key_id = header
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(ValidationError::MissingKeyId)?;
    let token_type = header.typ.filter(|typ| !typ.is_empty());

    Ok(UnverifiedToken {
        compact,
        header: UnverifiedHeader {
            key_id,
            token_type,
            algorithm: header.alg,
        },
    })
}
