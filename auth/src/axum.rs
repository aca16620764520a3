//! Axum middleware for OIDC bearer authentication
//!
//! Provides authentication middleware for Axum HTTP services that:
//! 1. Extracts the token from the configured request sources
//! 2. Validates it with an [`OidcValidator`]
//! 3. Stores the [`ValidatedToken`] in request extensions under the validator's context key
//! 4. Answers 400 for a missing or malformed token and 401 for any other failure

use crate::claims::ValidatedToken;
use crate::error::ValidationError;
use crate::types::{RequestParts, first_value};
use crate::validator::OidcValidator;
use axum::{
    body::Body,
    extract::{FromRequestParts, RawPathParams, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Largest urlencoded body read when a form source is configured
pub const MAX_FORM_BODY_BYTES: usize = 64 * 1024;

/// Returns true for requests that bypass authentication
pub type Skipper = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;
/// Runs before token extraction on every request that is not skipped
pub type BeforeHandler = Arc<dyn Fn(&Parts) + Send + Sync>;
/// Runs once per accepted request, before the inner service
pub type SuccessHandler = Arc<dyn Fn(&ValidatedToken, &Parts) + Send + Sync>;
/// Produces the response of a rejected request
pub type ErrorHandler = Arc<dyn Fn(ValidationError, &Parts) -> Response + Send + Sync>;

/// Tokens accepted for a request, keyed by validator context key
#[derive(Debug, Clone, Default)]
pub struct AuthenticatedTokens {
    tokens: HashMap<String, Arc<ValidatedToken>>,
}

impl AuthenticatedTokens {
    pub fn get(&self, context_key: &str) -> Option<&ValidatedToken> {
        self.tokens.get(context_key).map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn insert(&mut self, context_key: &str, token: Arc<ValidatedToken>) {
        self.tokens.insert(context_key.to_string(), token);
    }
}

/// Validator plus the hooks of the middleware
#[derive(Clone)]
pub struct OidcAuth {
    validator: Arc<OidcValidator>,
    skipper: Option<Skipper>,
    before: Option<BeforeHandler>,
    on_success: Option<SuccessHandler>,
    on_error: Option<ErrorHandler>,
}

impl std::fmt::Debug for OidcAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcAuth")
            .field("issuer", &self.validator.policy().issuer())
            .field("context_key", &self.validator.context_key())
            .finish()
    }
}

impl OidcAuth {
    pub fn new(validator: Arc<OidcValidator>) -> Self {
        Self {
            validator,
            skipper: None,
            before: None,
            on_success: None,
            on_error: None,
        }
    }

    pub fn with_skipper(mut self, skipper: impl Fn(&Parts) -> bool + Send + Sync + 'static) -> Self {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    pub fn with_before(mut self, before: impl Fn(&Parts) + Send + Sync + 'static) -> Self {
        self.before = Some(Arc::new(before));
        self
    }

    pub fn with_success_handler(
        mut self,
        on_success: impl Fn(&ValidatedToken, &Parts) + Send + Sync + 'static,
    ) -> Self {
        self.on_success = Some(Arc::new(on_success));
        self
    }

    pub fn with_error_handler(
        mut self,
        on_error: impl Fn(ValidationError, &Parts) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn validator(&self) -> &Arc<OidcValidator> {
        &self.validator
    }
}

/// Borrowed view of a routed request for the extractor chain
struct RoutedParts<'a> {
    parts: &'a Parts,
    path_params: &'a [(String, String)],
    form_fields: &'a [(String, String)],
}

impl RequestParts for RoutedParts<'_> {
    fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    fn method(&self) -> &Method {
        &self.parts.method
    }

    fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    fn path_param(&self, name: &str) -> Option<&str> {
        first_value(self.path_params, name)
    }

    fn form_field(&self, name: &str) -> Option<&str> {
        first_value(self.form_fields, name)
    }
}

fn is_urlencoded_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Buffer an urlencoded body, returning its fields and a replacement body
///
/// A body that cannot be read yields no fields and is replaced by an empty one.
async fn read_form(body: Body) -> (Vec<(String, String)>, Body) {
    match axum::body::to_bytes(body, MAX_FORM_BODY_BYTES).await {
        Ok(bytes) => {
            let fields = url::form_urlencoded::parse(&bytes).into_owned().collect();
            (fields, Body::from(bytes))
        }
        Err(e) => {
            warn!("unable to read form body: {e}");
            (Vec::new(), Body::empty())
        }
    }
}

async fn path_params(parts: &mut Parts) -> Vec<(String, String)> {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn reject(auth: &OidcAuth, error: ValidationError, parts: &Parts) -> Response {
    warn!(
        "authentication failed ({}) {} {}: {error}",
        error.kind(),
        parts.method,
        parts.uri.path()
    );
    match &auth.on_error {
        Some(on_error) => on_error(error, parts),
        None => error.into_response(),
    }
}

/// Axum middleware for OIDC bearer token authentication
///
/// Mount it with `Router::layer` so that it runs after routing and path
/// parameters are available to `param:` token sources.
///
/// # Example
///
/// ```rust,no_run
/// use axum::{Router, middleware, routing::get};
/// use oidc_auth::axum::{OidcAuth, oidc_middleware};
/// use oidc_auth::config::OidcConfig;
/// use oidc_auth::validator::OidcValidator;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), oidc_auth::error::ConfigError> {
/// let validator = OidcValidator::new(OidcConfig::for_issuer("https://accounts.google.com")).await?;
/// let auth = OidcAuth::new(Arc::new(validator));
/// let app: Router = Router::new()
///     .route("/api", get(|| async { "ok" }))
///     .layer(middleware::from_fn(move |req, next| {
///         oidc_middleware(auth.clone(), req, next)
///     }));
/// # Ok(())
/// # }
/// ```
pub async fn oidc_middleware(auth: OidcAuth, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();

    if auth.skipper.as_ref().is_some_and(|skip| skip(&parts)) {
        return next.run(Request::from_parts(parts, body)).await;
    }
    if let Some(before) = &auth.before {
        before(&parts);
    }

    let validator = auth.validator.clone();
    let lookup = validator.token_lookup();
    let path_params = path_params(&mut parts).await;

    // the body is only buffered once every source ahead of a form source missed
    let needs_body = lookup.needs_form()
        && is_urlencoded_form(&parts.headers)
        && lookup
            .extract_before_form(&RoutedParts {
                parts: &parts,
                path_params: &path_params,
                form_fields: &[],
            })
            .is_none();
    let (form_fields, body) = if needs_body {
        read_form(body).await
    } else {
        (Vec::new(), body)
    };

    let routed = RoutedParts {
        parts: &parts,
        path_params: &path_params,
        form_fields: &form_fields,
    };
    let result = validator.validate_request(&routed).await;

    match result {
        Ok(token) => {
            info!(
                "authenticated: issuer={} subject={:?} kid={}",
                token.issuer, token.subject, token.key_id
            );
            let token = Arc::new(token);
            let mut tokens = parts
                .extensions
                .remove::<AuthenticatedTokens>()
                .unwrap_or_default();
            tokens.insert(validator.context_key(), token.clone());
            parts.extensions.insert(tokens);
            if let Some(on_success) = &auth.on_success {
                on_success(&token, &parts);
            }
            next.run(Request::from_parts(parts, body)).await
        }
        Err(e) => reject(&auth, e, &parts),
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let message = if self.is_client_error() {
            "missing or malformed jwt"
        } else {
            "invalid or expired jwt"
        };
        (self.status_code(), message).into_response()
    }
}

