mod test_utils;

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE, header::COOKIE},
    response::IntoResponse,
};
use oidc_auth::{
    axum::{AuthenticatedTokens, OidcAuth, oidc_middleware},
    config::OidcConfig,
    error::ErrorKind,
    validator::OidcValidator,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use test_utils::*;
use tower::ServiceExt;

async fn validator(config: OidcConfig) -> Arc<OidcValidator> {
    Arc::new(
        OidcValidator::new(config)
            .await
            .expect("create validator"),
    )
}

fn app(auth: OidcAuth) -> Router {
    Router::new()
        .route(
            "/whoami",
            axum::routing::get(|req: Request| async move {
                let tokens = req
                    .extensions()
                    .get::<AuthenticatedTokens>()
                    .expect("authenticated tokens");
                tokens
                    .get("user")
                    .and_then(|token| token.subject.clone())
                    .unwrap_or_default()
            }),
        )
        .route(
            "/items/{token}",
            axum::routing::get(|| async { "item" }),
        )
        .route(
            "/submit",
            axum::routing::post(|body: String| async move { body }),
        )
        .route("/health", axum::routing::get(|| async { "healthy" }))
        .layer(axum::middleware::from_fn(move |req, next| {
            oidc_middleware(auth.clone(), req, next)
        }))
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[tokio::test]
async fn test_valid_bearer_token() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(validator(idp.config()).await);

    let request = Request::builder()
        .uri("/whoami")
        .header(
            AUTHORIZATION,
            format!("Bearer {}", k1.sign(&claims(&idp.issuer(), 3600))),
        )
        .body(Body::empty())
        .expect("build request");

    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user123");
}

#[tokio::test]
async fn test_missing_and_malformed_tokens_are_bad_requests() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(validator(idp.config()).await);

    let request = Request::builder()
        .uri("/whoami")
        .body(Body::empty())
        .expect("build request");
    let response = app(auth.clone()).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "missing or malformed jwt");

    let request = Request::builder()
        .uri("/whoami")
        .header(AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .expect("build request");
    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rejected_tokens_are_unauthorized() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(validator(idp.config()).await);

    let request = Request::builder()
        .uri("/whoami")
        .header(
            AUTHORIZATION,
            format!("Bearer {}", k1.sign(&claims(&idp.issuer(), -3600))),
        )
        .body(Body::empty())
        .expect("build request");
    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "invalid or expired jwt");
}

#[tokio::test]
async fn test_header_wins_over_query() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(
        validator(
            OidcConfig {
                token_lookup: "header:Authorization,query:token".to_string(),
                ..idp.config()
            },
        )
        .await,
    );

    // a valid header token must be used even though the query carries garbage
    let request = Request::builder()
        .uri("/whoami?token=garbage")
        .header(
            AUTHORIZATION,
            format!("Bearer {}", k1.sign(&claims(&idp.issuer(), 3600))),
        )
        .body(Body::empty())
        .expect("build request");
    let response = app(auth.clone()).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri(format!(
            "/whoami?token={}",
            k1.sign(&claims(&idp.issuer(), 3600))
        ))
        .body(Body::empty())
        .expect("build request");
    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cookie_param_and_form_sources() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(
        validator(
            OidcConfig {
                token_lookup: "cookie:session,param:token,form:access_token".to_string(),
                ..idp.config()
            },
        )
        .await,
    );
    let token = k1.sign(&claims(&idp.issuer(), 3600));

    let request = Request::builder()
        .uri("/whoami")
        .header(COOKIE, format!("theme=dark; session={token}"))
        .body(Body::empty())
        .expect("build request");
    let response = app(auth.clone()).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .uri(format!("/items/{token}"))
        .body(Body::empty())
        .expect("build request");
    let response = app(auth.clone()).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);

    let form = format!("note=hello&access_token={token}");
    let request = Request::builder()
        .method("POST")
        .uri("/submit")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.clone()))
        .expect("build request");
    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);
    // the buffered body is handed on untouched
    assert_eq!(body_text(response).await, form);
}

#[tokio::test]
async fn test_hooks() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let before = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let auth = {
        let before = before.clone();
        let successes = successes.clone();
        OidcAuth::new(validator(idp.config()).await)
            .with_skipper(|parts| parts.uri.path() == "/health")
            .with_before(move |_| {
                before.fetch_add(1, Ordering::SeqCst);
            })
            .with_success_handler(move |token, _| {
                assert_eq!(token.key_id, "k1");
                successes.fetch_add(1, Ordering::SeqCst);
            })
            .with_error_handler(|error, _| {
                (StatusCode::FORBIDDEN, error.kind().as_str()).into_response()
            })
    };

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build request");
    let response = app(auth.clone()).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(before.load(Ordering::SeqCst), 0);

    let request = Request::builder()
        .uri("/whoami")
        .header(
            AUTHORIZATION,
            format!("Bearer {}", k1.sign(&claims(&idp.issuer(), 3600))),
        )
        .body(Body::empty())
        .expect("build request");
    let response = app(auth.clone()).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 1);

    let request = Request::builder()
        .uri("/whoami")
        .body(Body::empty())
        .expect("build request");
    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, ErrorKind::TokenMissing.as_str());
    assert_eq!(before.load(Ordering::SeqCst), 2);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_custom_context_key() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(
        validator(
            OidcConfig {
                context_key: "idp_token".to_string(),
                ..idp.config()
            },
        )
        .await,
    );

    let app = Router::new()
        .route(
            "/claims",
            axum::routing::get(|req: Request| async move {
                let tokens = req
                    .extensions()
                    .get::<AuthenticatedTokens>()
                    .expect("authenticated tokens");
                assert!(tokens.get("user").is_none());
                let token = tokens.get("idp_token").expect("token under context key");
                token
                    .claim("email")
                    .and_then(|email| email.as_str())
                    .unwrap_or_default()
                    .to_string()
            }),
        )
        .layer(axum::middleware::from_fn(move |req, next| {
            oidc_middleware(auth.clone(), req, next)
        }));

    let request = Request::builder()
        .uri("/claims")
        .header(
            AUTHORIZATION,
            format!("Bearer {}", k1.sign(&claims(&idp.issuer(), 3600))),
        )
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user@example.com");
}

#[tokio::test]
async fn test_header_token_skips_form_body() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(
        validator(OidcConfig {
            token_lookup: "header:Authorization,form:access_token".to_string(),
            ..idp.config()
        })
        .await,
    );

    // larger than the form buffer limit
    let form = format!("note={}", "a".repeat(70 * 1024));
    let request = Request::builder()
        .method("POST")
        .uri("/submit")
        .header(
            AUTHORIZATION,
            format!("Bearer {}", k1.sign(&claims(&idp.issuer(), 3600))),
        )
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.clone()))
        .expect("build request");
    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, form);
}

#[tokio::test]
async fn test_unreadable_form_body_falls_through_to_later_sources() {
    let (k1, _) = rotation_keys();
    let idp = MockIssuer::start(&[k1]).await;
    let auth = OidcAuth::new(
        validator(OidcConfig {
            token_lookup: "form:access_token,query:token".to_string(),
            ..idp.config()
        })
        .await,
    );
    let oversized = format!("note={}", "a".repeat(70 * 1024));

    let request = Request::builder()
        .method("POST")
        .uri(format!(
            "/submit?token={}",
            k1.sign(&claims(&idp.issuer(), 3600))
        ))
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(oversized.clone()))
        .expect("build request");
    let response = app(auth.clone()).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder()
        .method("POST")
        .uri("/submit")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(oversized))
        .expect("build request");
    let response = app(auth).oneshot(request).await.expect("call service");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
