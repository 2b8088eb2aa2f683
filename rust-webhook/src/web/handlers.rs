//! Webhook endpoint handlers.
//!
//! The LINE endpoint:
//! 1. Verifies the `X-Line-Signature` header against the raw body
//! 2. Decodes the event batch
//! 3. Fetches message content for each event (best-effort)
//! 4. Returns 200 OK with an empty body
//!
//! Content failures are logged and reported as per-event outcomes; they
//! never change the response.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::content::{process_events, ContentFetcher, EventOutcome};
use crate::event::{decode_events, DecodeError, EventBatch};
use crate::web::signature::{verify_line_signature, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub fetcher: ContentFetcher,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let fetcher = ContentFetcher::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            fetcher,
        })
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// LINE Webhook
// =============================================================================

/// A webhook request that was authenticated and decoded.
#[derive(Debug)]
pub struct WebhookReceipt {
    pub batch: EventBatch,
    /// One outcome per event, in batch order
    pub outcomes: Vec<EventOutcome>,
}

/// Why a webhook request was refused.
#[derive(Debug, Error)]
pub enum WebhookRejection {
    #[error("can't read body")]
    UnreadableBody,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("can't parse body: {0}")]
    Undecodable(#[from] DecodeError),
}

impl WebhookRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookRejection::UnreadableBody => StatusCode::BAD_REQUEST,
            WebhookRejection::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookRejection::Undecodable(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebhookRejection {
    fn into_response(self) -> Response {
        let body = match self {
            WebhookRejection::UnreadableBody => "can't read body",
            WebhookRejection::InvalidSignature => "invalid signature",
            WebhookRejection::Undecodable(_) => "can't parse body",
        };
        (self.status(), body).into_response()
    }
}

/// Authenticate, decode and process one webhook body.
pub async fn process_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookReceipt, WebhookRejection> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_line_signature(state.config.channel_secret.as_bytes(), body, signature) {
        return Err(WebhookRejection::InvalidSignature);
    }

    let batch = decode_events(body)?;
    let outcomes = process_events(&state.fetcher, &batch.events).await;

    Ok(WebhookReceipt { batch, outcomes })
}

/// LINE webhook endpoint.
pub async fn line_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "line_webhook_body_unreadable");
            return WebhookRejection::UnreadableBody.into_response();
        }
    };

    info!(
        body_length = body.len(),
        has_signature = headers.contains_key(SIGNATURE_HEADER),
        "line_webhook_received"
    );

    match process_webhook(&state, &headers, &body).await {
        Ok(receipt) => {
            let failed = receipt.outcomes.iter().filter(|o| o.is_failure()).count();
            info!(
                event_count = receipt.batch.events.len(),
                content_failures = failed,
                "line_webhook_acknowledged"
            );
            StatusCode::OK.into_response()
        }
        Err(rejection) => {
            warn!(
                status_code = rejection.status().as_u16(),
                reason = %rejection,
                "line_webhook_rejected"
            );
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::content::ContentOutcome;
    use crate::web::router;
    use crate::web::signature::compute_line_signature;

    const SECRET: &str = "s3cret";
    const TEXT_BODY: &str =
        r#"{"events":[{"type":"message","message":{"type":"text","text":"hi"}}]}"#;

    fn test_state(content_api_base: &str, content_dir: &std::path::Path) -> AppState {
        let base = content_api_base.to_string();
        let dir = content_dir.to_string_lossy().to_string();
        let config = Config::from_lookup(move |name: &str| match name {
            "LINE_CHANNEL_SECRET" => Some(SECRET.to_string()),
            "LINE_ACCSESS_TOKEN" => Some("test-token".to_string()),
            "LINE_CONTENT_API_BASE" => Some(base.clone()),
            "CONTENT_DIR" => Some(dir.clone()),
            _ => None,
        })
        .unwrap();
        AppState::new(config).unwrap()
    }

    fn sign(body: &str) -> String {
        compute_line_signature(SECRET.as_bytes(), body.as_bytes()).unwrap()
    }

    fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/")
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("X-Line-Signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_valid_signature_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(webhook_request(TEXT_BODY, Some(&sign(TEXT_BODY))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_process_webhook_decodes_batch() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state("http://127.0.0.1:9", dir.path());

        let mut headers = HeaderMap::new();
        headers.insert("x-line-signature", sign(TEXT_BODY).parse().unwrap());

        let receipt = process_webhook(&state, &headers, TEXT_BODY.as_bytes())
            .await
            .unwrap();

        assert_eq!(receipt.batch.events.len(), 1);
        let message = receipt.batch.events[0].message.as_ref().unwrap();
        assert_eq!(message.text(), Some("hi"));
        assert_eq!(receipt.outcomes.len(), 1);
        assert!(matches!(receipt.outcomes[0].outcome, ContentOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_bogus_signature_returns_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(webhook_request(TEXT_BODY, Some("bogus")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"invalid signature");
    }

    #[tokio::test]
    async fn test_missing_signature_returns_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));

        let response = app.oneshot(webhook_request(TEXT_BODY, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_truncated_json_returns_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(webhook_request("{", Some(&sign("{"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"can't parse body");
    }

    #[tokio::test]
    async fn test_wrong_shape_returns_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));
        let body = r#"{"events":"not-an-array"}"#;

        let response = app
            .oneshot(webhook_request(body, Some(&sign(body))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_large_body_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));
        let body = format!(
            r#"{{"destination":"{}","events":[]}}"#,
            "x".repeat(3 * 1024 * 1024)
        );

        let response = app
            .oneshot(webhook_request(&body, Some(&sign(&body))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signature_checked_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(webhook_request("not json", Some("bogus")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_content_failure_still_acknowledged() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();

        let mock = server
            .mock("GET", "/v2/bot/message/325708/content")
            .match_header("authorization", "Bearer test-token")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let app = router(test_state(&server.url(), dir.path()));
        let body = r#"{"events":[
            {"type":"message","message":{"type":"image","id":"325708"}},
            {"type":"follow"}
        ]}"#;

        let response = app
            .oneshot(webhook_request(body, Some(&sign(body))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state("http://127.0.0.1:9", dir.path()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method(Method::GET)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }
}
