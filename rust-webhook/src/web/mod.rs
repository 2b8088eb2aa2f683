//! Web server module for handling inbound LINE webhooks.
//!
//! This module provides:
//! - Signature verification for `X-Line-Signature`
//! - The webhook and health check handlers
//! - The application router

pub mod handlers;
pub mod signature;

use std::iter::once;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderName,
    routing::{get, post},
    Router,
};
use tower_http::{sensitive_headers::SetSensitiveRequestHeadersLayer, trace::TraceLayer};

pub use handlers::{
    health, line_webhook, process_webhook, AppState, HealthResponse, WebhookReceipt,
    WebhookRejection,
};
pub use signature::{compute_line_signature, verify_line_signature, SIGNATURE_HEADER};

/// Build the application router.
///
/// The body size is not capped; the platform decides how large a delivery is.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(line_webhook))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new(once(
            HeaderName::from_static(SIGNATURE_HEADER),
        )))
        .with_state(state)
}
