//! Per-request middleware.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) unless the client sent one
//! - Echo the ID back on the response
//! - Open a tracing span per request, verbose in debug mode
//! - Bound request handling time
//!
//! # Design Decisions
//! - Request ID added as the outermost layer so every span carries it
//! - Handler timeouts answer 408 instead of holding connections open during shutdown

use std::time::Duration;

use axum::http::{HeaderName, Request};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::{HttpConfig, RunMode};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Read the request ID assigned by [`apply_layers`].
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
    }
}

/// Wrap a fully routed app in the standard middleware stack.
#[allow(deprecated)]
pub fn apply_layers(router: Router, config: &HttpConfig) -> Router {
    let (level, headers) = match config.mode {
        RunMode::Debug => (Level::INFO, true),
        RunMode::Release => (Level::DEBUG, false),
    };

    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(level).include_headers(headers))
        .on_response(DefaultOnResponse::new().level(level));

    router
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn echo_id(request: Request<Body>) -> String {
        request.request_id().unwrap_or("none").to_string()
    }

    #[tokio::test]
    async fn generates_an_id_when_missing() {
        let app = apply_layers(Router::new().route("/", get(echo_id)), &HttpConfig::default());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&header).is_ok());
    }

    #[tokio::test]
    async fn keeps_the_client_id() {
        let app = apply_layers(Router::new().route("/", get(echo_id)), &HttpConfig::default());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "abc-123");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"abc-123");
    }
}
