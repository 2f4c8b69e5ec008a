//! Correlation ids for every request crossing the edge.
//!
//! An inbound `x-correlation-id` header is reused as-is; otherwise a fresh UUID v4 is
//! generated. The id is stored on the request (header and `RequestId` extension) and
//! echoed on the response, including redirects and rejections produced by inner layers.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{HeaderName, HeaderValue, Request, request::Parts},
};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::{Span, info_span};
use uuid::Uuid;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Generate a new correlation id.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// `MakeRequestId` implementation producing UUID v4 correlation ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&new_correlation_id())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer assigning the correlation id when the request does not carry one.
pub fn set_correlation_layer() -> SetRequestIdLayer<MakeCorrelationId> {
    SetRequestIdLayer::new(HeaderName::from_static(CORRELATION_HEADER), MakeCorrelationId)
}

/// Layer echoing the request's correlation id on the response.
pub fn propagate_correlation_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(CORRELATION_HEADER))
}

/// Span for `TraceLayer`, tagged with the correlation id.
pub fn make_span(request: &Request<Body>) -> Span {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http-request",
        method = %request.method(),
        path = request.uri().path(),
        correlation_id
    )
}

/// Extractor for the correlation id of the current request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_extension = parts
            .extensions
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok());
        let from_header = parts
            .headers
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok());

        // Only reachable without the layers installed, e.g. in unit tests.
        let id = from_extension
            .or(from_header)
            .map(str::to_string)
            .unwrap_or_else(new_correlation_id);

        Ok(CorrelationId(id))
    }
}
