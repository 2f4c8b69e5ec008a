//! Forwarding of everything the edge does not answer itself to the storefront upstream.

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::correlation::CorrelationId;

/// Largest request body buffered for forwarding.
pub const MAX_FORWARD_BODY: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("request body too large or unreadable")]
    Body,
    #[error("upstream unavailable: {0}")]
    Upstream(#[from] reqwest::Error),
}

#[derive(Serialize)]
struct FailureBody {
    success: bool,
    message: &'static str,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ProxyError::Body => (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
            ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, "Upstream unavailable"),
        };
        (
            status,
            Json(FailureBody {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}

/// The storefront upstream. Redirects are passed back to the browser, not followed.
#[derive(Clone, Debug)]
pub struct Upstream {
    client: reqwest::Client,
    base: Url,
}

impl Upstream {
    pub fn new(base: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Upstream URL for a request. Only the path and query are taken from the request;
    /// scheme, host and port always come from the base.
    fn target(&self, uri: &Uri) -> Url {
        let mut target = self.base.clone();
        target.set_path(uri.path());
        target.set_query(uri.query());
        target
    }
}

fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy headers that may cross the proxy. Framing headers are recomputed on each side.
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| {
            !is_hop_by_hop(name) && **name != header::HOST && **name != header::CONTENT_LENGTH
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Fallback handler forwarding the request upstream.
pub async fn forward(
    State(upstream): State<Upstream>,
    CorrelationId(correlation_id): CorrelationId,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let target = upstream.target(&parts.uri);
    let body = to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|_| ProxyError::Body)?;

    let response = upstream
        .client
        .request(parts.method.clone(), target)
        .headers(forwardable(&parts.headers))
        .body(body)
        .send()
        .await
        .inspect_err(|e| {
            warn!(%correlation_id, path = parts.uri.path(), error = %e, "Upstream request failed")
        })?;

    let status = response.status();
    let headers = forwardable(response.headers());
    let bytes = response.bytes().await?;
    debug!(%correlation_id, path = parts.uri.path(), status = status.as_u16(), "Forwarded");

    let mut forwarded = Response::new(Body::from(bytes));
    *forwarded.status_mut() = status;
    *forwarded.headers_mut() = headers;
    Ok(forwarded)
}
