//! Request/response values and the HTTP transport underneath the gateway.

use std::{future::Future, time::Duration};

use reqwest::{
    Method,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

/// Message carried by the synthetic response produced when no response was received.
pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error";

/// Whether cookies travel with a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    Omit,
    Include,
}

/// An outbound API call. Cloneable so the gateway can replay it after a refresh.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// Path (and query) resolved against the transport's base URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub credentials: Credentials,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            credentials: Credentials::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Set a JSON body and content type.
    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(body.to_string().into_bytes());
        self
    }

    /// Add a header. Values that are not valid header text are dropped.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// A response-shaped value. Transport failures are represented with `status == 0`.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Synthetic response standing in for a call that never got an answer.
    pub fn connection_error() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = serde_json::json!({
            "success": false,
            "message": CONNECTION_ERROR_MESSAGE,
        });
        Self::new(0, headers, body.to_string().into_bytes())
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The body's `success` flag, falling back to the status class when absent.
    pub fn success(&self) -> bool {
        self.json::<serde_json::Value>()
            .ok()
            .and_then(|body| body.get("success").and_then(serde_json::Value::as_bool))
            .unwrap_or_else(|| self.is_success_status())
    }

    /// The body's `message` field, if any.
    pub fn message(&self) -> Option<String> {
        self.json::<serde_json::Value>().ok().and_then(|body| {
            body.get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Sends one request and returns whatever response arrived.
///
/// An `Err` means no response at all (DNS, refused connection, timeout); HTTP error
/// statuses are `Ok`.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// `reqwest` transport. Keeps a cookie jar for credentialed calls and a separate
/// cookie-less client for anonymous ones.
pub struct ReqwestTransport {
    base: Url,
    with_credentials: reqwest::Client,
    without_credentials: reqwest::Client,
}

impl ReqwestTransport {
    /// `timeout` of `None` leaves the transport's defaults in place.
    pub fn new(base: Url, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let build = |cookies: bool| {
            let mut builder = reqwest::Client::builder().cookie_store(cookies);
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }
            builder.build()
        };

        Ok(Self {
            base,
            with_credentials: build(true)?,
            without_credentials: build(false)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.base.join(&request.path)?;
        let client = match request.credentials {
            Credentials::Include => &self.with_credentials,
            Credentials::Omit => &self.without_credentials,
        };

        let mut builder = client.request(request.method, url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse::new(status, headers, body))
    }
}
