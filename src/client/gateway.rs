//! Chokepoint for authenticated API calls.

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::header::{HeaderName, HeaderValue};
use tracing::{debug, warn};

use super::{
    refresh::{SessionRefresher, TokenRefreshCoordinator},
    transport::{ApiRequest, ApiResponse, Credentials, Transport},
};
use crate::{
    correlation::{CORRELATION_HEADER, new_correlation_id},
    forgery::{FORGERY_HEADER, is_mutating},
};

/// The most recently fetched forgery token, shared by everything sending requests.
#[derive(Clone, Debug, Default)]
pub struct ForgeryToken(Arc<RwLock<Option<String>>>);

impl ForgeryToken {
    pub fn get(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Force credentials, stamp a correlation id and attach the forgery header on mutating calls.
///
/// Headers the caller already set are left alone, so a prepared request keeps its
/// correlation id when it is sent again.
pub(crate) fn prepare(mut request: ApiRequest, forgery: &ForgeryToken) -> ApiRequest {
    request.credentials = Credentials::Include;

    if !request.headers.contains_key(CORRELATION_HEADER) {
        if let Ok(value) = HeaderValue::from_str(&new_correlation_id()) {
            request
                .headers
                .insert(HeaderName::from_static(CORRELATION_HEADER), value);
        }
    }

    if is_mutating(&request.method) && !request.headers.contains_key(FORGERY_HEADER) {
        let token = forgery
            .get()
            .and_then(|token| HeaderValue::from_str(&token).ok());
        if let Some(value) = token {
            request
                .headers
                .insert(HeaderName::from_static(FORGERY_HEADER), value);
        }
    }

    request
}

pub struct RequestGateway<T, R> {
    transport: Arc<T>,
    coordinator: TokenRefreshCoordinator<R>,
    forgery: ForgeryToken,
}

impl<T: Transport, R: SessionRefresher> RequestGateway<T, R> {
    pub fn new(
        transport: Arc<T>,
        coordinator: TokenRefreshCoordinator<R>,
        forgery: ForgeryToken,
    ) -> Self {
        Self {
            transport,
            coordinator,
            forgery,
        }
    }

    pub fn coordinator(&self) -> &TokenRefreshCoordinator<R> {
        &self.coordinator
    }

    pub fn forgery_token(&self) -> &ForgeryToken {
        &self.forgery
    }

    /// Send a request, refreshing the session and retrying once on 401.
    ///
    /// Never fails: a call that gets no response yields [`ApiResponse::connection_error`].
    pub async fn fetch(&self, request: ApiRequest) -> ApiResponse {
        let request = prepare(request, &self.forgery);

        let response = self.send(request.clone()).await;
        if !response.is_unauthorized() {
            return response;
        }

        debug!(path = %request.path, "Session expired, refreshing");
        if !self.coordinator.ensure_fresh_session().await {
            debug!(path = %request.path, "Refresh failed, returning original response");
            return response;
        }

        self.send(request).await
    }

    async fn send(&self, request: ApiRequest) -> ApiResponse {
        let method = request.method.clone();
        let path = request.path.clone();
        let correlation_id = request
            .headers
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match self.transport.send(request).await {
            Ok(response) => {
                debug!(%method, %path, %correlation_id, status = response.status, "API call");
                response
            }
            Err(e) => {
                warn!(%method, %path, %correlation_id, error = %e, "API call failed");
                ApiResponse::connection_error()
            }
        }
    }
}
