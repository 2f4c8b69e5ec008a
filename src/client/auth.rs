//! Session operations against the authentication service.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use url::Url;

use super::{
    gateway::{ForgeryToken, RequestGateway, prepare},
    refresh::{RefreshEndpoint, TokenRefreshCoordinator},
    transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport, TransportError},
    types::{
        ForgeryTokenResponse, LoginResponse, Role, SessionResponse, SessionUser, UserId,
        VerifyResponse, decode,
    },
};
use crate::{
    forgery::FORGERY_TOKEN_PATH,
    gate::{HOME_PATH, LOGIN_PATH},
};

/// Paths of the authentication service's endpoints.
#[derive(Clone, Debug)]
pub struct AuthEndpoints {
    pub refresh: String,
    pub session: String,
    pub login: String,
    pub verify_second_factor: String,
    pub logout: String,
    pub logout_all: String,
    pub forgery_token: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            refresh: "/api/auth/refresh".to_string(),
            session: "/api/auth/me".to_string(),
            login: "/api/auth/login".to_string(),
            verify_second_factor: "/api/auth/verify-2fa".to_string(),
            logout: "/api/auth/logout".to_string(),
            logout_all: "/api/auth/logout-all".to_string(),
            forgery_token: FORGERY_TOKEN_PATH.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    /// Per-request timeout. `None` leaves the transport's defaults in place.
    pub timeout: Option<Duration>,
    pub endpoints: AuthEndpoints,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: None,
            endpoints: AuthEndpoints::default(),
        }
    }
}

/// Result of a role check performed during page setup.
#[derive(Clone, Debug, PartialEq)]
pub enum RoleCheck {
    Granted(SessionUser),
    Redirect(String),
}

pub type Gateway<T> = RequestGateway<T, RefreshEndpoint<T>>;

pub struct SessionClient<T: Transport> {
    transport: Arc<T>,
    gateway: Gateway<T>,
    forgery: ForgeryToken,
    endpoints: AuthEndpoints,
}

impl SessionClient<ReqwestTransport> {
    pub fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.base_url, config.timeout)?;
        Ok(Self::with_transport(transport, config.endpoints))
    }
}

impl<T: Transport> SessionClient<T> {
    pub fn with_transport(transport: T, endpoints: AuthEndpoints) -> Self {
        let transport = Arc::new(transport);
        let forgery = ForgeryToken::default();
        let refresher =
            RefreshEndpoint::new(Arc::clone(&transport), endpoints.refresh.clone(), forgery.clone());
        let gateway = RequestGateway::new(
            Arc::clone(&transport),
            TokenRefreshCoordinator::new(refresher),
            forgery.clone(),
        );

        Self {
            transport,
            gateway,
            forgery,
            endpoints,
        }
    }

    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    pub fn forgery_token(&self) -> Option<String> {
        self.forgery.get()
    }

    /// Authenticated API call through the gateway.
    pub async fn fetch(&self, request: ApiRequest) -> ApiResponse {
        self.gateway.fetch(request).await
    }

    /// Fetch a forgery token and remember it for later mutating calls.
    pub async fn fetch_forgery_token(&self) -> Option<String> {
        let response = self
            .send_direct(ApiRequest::get(self.endpoints.forgery_token.as_str()))
            .await;

        match response.json::<ForgeryTokenResponse>() {
            Ok(body) if response.is_success_status() => {
                self.forgery.set(body.csrf_token.as_str());
                Some(body.csrf_token)
            }
            _ => {
                warn!(status = response.status, "Could not obtain forgery token");
                None
            }
        }
    }

    /// Submit primary credentials. Not retried: a 401 here is a wrong password, not an expiry.
    pub async fn login(&self, email: &str, password: &str) -> LoginResponse {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .send_direct(ApiRequest::post(self.endpoints.login.as_str()).json(&body))
            .await;
        let login: LoginResponse = decode(&response);

        debug!(
            success = login.success,
            requires_two_factor = login.requires_two_factor,
            "Login response"
        );
        login
    }

    pub async fn verify_second_factor(&self, user_id: &UserId, code: &str) -> VerifyResponse {
        let body = serde_json::json!({ "userId": user_id, "code": code });
        let response = self
            .send_direct(
                ApiRequest::post(self.endpoints.verify_second_factor.as_str()).json(&body),
            )
            .await;
        let verify: VerifyResponse = decode(&response);

        debug!(%user_id, success = verify.success, "Second factor response");
        verify
    }

    /// Introspect the current session.
    pub async fn session(&self) -> SessionResponse {
        let response = self
            .fetch(ApiRequest::get(self.endpoints.session.as_str()))
            .await;
        decode(&response)
    }

    /// Second, role-aware check for admin-only surfaces.
    pub async fn require_role(&self, role: Role) -> RoleCheck {
        let session = self.session().await;

        match session.user {
            Some(user) if session.success && user.role == Some(role) => RoleCheck::Granted(user),
            Some(user) if session.success => {
                debug!(required = role.as_str(), actual = ?user.role, "Role mismatch");
                RoleCheck::Redirect(HOME_PATH.to_string())
            }
            _ => RoleCheck::Redirect(LOGIN_PATH.to_string()),
        }
    }

    pub async fn logout(&self) -> ApiResponse {
        let response = self
            .fetch(ApiRequest::post(self.endpoints.logout.as_str()))
            .await;
        self.forgery.clear();
        info!(status = response.status, "Logged out");
        response
    }

    /// End every session of the current user.
    pub async fn logout_all(&self) -> ApiResponse {
        let response = self
            .fetch(ApiRequest::post(self.endpoints.logout_all.as_str()))
            .await;
        self.forgery.clear();
        info!(status = response.status, "Logged out everywhere");
        response
    }

    async fn send_direct(&self, request: ApiRequest) -> ApiResponse {
        let request = prepare(request, &self.forgery);
        let path = request.path.clone();

        match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%path, error = %e, "API call failed");
                ApiResponse::connection_error()
            }
        }
    }
}
