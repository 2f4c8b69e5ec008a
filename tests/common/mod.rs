#![allow(dead_code)]

//! Mock authentication service and storefront upstream on an ephemeral port.

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware::{self, Next},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storefront_edge::client::{ClientConfig, ReqwestTransport, SessionClient};
use storefront_edge::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use storefront_edge::correlation::CORRELATION_HEADER;
use storefront_edge::forgery::{FORGERY_HEADER, ForgeryPolicy};
use storefront_edge::gate::RouteTable;
use storefront_edge::{ServerConfig, create_app};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

pub const PASSWORD: &str = "correct horse";
pub const USER_EMAIL: &str = "ana@example.com";
pub const ADMIN_EMAIL: &str = "root@example.com";
pub const TWO_FACTOR_EMAIL: &str = "guarded@example.com";
pub const UNVERIFIED_EMAIL: &str = "fresh@example.com";
pub const TWO_FACTOR_USER_ID: u64 = 42;
pub const TWO_FACTOR_CODE: &str = "048213";
pub const MOCK_FORGERY_TOKEN: &str = "mock-forgery-token";

/// One request as seen by the mock.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub correlation_id: Option<String>,
    pub forgery_header: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    /// Current access token generation; cookies from older generations are expired.
    generation: AtomicU64,
    user: Mutex<Option<Value>>,
    pub refresh_calls: AtomicUsize,
    pub refresh_fails: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockState {
    fn access_token(&self) -> String {
        format!("access-{}", self.generation.load(Ordering::SeqCst))
    }

    /// Invalidate every access cookie handed out so far.
    pub fn expire_sessions(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        get_cookie(headers, ACCESS_COOKIE_NAME) == Some(self.access_token().as_str())
    }

    fn sign_in(&self, user: Value) -> Response {
        *self.user.lock().unwrap() = Some(user.clone());
        let access = format!("{}={}; HttpOnly; Path=/", ACCESS_COOKIE_NAME, self.access_token());
        let refresh = format!("{}=refresh-1; HttpOnly; Path=/", REFRESH_COOKIE_NAME);

        (
            AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
            Json(json!({ "success": true, "user": user })),
        )
            .into_response()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

fn user_json(id: u64, role: &str, email: &str) -> Value {
    json!({ "id": id, "role": role, "email": email, "name": "Test" })
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

async fn record(State(state): State<Arc<MockState>>, request: Request, next: Next) -> Response {
    let recorded = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        RecordedRequest {
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            correlation_id: header(CORRELATION_HEADER),
            forgery_header: header(FORGERY_HEADER),
        }
    };
    state.requests.lock().unwrap().push(recorded);
    next.run(request).await
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    if password != PASSWORD {
        return failure(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }

    match email {
        TWO_FACTOR_EMAIL => Json(json!({
            "success": true,
            "requires2FA": true,
            "userId": TWO_FACTOR_USER_ID,
            "country": "PT",
        }))
        .into_response(),
        UNVERIFIED_EMAIL => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "message": "Please verify your email before logging in",
                "code": "EMAIL_NOT_VERIFIED",
            })),
        )
            .into_response(),
        ADMIN_EMAIL => state.sign_in(user_json(1, "ADMIN", email)),
        _ => state.sign_in(user_json(7, "USER", email)),
    }
}

async fn verify_second_factor(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> Response {
    let valid = body["userId"].as_u64() == Some(TWO_FACTOR_USER_ID)
        && body["code"].as_str() == Some(TWO_FACTOR_CODE);

    if !valid {
        return failure(StatusCode::UNAUTHORIZED, "Invalid or expired code");
    }
    state.sign_in(user_json(TWO_FACTOR_USER_ID, "USER", TWO_FACTOR_EMAIL))
}

async fn refresh(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.refresh_fails.load(Ordering::SeqCst)
        || get_cookie(&headers, REFRESH_COOKIE_NAME).is_none()
    {
        return failure(StatusCode::UNAUTHORIZED, "Refresh token invalid");
    }

    let access = format!("{}={}; HttpOnly; Path=/", ACCESS_COOKIE_NAME, state.access_token());
    (
        AppendHeaders([(SET_COOKIE, access)]),
        Json(json!({ "success": true })),
    )
        .into_response()
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "Not authenticated");
    }
    let user = state.user.lock().unwrap().clone();
    Json(json!({ "success": true, "user": user })).into_response()
}

async fn logout(State(state): State<Arc<MockState>>) -> Response {
    state.user.lock().unwrap().take();
    let cleared = [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME]
        .map(|name| (SET_COOKIE, format!("{}=; Max-Age=0; Path=/", name)));
    (AppendHeaders(cleared), Json(json!({ "success": true }))).into_response()
}

async fn forgery_token() -> Response {
    (
        AppendHeaders([(
            SET_COOKIE,
            format!("csrf_token={}; HttpOnly; SameSite=Strict; Path=/", MOCK_FORGERY_TOKEN),
        )]),
        Json(json!({ "success": true, "csrfToken": MOCK_FORGERY_TOKEN })),
    )
        .into_response()
}

async fn orders(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "Session expired");
    }
    Json(json!({ "success": true, "orders": [{ "id": 17 }] })).into_response()
}

async fn add_cart_item(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return failure(StatusCode::UNAUTHORIZED, "Session expired");
    }
    (StatusCode::CREATED, Json(json!({ "success": true }))).into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Json(json!({ "success": true })).into_response()
}

/// Upstream page handler: echoes what arrived so edge tests can inspect forwarding.
async fn echo(request: Request) -> Response {
    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": request.method().as_str(),
        "uri": request.uri().to_string(),
        "correlationId": header(CORRELATION_HEADER),
        "cookie": header("cookie"),
    }))
    .into_response()
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/auth/verify-2fa", post(verify_second_factor))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/me", get(me))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/logout-all", post(logout))
            .route("/api/csrf-token", get(forgery_token))
            .route("/api/orders", get(orders))
            .route("/api/cart/items", post(add_cart_item))
            .route("/api/slow", get(slow))
            .fallback(echo)
            .layer(middleware::from_fn_with_state(state.clone(), record))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to get local address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("Invalid URL")
    }

    pub fn client(&self) -> SessionClient<ReqwestTransport> {
        SessionClient::connect(ClientConfig::new(self.url())).expect("Failed to build client")
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    listener.local_addr().expect("Failed to get local address")
}

pub fn create_test_app(upstream: Url, forgery_policy: ForgeryPolicy, secure_cookies: bool) -> Router {
    let config = ServerConfig {
        upstream,
        secure_cookies,
        forgery_policy,
        routes: RouteTable::storefront(),
    };
    create_app(&config).expect("Failed to create app")
}

pub async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
