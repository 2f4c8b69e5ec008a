//! Double-submit forgery protection for state-changing requests.
//!
//! A token is minted by [`issue_forgery_token`], delivered once as an HTTP-only cookie and
//! once in the JSON body. Callers echo it in the `x-csrf-token` header on every mutating
//! request; [`forgery_guard`] compares the header against the cookie.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::cookie::{FORGERY_COOKIE_NAME, get_cookie, strict_cookie};

/// Request header carrying the caller's copy of the forgery token.
pub const FORGERY_HEADER: &str = "x-csrf-token";

/// Route serving fresh forgery tokens.
pub const FORGERY_TOKEN_PATH: &str = "/api/csrf-token";

/// Mutating endpoints that run before a caller can hold a token.
pub const DEFAULT_EXEMPT_PATHS: &[&str] = &[
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/verify-2fa",
];

/// Random bytes per token (encoded as 43 base64url characters).
const TOKEN_BYTES: usize = 32;

/// What the guard does with a request that fails the comparison.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForgeryPolicy {
    /// Reject with 403.
    #[default]
    Enforce,
    /// Log and let the request through. Matches the legacy storefront behaviour,
    /// which never rejected on mismatch.
    Observe,
}

/// Outcome of comparing a request's header token with its cookie token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForgeryCheck {
    /// Read-only method or exempt path; no comparison made.
    Exempt,
    Matched,
    MissingHeader,
    MissingCookie,
    Mismatch,
}

impl ForgeryCheck {
    pub fn passed(self) -> bool {
        matches!(self, ForgeryCheck::Exempt | ForgeryCheck::Matched)
    }

    fn reason(self) -> &'static str {
        match self {
            ForgeryCheck::Exempt => "exempt",
            ForgeryCheck::Matched => "matched",
            ForgeryCheck::MissingHeader => "missing header token",
            ForgeryCheck::MissingCookie => "missing cookie token",
            ForgeryCheck::Mismatch => "token mismatch",
        }
    }
}

/// True for methods that can change server state.
pub fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Mint a new random forgery token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Forgery check configuration shared by the middleware.
#[derive(Clone, Debug)]
pub struct ForgeryGuard {
    policy: ForgeryPolicy,
    exempt: Vec<String>,
}

impl ForgeryGuard {
    pub fn new(policy: ForgeryPolicy) -> Self {
        Self {
            policy,
            exempt: DEFAULT_EXEMPT_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Replace the list of exempt paths.
    pub fn with_exempt_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.exempt = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn policy(&self) -> ForgeryPolicy {
        self.policy
    }

    /// Compare header and cookie tokens for a request.
    pub fn inspect(&self, method: &Method, path: &str, headers: &HeaderMap) -> ForgeryCheck {
        if !is_mutating(method) || self.exempt.iter().any(|p| p == path) {
            return ForgeryCheck::Exempt;
        }

        let Some(header_token) = headers
            .get(FORGERY_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        else {
            return ForgeryCheck::MissingHeader;
        };
        let Some(cookie_token) = get_cookie(headers, FORGERY_COOKIE_NAME).filter(|v| !v.is_empty())
        else {
            return ForgeryCheck::MissingCookie;
        };

        if bool::from(header_token.as_bytes().ct_eq(cookie_token.as_bytes())) {
            ForgeryCheck::Matched
        } else {
            ForgeryCheck::Mismatch
        }
    }
}

/// Rejection returned for a failed check under [`ForgeryPolicy::Enforce`].
#[derive(Debug)]
pub struct ForgeryRejection(pub ForgeryCheck);

#[derive(Serialize)]
struct FailureBody {
    success: bool,
    message: &'static str,
}

impl IntoResponse for ForgeryRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(FailureBody {
                success: false,
                message: "Invalid CSRF token",
            }),
        )
            .into_response()
    }
}

/// Middleware enforcing the double-submit check on mutating requests.
pub async fn forgery_guard(
    State(guard): State<Arc<ForgeryGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let check = guard.inspect(request.method(), request.uri().path(), request.headers());
    if check.passed() {
        return next.run(request).await;
    }

    match guard.policy {
        ForgeryPolicy::Enforce => {
            warn!(
                method = %request.method(),
                path = request.uri().path(),
                reason = check.reason(),
                "Rejected request failing forgery check"
            );
            ForgeryRejection(check).into_response()
        }
        ForgeryPolicy::Observe => {
            warn!(
                method = %request.method(),
                path = request.uri().path(),
                reason = check.reason(),
                "Forgery check failed, allowing request (observe mode)"
            );
            next.run(request).await
        }
    }
}

/// State for the token issuance route.
#[derive(Clone, Copy, Debug)]
pub struct ForgeryIssuer {
    pub secure_cookies: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    success: bool,
    csrf_token: String,
}

/// Issue a fresh token: set it as a cookie and return it in the body.
pub async fn issue_forgery_token(State(issuer): State<ForgeryIssuer>) -> impl IntoResponse {
    let token = generate_token();
    let cookie = strict_cookie(FORGERY_COOKIE_NAME, &token, issuer.secure_cookies);
    debug!("Issued forgery token");

    (
        [(SET_COOKIE, cookie)],
        Json(TokenResponse {
            success: true,
            csrf_token: token,
        }),
    )
}
