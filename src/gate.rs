//! Edge access gate.
//!
//! Every request is classified from its path alone using an ordered prefix table, then
//! allowed or redirected based on whether the access cookie is present. No network
//! call is made and the cookie is never validated here; an expired or forged cookie
//! surfaces later as a 401 from the API.
//!
//! The gate cannot read roles, so admin-only paths are treated like protected ones.
//! Role checks happen afterwards through [`crate::client::SessionClient::require_role`].
//!
//! Paths are classified after [`normalize_request_path`] has rewritten them, and the
//! rewritten path is the one forwarded upstream.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{StatusCode, Uri, uri::PathAndQuery},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::cookie::{ACCESS_COOKIE_NAME, has_cookie};

/// Default login page.
pub const LOGIN_PATH: &str = "/login";

/// Default landing page.
pub const HOME_PATH: &str = "/";

/// Query parameter carrying the original path on a login redirect.
pub const RETURN_TO_PARAM: &str = "returnTo";

/// Access tier of a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Protected,
    AdminOnly,
    /// Login and registration pages, pointless for a signed-in user.
    AuthOnly,
}

impl RouteClass {
    fn requires_session(self) -> bool {
        matches!(self, RouteClass::Protected | RouteClass::AdminOnly)
    }
}

/// Ordered `(prefix, class)` table. The first matching prefix wins; unmatched paths are public.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    entries: Vec<(String, RouteClass)>,
}

impl RouteTable {
    /// The storefront's route classification.
    pub fn storefront() -> Self {
        let table = Self::default().with("/admin", RouteClass::AdminOnly);

        let table = [
            "/checkout",
            "/orders",
            "/account",
            "/profile",
            "/vendor",
            "/disputes",
            "/tickets",
            "/loyalty",
            "/payouts",
        ]
        .into_iter()
        .fold(table, |table, prefix| table.with(prefix, RouteClass::Protected));

        ["/login", "/register", "/forgot-password", "/reset-password"]
            .into_iter()
            .fold(table, |table, prefix| table.with(prefix, RouteClass::AuthOnly))
    }

    /// Append an entry (lower precedence than existing ones).
    pub fn with(mut self, prefix: impl Into<String>, class: RouteClass) -> Self {
        self.entries.push((prefix.into(), class));
        self
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        self.entries
            .iter()
            .find(|(prefix, _)| matches_prefix(path, prefix))
            .map(|(_, class)| *class)
            .unwrap_or(RouteClass::Public)
    }
}

/// Segment-aware prefix match: `/admin` matches `/admin` and `/admin/users`, not `/administrator`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn is_dot_segment(segment: &str, dots: usize) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded.len() == dots && decoded.bytes().all(|b| b == b'.')
}

/// Canonical form of a request path: backslashes read as `/`, empty segments collapsed,
/// `.` and `..` (plain or percent-encoded) resolved. Never climbs above the root.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing = false;

    for segment in path.split(['/', '\\']) {
        trailing = true;
        if segment.is_empty() || is_dot_segment(segment, 1) {
            continue;
        }
        if is_dot_segment(segment, 2) {
            segments.pop();
            continue;
        }
        segments.push(segment);
        trailing = false;
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    let mut normalized = format!("/{}", segments.join("/"));
    if trailing {
        normalized.push('/');
    }
    normalized
}

/// Middleware rewriting the request URI to its normalized path. Runs before the gate so
/// the path that is classified is the path that is forwarded.
pub async fn normalize_request_path(mut request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let normalized = normalize_path(path);

    if normalized != path {
        let path_and_query = match request.uri().query() {
            Some(query) => format!("{}?{}", normalized, query),
            None => normalized,
        };
        let mut parts = request.uri().clone().into_parts();
        parts.path_and_query = match path_and_query.parse::<PathAndQuery>() {
            Ok(path_and_query) => Some(path_and_query),
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        };
        match Uri::from_parts(parts) {
            Ok(uri) => {
                debug!(from = request.uri().path(), to = uri.path(), "Normalized path");
                *request.uri_mut() = uri;
            }
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        }
    }

    next.run(request).await
}

/// What to do with a navigation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Redirect(String),
}

/// Route table plus the redirect targets.
#[derive(Clone, Debug)]
pub struct AccessGate {
    routes: RouteTable,
    login_path: String,
    home_path: String,
}

impl AccessGate {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            login_path: LOGIN_PATH.to_string(),
            home_path: HOME_PATH.to_string(),
        }
    }

    pub fn with_paths(mut self, login_path: impl Into<String>, home_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self.home_path = home_path.into();
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn evaluate(&self, path: &str, has_session: bool) -> GateDecision {
        match self.routes.classify(path) {
            class if class.requires_session() && !has_session => {
                GateDecision::Redirect(self.login_redirect(path))
            }
            RouteClass::AuthOnly if has_session => GateDecision::Redirect(self.home_path.clone()),
            _ => GateDecision::Allow,
        }
    }

    fn login_redirect(&self, path: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(RETURN_TO_PARAM, path)
            .finish();
        format!("{}?{}", self.login_path, query)
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(RouteTable::storefront())
    }
}

/// Middleware applying the gate to every request.
pub async fn access_gate(
    State(gate): State<Arc<AccessGate>>,
    request: Request,
    next: Next,
) -> Response {
    let has_session = has_cookie(request.headers(), ACCESS_COOKIE_NAME);
    let decision = gate.evaluate(request.uri().path(), has_session);

    match decision {
        GateDecision::Allow => next.run(request).await,
        GateDecision::Redirect(location) => {
            debug!(path = request.uri().path(), %location, has_session, "Gate redirect");
            Redirect::temporary(&location).into_response()
        }
    }
}
