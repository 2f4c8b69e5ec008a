//! Cookie names and parsing shared by the edge layers.

use axum::http::{HeaderMap, header};

/// Cookie name for the access credential. Its presence is the gate's only session signal.
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh credential (opaque, server-managed).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name carrying the forgery token half of the double-submit pair.
pub const FORGERY_COOKIE_NAME: &str = "csrf_token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// True when the named cookie is present with a non-empty value.
pub fn has_cookie(headers: &HeaderMap, name: &str) -> bool {
    get_cookie(headers, name).is_some_and(|value| !value.is_empty())
}

/// Build a `Set-Cookie` value for an HTTP-only, strict same-site cookie scoped to `/`.
pub fn strict_cookie(name: &str, value: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{}={}; HttpOnly; SameSite=Strict; Path=/{}", name, value, secure)
}
