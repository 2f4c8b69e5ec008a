//! Wire types exchanged with the authentication service.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::transport::ApiResponse;

/// Error code marking a login refused because the e-mail address is unverified.
pub const EMAIL_NOT_VERIFIED: &str = "EMAIL_NOT_VERIFIED";

/// User identifier as sent by the service: numeric or string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(u64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        UserId::Number(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Vendor,
    User,
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Vendor => "VENDOR",
            Role::User => "USER",
            Role::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Option<UserId>,
    pub role: Option<Role>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

/// Answer to a primary credential submission.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "requires2FA")]
    pub requires_two_factor: bool,
    pub user_id: Option<UserId>,
    pub user: Option<SessionUser>,
    pub message: Option<String>,
    pub code: Option<String>,
    /// Display hint shown next to the code prompt.
    pub country: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub success: bool,
    pub user: Option<SessionUser>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SessionResponse {
    #[serde(default)]
    pub success: bool,
    pub user: Option<SessionUser>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ForgeryTokenResponse {
    pub csrf_token: String,
}

/// Response envelopes that can stand in for an undecodable body.
pub(crate) trait Envelope: DeserializeOwned {
    fn failure(message: String) -> Self;
}

impl Envelope for LoginResponse {
    fn failure(message: String) -> Self {
        Self {
            message: Some(message),
            ..Self::default()
        }
    }
}

impl Envelope for VerifyResponse {
    fn failure(message: String) -> Self {
        Self {
            message: Some(message),
            ..Self::default()
        }
    }
}

impl Envelope for SessionResponse {
    fn failure(message: String) -> Self {
        Self {
            message: Some(message),
            ..Self::default()
        }
    }
}

/// Decode a response body, mapping malformed bodies to a failure value.
pub(crate) fn decode<T: Envelope>(response: &ApiResponse) -> T {
    match response.json::<T>() {
        Ok(value) => value,
        Err(e) => {
            debug!(status = response.status, error = %e, "Undecodable response body");
            T::failure(format!("Unexpected response (status {})", response.status))
        }
    }
}
