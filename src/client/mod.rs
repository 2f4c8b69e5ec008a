//! Client half of the session layer: keeps a session alive across access-token expiry
//! and turns every call into a response value, never an error.

mod auth;
mod gateway;
mod refresh;
mod transport;
mod types;

pub use auth::{AuthEndpoints, ClientConfig, Gateway, RoleCheck, SessionClient};
pub use gateway::{ForgeryToken, RequestGateway};
pub use refresh::{RefreshEndpoint, SessionRefresher, TokenRefreshCoordinator};
pub use transport::{
    ApiRequest, ApiResponse, CONNECTION_ERROR_MESSAGE, Credentials, ReqwestTransport, Transport,
    TransportError,
};
pub use types::{
    EMAIL_NOT_VERIFIED, LoginResponse, Role, SessionResponse, SessionUser, UserId, VerifyResponse,
};
