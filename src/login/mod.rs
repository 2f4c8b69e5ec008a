//! Primary credentials, optional second factor, then a role-based landing page.

mod code;
mod flow;
mod machine;

pub use code::{CODE_LENGTH, CodeBuffer};
pub use flow::LoginFlow;
pub use machine::{
    ADMIN_LANDING_PATH, DEFAULT_VERIFY_ERROR, LandingPaths, LoginAction, LoginMachine,
    LoginNotice, LoginState, NoticeKind, SecondFactorChallenge,
};
