//! Two-step login state machine.
//!
//! The machine performs no I/O. Operations that need the network return a
//! [`LoginAction`]; the driver executes it and feeds the response back through
//! [`LoginMachine::primary_outcome`] or [`LoginMachine::verification_outcome`].

use std::{fmt, mem};

use tracing::debug;

use super::code::CodeBuffer;
use crate::{
    client::{EMAIL_NOT_VERIFIED, LoginResponse, SessionUser, UserId, VerifyResponse},
    gate::HOME_PATH,
};

/// Landing page for administrators.
pub const ADMIN_LANDING_PATH: &str = "/admin";

/// Shown when verification fails without a server message.
pub const DEFAULT_VERIFY_ERROR: &str = "Invalid verification code";

const DEFAULT_LOGIN_ERROR: &str = "Login failed";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LandingPaths {
    pub admin: String,
    pub home: String,
}

impl Default for LandingPaths {
    fn default() -> Self {
        Self {
            admin: ADMIN_LANDING_PATH.to_string(),
            home: HOME_PATH.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Error,
    /// The account exists but its e-mail address has not been verified yet.
    Unverified,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginNotice {
    pub kind: NoticeKind,
    pub message: String,
}

impl LoginNotice {
    fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    fn from_login_failure(response: &LoginResponse) -> Self {
        let message = response
            .message
            .clone()
            .unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_string());

        let lowered = message.to_lowercase();
        let unverified = response.code.as_deref() == Some(EMAIL_NOT_VERIFIED)
            || lowered.contains("not verified")
            || lowered.contains("unverified")
            || lowered.contains("verify your email");

        Self {
            kind: if unverified {
                NoticeKind::Unverified
            } else {
                NoticeKind::Error
            },
            message,
        }
    }
}

/// Pending second-factor challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondFactorChallenge {
    pub user_id: UserId,
    /// Display hint from the login response (the country shown beside the prompt).
    pub hint: Option<String>,
    pub code: CodeBuffer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    PrimarySubmitted,
    AwaitingSecondFactor(SecondFactorChallenge),
    Verifying {
        challenge: SecondFactorChallenge,
        attempt: u64,
    },
    Authenticated {
        redirect: String,
    },
    PrimaryRejected,
}

/// Network work requested by the machine.
#[derive(Clone, PartialEq, Eq)]
pub enum LoginAction {
    SubmitCredentials {
        email: String,
        password: String,
    },
    Verify {
        attempt: u64,
        user_id: UserId,
        code: String,
    },
}

impl fmt::Debug for LoginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginAction::SubmitCredentials { email, .. } => f
                .debug_struct("SubmitCredentials")
                .field("email", email)
                .finish_non_exhaustive(),
            LoginAction::Verify {
                attempt, user_id, ..
            } => f
                .debug_struct("Verify")
                .field("attempt", attempt)
                .field("user_id", user_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Accept only local absolute paths as a post-login target.
fn safe_return_to(target: &str) -> Option<String> {
    let local = target.starts_with('/')
        && !target.starts_with("//")
        && !target.contains('\\')
        && !target.chars().any(char::is_control);
    local.then(|| target.to_string())
}

#[derive(Clone, Debug)]
pub struct LoginMachine {
    state: LoginState,
    notice: Option<LoginNotice>,
    landing: LandingPaths,
    return_to: Option<String>,
    attempts: u64,
}

impl Default for LoginMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginMachine {
    pub fn new() -> Self {
        Self {
            state: LoginState::Idle,
            notice: None,
            landing: LandingPaths::default(),
            return_to: None,
            attempts: 0,
        }
    }

    pub fn with_landing(mut self, landing: LandingPaths) -> Self {
        self.landing = landing;
        self
    }

    /// Where a non-admin user goes after signing in. Ignored unless it is a local path.
    pub fn with_return_to(mut self, target: &str) -> Self {
        self.return_to = safe_return_to(target);
        self
    }

    pub fn state(&self) -> &LoginState {
        &self.state
    }

    pub fn notice(&self) -> Option<&LoginNotice> {
        self.notice.as_ref()
    }

    pub fn challenge(&self) -> Option<&SecondFactorChallenge> {
        match &self.state {
            LoginState::AwaitingSecondFactor(challenge)
            | LoginState::Verifying { challenge, .. } => Some(challenge),
            _ => None,
        }
    }

    /// Target of a completed login, if any.
    pub fn redirect(&self) -> Option<&str> {
        match &self.state {
            LoginState::Authenticated { redirect } => Some(redirect),
            _ => None,
        }
    }

    pub fn submit_primary(&mut self, email: &str, password: &str) -> Option<LoginAction> {
        match self.state {
            LoginState::Idle | LoginState::PrimaryRejected => {
                self.state = LoginState::PrimarySubmitted;
                self.notice = None;
                Some(LoginAction::SubmitCredentials {
                    email: email.to_string(),
                    password: password.to_string(),
                })
            }
            _ => {
                debug!(state = ?self.state, "Ignoring credential submission");
                None
            }
        }
    }

    pub fn primary_outcome(&mut self, response: &LoginResponse) {
        if self.state != LoginState::PrimarySubmitted {
            debug!(state = ?self.state, "Discarding login outcome");
            return;
        }

        if !response.success {
            self.reject_primary(LoginNotice::from_login_failure(response));
            return;
        }

        if !response.requires_two_factor {
            self.authenticate(response.user.as_ref());
            return;
        }

        match &response.user_id {
            Some(user_id) => {
                debug!(%user_id, "Second factor required");
                self.notice = None;
                self.state = LoginState::AwaitingSecondFactor(SecondFactorChallenge {
                    user_id: user_id.clone(),
                    hint: response.country.clone(),
                    code: CodeBuffer::new(),
                });
            }
            None => self.reject_primary(LoginNotice::error(DEFAULT_LOGIN_ERROR)),
        }
    }

    /// Digit entry. Completing the code starts verification.
    pub fn input_digit(&mut self, index: usize, value: &str) -> Option<LoginAction> {
        let LoginState::AwaitingSecondFactor(challenge) = &mut self.state else {
            return None;
        };

        if challenge.code.input(index, value) && challenge.code.is_complete() {
            return self.begin_verification();
        }
        None
    }

    pub fn backspace(&mut self, index: usize) {
        if let LoginState::AwaitingSecondFactor(challenge) = &mut self.state {
            challenge.code.backspace(index);
        }
    }

    /// Paste a whole code. A valid six-digit paste starts verification immediately.
    pub fn paste(&mut self, text: &str) -> Option<LoginAction> {
        let LoginState::AwaitingSecondFactor(challenge) = &mut self.state else {
            return None;
        };

        if challenge.code.paste(text) {
            return self.begin_verification();
        }
        None
    }

    pub fn verification_outcome(&mut self, attempt: u64, response: &VerifyResponse) {
        let current = match &self.state {
            LoginState::Verifying { attempt, .. } => *attempt,
            _ => {
                debug!(attempt, state = ?self.state, "Discarding verification outcome");
                return;
            }
        };
        if current != attempt {
            debug!(attempt, current, "Discarding stale verification outcome");
            return;
        }

        if response.success {
            self.authenticate(response.user.as_ref());
            return;
        }

        let LoginState::Verifying { mut challenge, .. } =
            mem::replace(&mut self.state, LoginState::Idle)
        else {
            return;
        };
        challenge.code.clear();
        self.notice = Some(LoginNotice::error(
            response
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_VERIFY_ERROR.to_string()),
        ));
        self.state = LoginState::AwaitingSecondFactor(challenge);
    }

    /// Abandon the second factor and go back to the credential form.
    pub fn cancel(&mut self) {
        if matches!(
            self.state,
            LoginState::AwaitingSecondFactor(_) | LoginState::Verifying { .. }
        ) {
            self.state = LoginState::Idle;
            self.notice = None;
        }
    }

    fn begin_verification(&mut self) -> Option<LoginAction> {
        let code = self.challenge()?.code.code()?;
        let LoginState::AwaitingSecondFactor(challenge) =
            mem::replace(&mut self.state, LoginState::Idle)
        else {
            return None;
        };

        self.attempts += 1;
        self.notice = None;
        let user_id = challenge.user_id.clone();
        self.state = LoginState::Verifying {
            challenge,
            attempt: self.attempts,
        };

        Some(LoginAction::Verify {
            attempt: self.attempts,
            user_id,
            code,
        })
    }

    fn reject_primary(&mut self, notice: LoginNotice) {
        debug!(kind = ?notice.kind, "Login rejected");
        self.notice = Some(notice);
        self.state = LoginState::PrimaryRejected;
    }

    fn authenticate(&mut self, user: Option<&SessionUser>) {
        let redirect = match user {
            Some(user) if user.is_admin() => self.landing.admin.clone(),
            _ => self
                .return_to
                .clone()
                .unwrap_or_else(|| self.landing.home.clone()),
        };
        self.notice = None;
        self.state = LoginState::Authenticated { redirect };
    }
}
