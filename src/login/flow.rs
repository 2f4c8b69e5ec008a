//! Async driver running a [`LoginMachine`] against a [`SessionClient`].

use tracing::info;

use super::machine::{LoginAction, LoginMachine, LoginState};
use crate::client::{SessionClient, Transport};

pub struct LoginFlow<'a, T: Transport> {
    client: &'a SessionClient<T>,
    machine: LoginMachine,
}

impl<'a, T: Transport> LoginFlow<'a, T> {
    pub fn new(client: &'a SessionClient<T>) -> Self {
        Self::with_machine(client, LoginMachine::new())
    }

    pub fn with_machine(client: &'a SessionClient<T>, machine: LoginMachine) -> Self {
        Self { client, machine }
    }

    pub fn machine(&self) -> &LoginMachine {
        &self.machine
    }

    pub fn state(&self) -> &LoginState {
        self.machine.state()
    }

    pub async fn submit(&mut self, email: &str, password: &str) -> &LoginState {
        let action = self.machine.submit_primary(email, password);
        self.run(action).await
    }

    pub async fn input_digit(&mut self, index: usize, value: &str) -> &LoginState {
        let action = self.machine.input_digit(index, value);
        self.run(action).await
    }

    pub fn backspace(&mut self, index: usize) {
        self.machine.backspace(index);
    }

    pub async fn paste(&mut self, text: &str) -> &LoginState {
        let action = self.machine.paste(text);
        self.run(action).await
    }

    pub fn cancel(&mut self) {
        self.machine.cancel();
    }

    async fn run(&mut self, action: Option<LoginAction>) -> &LoginState {
        match action {
            Some(LoginAction::SubmitCredentials { email, password }) => {
                let response = self.client.login(&email, &password).await;
                self.machine.primary_outcome(&response);
            }
            Some(LoginAction::Verify {
                attempt,
                user_id,
                code,
            }) => {
                let response = self.client.verify_second_factor(&user_id, &code).await;
                self.machine.verification_outcome(attempt, &response);
            }
            None => return self.machine.state(),
        }

        if let LoginState::Authenticated { redirect } = self.machine.state() {
            info!(%redirect, "Login complete");
            // Mutating calls made after sign-in need the forgery token.
            self.client.fetch_forgery_token().await;
        }
        self.machine.state()
    }
}
