//! Login form submission: credentials in, navigation or message out.

use sheba_types::{Credentials, Role};
use tracing::info;

use crate::backend::AuthBackend;
use crate::guard::Route;
use crate::session::SessionManager;

pub const MISSING_CREDENTIALS_MESSAGE: &str = "Username and password are required.";

/// Values entered on the login page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub role: Role,
}

/// Where the form goes after submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFormResult {
    Navigate(Route),
    Error(String),
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            role,
        }
    }

    /// Logs in and checks the account's role against the selected one. A
    /// mismatched role ends the session again before reporting.
    pub async fn submit<B: AuthBackend>(&self, manager: &SessionManager<B>) -> LoginFormResult {
        let username = self.username.trim();
        if username.is_empty() || self.password.is_empty() {
            return LoginFormResult::Error(MISSING_CREDENTIALS_MESSAGE.to_string());
        }

        let credentials = Credentials::new(username, self.password.as_str(), self.role.clone());
        let outcome = manager.login(&credentials).await;
        let Some(user) = outcome.user() else {
            return LoginFormResult::Error(outcome.error_message().unwrap_or_default());
        };

        if !manager.validate_role(&self.role) {
            let actual = user.role.clone();
            info!(
                username,
                actual = %actual,
                selected = %self.role,
                "Selected role does not match account"
            );
            manager.logout_on_role_mismatch().await;
            return LoginFormResult::Error(role_mismatch_message(&actual, &self.role));
        }

        LoginFormResult::Navigate(Route::Dashboard)
    }
}

pub fn role_mismatch_message(actual: &Role, selected: &Role) -> String {
    format!("Access denied. You are logged in as {actual} but selected {selected} role.")
}
