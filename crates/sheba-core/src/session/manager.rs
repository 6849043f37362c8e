//! Session state machine.
//!
//! ```text
//! Initializing ──initialize()──▶ Unauthenticated ◀──logout / mismatch / 401──┐
//!        │                            │                                     │
//!        └──────(probe ok)──────▶ Authenticated ◀──────login ok─────────────┘
//! ```
//!
//! [`SessionManager`] owns the in-memory [`Session`] and is the only writer of
//! the [`SessionStore`]. Consumers read snapshots (or subscribe to changes) and
//! call the action methods; they never touch storage themselves.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde_json::Value;
use sheba_types::{Credentials, PasswordChange, Role, User};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::store::{KeyValueStore, PersistedRecord, SessionStore, StoredSession};
use crate::backend::{AuthBackend, BackendError, HttpAuthBackend};
use crate::config::Config;
use crate::logging::redact;

/// Fallback shown when a login fails without a usable backend message.
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your credentials.";
const PASSWORD_CHANGE_FAILED_MESSAGE: &str = "Password change failed.";

/// Coarse session status, as seen by the route guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Initializing,
    Unauthenticated,
    Authenticated,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Initializing => write!(f, "initializing"),
            SessionStatus::Unauthenticated => write!(f, "unauthenticated"),
            SessionStatus::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// The authoritative record of who is logged in.
///
/// Token and user only exist together, inside `Authenticated`.
#[derive(Clone, PartialEq)]
pub enum Session {
    Initializing,
    Unauthenticated,
    Authenticated { token: String, user: User },
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        match self {
            Session::Initializing => SessionStatus::Initializing,
            Session::Unauthenticated => SessionStatus::Unauthenticated,
            Session::Authenticated { .. } => SessionStatus::Authenticated,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Session::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Session::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    pub fn is_initializing(&self) -> bool {
        matches!(self, Session::Initializing)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Initializing => f.write_str("Initializing"),
            Session::Unauthenticated => f.write_str("Unauthenticated"),
            Session::Authenticated { token, user } => f
                .debug_struct("Authenticated")
                .field("token", &redact(token))
                .field("user", user)
                .finish(),
        }
    }
}

/// Operation-level failure returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The backend rejected the call or could not be reached.
    Backend(BackendError),
    /// The session could not be persisted.
    Storage(String),
    /// The operation needs an authenticated session.
    NotAuthenticated,
}

impl SessionError {
    /// Raw error payload from the backend, if any.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            SessionError::Backend(err) => err.payload.as_ref(),
            _ => None,
        }
    }

    fn user_message(&self, fallback: &str) -> String {
        match self {
            SessionError::Backend(err) => err.user_message(fallback),
            SessionError::Storage(_) => "Could not save the session locally.".to_string(),
            SessionError::NotAuthenticated => "Not logged in.".to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Backend(err) => write!(f, "{err}"),
            SessionError::Storage(msg) => write!(f, "Session storage failed: {msg}"),
            SessionError::NotAuthenticated => write!(f, "Not authenticated"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Result of [`SessionManager::login`].
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Success { user: User },
    Failure { error: SessionError },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            LoginOutcome::Success { user } => Some(user),
            LoginOutcome::Failure { .. } => None,
        }
    }

    /// Message to display for a failed login.
    pub fn error_message(&self) -> Option<String> {
        match self {
            LoginOutcome::Success { .. } => None,
            LoginOutcome::Failure { error } => Some(error.user_message(LOGIN_FAILED_MESSAGE)),
        }
    }
}

/// Result of [`SessionManager::change_password`].
#[derive(Debug, Clone)]
pub enum PasswordChangeOutcome {
    Success,
    Failure { error: SessionError },
}

impl PasswordChangeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PasswordChangeOutcome::Success)
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            PasswordChangeOutcome::Success => None,
            PasswordChangeOutcome::Failure { error } => {
                Some(error.user_message(PASSWORD_CHANGE_FAILED_MESSAGE))
            }
        }
    }
}

/// What an authenticated request helper needs from the session: the current
/// token and a way to drop the session when the backend answers 401.
pub trait SessionHandle: Send + Sync {
    fn current_token(&self) -> Option<String>;

    /// Clears storage and marks the session unauthenticated.
    fn invalidate(&self);
}

/// Owns the session and orchestrates every transition.
///
/// Construct one per application and share it with `Arc`.
pub struct SessionManager<B> {
    backend: B,
    store: SessionStore,
    state: watch::Sender<Session>,
    initialized: AtomicBool,
}

impl SessionManager<HttpAuthBackend> {
    /// Builds a manager talking HTTP to the configured backend.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let backend = HttpAuthBackend::from_config(config)?;
        let store = SessionStore::new(storage, config.storage.clone());
        Ok(Self::new(backend, store))
    }
}

impl<B: AuthBackend> SessionManager<B> {
    pub fn new(backend: B, store: SessionStore) -> Self {
        Self {
            backend,
            store,
            state: watch::Sender::new(Session::Initializing),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status()
    }

    /// Receiver that observes every later transition.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Restores the persisted session, validating the stored token with a
    /// probe call first. Runs once; later calls wait for that run to finish
    /// and return the resulting status.
    pub async fn initialize(&self) -> SessionStatus {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Session already initialized");
            let mut rx = self.state.subscribe();
            return rx
                .wait_for(|session| !session.is_initializing())
                .await
                .map_or_else(|_| self.status(), |session| session.status());
        }

        let next = self.restore().await;
        self.transition(next);
        self.status()
    }

    async fn restore(&self) -> Session {
        let record = match self.store.read() {
            Ok(StoredSession::Present(record)) => record,
            Ok(StoredSession::Absent) => {
                debug!("No stored session");
                return Session::Unauthenticated;
            }
            Ok(StoredSession::Partial) => {
                warn!("Stored session is incomplete, clearing it");
                self.clear_storage();
                return Session::Unauthenticated;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stored session, clearing it");
                self.clear_storage();
                return Session::Unauthenticated;
            }
        };

        let user = match record.parse_user() {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Stored user record is corrupt, clearing session");
                self.clear_storage();
                return Session::Unauthenticated;
            }
        };

        debug!(token = %redact(&record.token), "Validating stored token");
        match self.backend.probe(&record.token).await {
            Ok(()) => {
                if let Err(e) = PersistedRecord::new(&record.token, &user)
                    .and_then(|fresh| self.store.write(&fresh))
                {
                    warn!(error = %e, "Failed to rewrite stored session");
                }
                info!(username = %user.username, role = %user.role, "Restored session");
                Session::Authenticated {
                    token: record.token,
                    user,
                }
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e, "Stored token rejected, clearing session");
                self.clear_storage();
                Session::Unauthenticated
            }
        }
    }

    /// Authenticates with username and password.
    ///
    /// The selected role is not sent; compare it against the returned user
    /// afterwards. On failure the session is left as it was.
    pub async fn login(&self, credentials: &Credentials) -> LoginOutcome {
        debug!(username = %credentials.username, "Logging in");

        let response = match self
            .backend
            .login(&credentials.username, &credentials.password)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(username = %credentials.username, kind = %e.kind, error = %e, "Login failed");
                return LoginOutcome::Failure {
                    error: SessionError::Backend(e),
                };
            }
        };

        let persisted = PersistedRecord::new(&response.token, &response.user)
            .and_then(|record| self.store.write(&record));
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist session after login");
            self.clear_storage();
            return LoginOutcome::Failure {
                error: SessionError::Storage(format!("{e:#}")),
            };
        }

        info!(
            username = %response.user.username,
            role = %response.user.role,
            "Logged in"
        );
        let user = response.user.clone();
        self.transition(Session::Authenticated {
            token: response.token,
            user: response.user,
        });
        LoginOutcome::Success { user }
    }

    /// True iff a user is present and holds `expected`.
    pub fn validate_role(&self, expected: &Role) -> bool {
        self.state
            .borrow()
            .user()
            .is_some_and(|user| &user.role == expected)
    }

    /// Logs out after the authenticated role turned out different from the
    /// one selected on the login form.
    pub async fn logout_on_role_mismatch(&self) {
        self.logout().await;
    }

    /// Notifies the backend (best effort), then always clears local state.
    pub async fn logout(&self) {
        let token = self.state.borrow().token().map(str::to_owned);

        match token {
            Some(token) => {
                if let Err(e) = self.backend.logout(&token).await {
                    warn!(kind = %e.kind, error = %e, "Logout call failed, clearing session anyway");
                }
            }
            None => debug!("No active session, skipping backend logout"),
        }

        self.clear_storage();
        self.transition(Session::Unauthenticated);
        info!("Logged out");
    }

    /// Replaces the user record in memory and in storage. Token and status
    /// are untouched.
    ///
    /// # Errors
    /// Fails without a session, or if the user cannot be persisted.
    pub fn update_user(&self, user: User) -> Result<(), SessionError> {
        if !self.state.borrow().is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }

        self.store
            .write_user(&user)
            .map_err(|e| SessionError::Storage(format!("{e:#}")))?;

        let mut replaced = false;
        self.state.send_if_modified(|session| match session {
            Session::Authenticated { user: current, .. } => {
                *current = user;
                replaced = true;
                true
            }
            _ => false,
        });

        if replaced {
            debug!("User record updated");
            Ok(())
        } else {
            Err(SessionError::NotAuthenticated)
        }
    }

    /// Changes the password. The session is not affected, except that a 401
    /// answer invalidates it like any other authenticated request.
    pub async fn change_password(&self, change: &PasswordChange) -> PasswordChangeOutcome {
        let Some(token) = self.state.borrow().token().map(str::to_owned) else {
            return PasswordChangeOutcome::Failure {
                error: SessionError::NotAuthenticated,
            };
        };

        match self.backend.change_password(&token, change).await {
            Ok(()) => {
                info!("Password changed");
                PasswordChangeOutcome::Success
            }
            Err(e) => {
                warn!(kind = %e.kind, error = %e, "Password change failed");
                if e.is_unauthorized() {
                    self.invalidate();
                }
                PasswordChangeOutcome::Failure {
                    error: SessionError::Backend(e),
                }
            }
        }
    }

    fn clear_storage(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }

    fn transition(&self, next: Session) {
        let previous = self.state.send_replace(next);
        let current = self.state.borrow().status();
        if previous.status() != current {
            debug!(from = %previous.status(), to = %current, "Session transition");
        }
    }
}

impl<B: AuthBackend> SessionHandle for SessionManager<B> {
    fn current_token(&self) -> Option<String> {
        self.state.borrow().token().map(str::to_owned)
    }

    fn invalidate(&self) {
        warn!("Backend rejected the session token, logging out locally");
        self.clear_storage();
        self.transition(Session::Unauthenticated);
    }
}
