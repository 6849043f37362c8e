//! Route gating on top of the session status.

use std::fmt;

use tokio::sync::watch;

use crate::session::{Session, SessionStatus};

/// Console pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Dashboard,
    Projects,
    Clients,
    Content,
    Blog,
    Careers,
    Communication,
    Settings,
}

impl Route {
    pub const ALL: [Route; 9] = [
        Route::Login,
        Route::Dashboard,
        Route::Projects,
        Route::Clients,
        Route::Content,
        Route::Blog,
        Route::Careers,
        Route::Communication,
        Route::Settings,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Dashboard => "/dashboard",
            Route::Projects => "/projects",
            Route::Clients => "/clients",
            Route::Content => "/content",
            Route::Blog => "/blog",
            Route::Careers => "/careers",
            Route::Communication => "/communication",
            Route::Settings => "/settings",
        }
    }

    /// Exact page lookup; a trailing slash is tolerated.
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        let normalized = match trimmed.trim_end_matches('/') {
            "" => "/",
            other => other,
        };
        Self::ALL.into_iter().find(|route| route.path() == normalized)
    }

    /// Everything except the login page needs a session.
    pub fn is_protected(self) -> bool {
        self != Route::Login
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// What to show for a requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Status not known yet; show a loading indicator and decide nothing.
    Loading,
    Render(Route),
    Redirect(Route),
}

/// Decides a path against a session snapshot.
pub fn decide(session: &Session, path: &str) -> GuardDecision {
    let status = session.status();
    if status == SessionStatus::Initializing {
        return GuardDecision::Loading;
    }
    let authenticated = status == SessionStatus::Authenticated;

    match Route::from_path(path) {
        Some(Route::Login) if authenticated => GuardDecision::Redirect(Route::Dashboard),
        Some(Route::Login) => GuardDecision::Render(Route::Login),
        Some(route) if authenticated => GuardDecision::Render(route),
        Some(_) => GuardDecision::Redirect(Route::Login),
        // Root and unknown paths fall through to the landing page.
        None if authenticated => GuardDecision::Redirect(Route::Dashboard),
        None => GuardDecision::Redirect(Route::Login),
    }
}

/// Guard that follows the live session.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    session: watch::Receiver<Session>,
}

impl RouteGuard {
    pub fn new(session: watch::Receiver<Session>) -> Self {
        Self { session }
    }

    /// Decision against the latest session.
    pub fn resolve(&self, path: &str) -> GuardDecision {
        decide(&self.session.borrow(), path)
    }

    /// Waits until the session has left `Initializing`.
    ///
    /// Returns the status at that point, or `None` if the session owner was
    /// dropped first.
    pub async fn wait_until_ready(&mut self) -> Option<SessionStatus> {
        self.session
            .wait_for(|session| !session.is_initializing())
            .await
            .ok()
            .map(|session| session.status())
    }
}
