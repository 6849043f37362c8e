//! Backend auth contract and its HTTP implementation.
//!
//! The session manager only depends on the [`AuthBackend`] trait; the
//! production implementation talks to the console's REST API with `reqwest`.

use std::fmt;
use std::future::Future;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sheba_types::{PasswordChange, User};

use crate::config::Config;

/// Standard User-Agent header for console API requests.
pub const USER_AGENT: &str = concat!("sheba/", env!("CARGO_PKG_VERSION"));

const LOGIN_PATH: &str = "/auth/login/";
const LOGOUT_PATH: &str = "/auth/logout/";
const CHANGE_PASSWORD_PATH: &str = "/auth/change-password/";

/// Categories of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// HTTP 401: the credential is missing, expired or revoked
    Unauthorized,
    /// Any other non-success HTTP status
    HttpStatus,
    /// The request did not complete within the configured timeout
    Timeout,
    /// Connection-level failure; no response arrived
    Transport,
    /// A success response whose body could not be decoded
    Parse,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::Unauthorized => write!(f, "unauthorized"),
            BackendErrorKind::HttpStatus => write!(f, "http_status"),
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::Transport => write!(f, "transport"),
            BackendErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from the backend with kind and the raw error payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    pub kind: BackendErrorKind,
    /// One-line summary suitable for logs
    pub message: String,
    /// HTTP status, if a response arrived
    pub status: Option<u16>,
    /// Error body as sent by the backend (JSON, or a string for non-JSON bodies)
    pub payload: Option<Value>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    /// Creates an error for a non-success HTTP response.
    pub fn http_status(status: u16, body: &str) -> Self {
        let kind = if status == StatusCode::UNAUTHORIZED.as_u16() {
            BackendErrorKind::Unauthorized
        } else {
            BackendErrorKind::HttpStatus
        };

        let trimmed = body.trim();
        let payload = if trimmed.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(trimmed)
                    .unwrap_or_else(|_| Value::String(trimmed.to_string())),
            )
        };

        let message = match payload.as_ref().and_then(extract_message) {
            Some(msg) => format!("HTTP {status}: {msg}"),
            None => format!("HTTP {status}"),
        };

        Self {
            kind,
            message,
            status: Some(status),
            payload,
        }
    }

    /// Classifies a transport-level `reqwest` failure.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(BackendErrorKind::Timeout, format!("Request timed out: {err}"))
        } else if err.is_decode() {
            Self::new(BackendErrorKind::Parse, format!("Invalid response body: {err}"))
        } else {
            Self::new(BackendErrorKind::Transport, format!("Network error: {err}"))
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == BackendErrorKind::Unauthorized
    }

    /// Returns true if the backend answered at all.
    pub fn response_arrived(&self) -> bool {
        self.status.is_some()
    }

    /// Message for display to the end user.
    ///
    /// Prefers what the backend said (`detail`, `non_field_errors`, then the
    /// first field error); falls back to a generic text when nothing usable
    /// came back.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(msg) = self.payload.as_ref().and_then(extract_message) {
            return msg;
        }
        match self.kind {
            BackendErrorKind::Timeout => "The server did not respond in time.".to_string(),
            BackendErrorKind::Transport => "Could not reach the server.".to_string(),
            _ => fallback.to_string(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Pulls a human-readable message out of a DRF-style error body.
fn extract_message(payload: &Value) -> Option<String> {
    let first_string = |v: &Value| -> Option<String> {
        match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Array(items) => items
                .iter()
                .find_map(|i| i.as_str().filter(|s| !s.trim().is_empty()))
                .map(|s| s.trim().to_string()),
            _ => None,
        }
    };

    let Value::Object(map) = payload else {
        return None;
    };

    for key in ["detail", "non_field_errors", "error", "message"] {
        if let Some(msg) = map.get(key).and_then(first_string) {
            return Some(msg);
        }
    }
    map.values().find_map(first_string)
}

/// Successful login response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// The calls the session manager needs from the backend.
///
/// Every call is a suspension point; none of them touch session state.
pub trait AuthBackend: Send + Sync {
    /// Exchanges username and password for a token and user record.
    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = BackendResult<LoginResponse>> + Send;

    /// Tells the backend the token is no longer in use.
    fn logout(&self, token: &str) -> impl Future<Output = BackendResult<()>> + Send;

    fn change_password(
        &self,
        token: &str,
        change: &PasswordChange,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Any authenticated-only request; only success or failure matters.
    fn probe(&self, token: &str) -> impl Future<Output = BackendResult<()>> + Send;
}

/// Shared HTTP plumbing: base URL, auth header and error mapping.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    auth_scheme: String,
}

impl HttpTransport {
    /// Builds a transport honoring the configured timeout.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be
    /// built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config.api_base_url.trim();
        url::Url::parse(base_url).with_context(|| format!("Invalid API base URL: {base_url}"))?;

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.api_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_scheme: config.auth_scheme.trim().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Starts a request, attaching the token when one is given.
    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match token {
            Some(token) => builder.header(
                reqwest::header::AUTHORIZATION,
                format!("{} {token}", self.auth_scheme),
            ),
            None => builder,
        }
    }

    /// Sends a request; non-success statuses become [`BackendError`]s.
    ///
    /// # Errors
    /// Returns a classified error for transport failures and non-2xx
    /// responses.
    pub async fn send(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::http_status(status.as_u16(), &body))
    }
}

/// [`AuthBackend`] over the console's REST API.
#[derive(Debug, Clone)]
pub struct HttpAuthBackend {
    transport: HttpTransport,
    probe_path: String,
}

impl HttpAuthBackend {
    pub fn new(transport: HttpTransport, probe_path: impl Into<String>) -> Self {
        Self {
            transport,
            probe_path: probe_path.into(),
        }
    }

    /// # Errors
    /// Returns an error if the transport cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            HttpTransport::from_config(config)?,
            config.probe_path.clone(),
        ))
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

impl AuthBackend for HttpAuthBackend {
    async fn login(&self, username: &str, password: &str) -> BackendResult<LoginResponse> {
        let builder = self
            .transport
            .request(Method::POST, LOGIN_PATH, None)
            .json(&LoginRequest { username, password });
        let response = self.transport.send(builder).await?;

        response.json::<LoginResponse>().await.map_err(|e| {
            BackendError::new(
                BackendErrorKind::Parse,
                format!("Invalid login response: {e}"),
            )
        })
    }

    async fn logout(&self, token: &str) -> BackendResult<()> {
        let builder = self
            .transport
            .request(Method::POST, LOGOUT_PATH, Some(token));
        self.transport.send(builder).await.map(drop)
    }

    async fn change_password(&self, token: &str, change: &PasswordChange) -> BackendResult<()> {
        let builder = self
            .transport
            .request(Method::POST, CHANGE_PASSWORD_PATH, Some(token))
            .json(change);
        self.transport.send(builder).await.map(drop)
    }

    async fn probe(&self, token: &str) -> BackendResult<()> {
        let builder = self
            .transport
            .request(Method::GET, &self.probe_path, Some(token));
        self.transport.send(builder).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use sheba_types::Role;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn backend_for(server: &MockServer) -> HttpAuthBackend {
        let config = Config {
            api_base_url: format!("{}/api/", server.uri()),
            ..Default::default()
        };
        HttpAuthBackend::from_config(&config).unwrap()
    }

    #[test]
    fn test_url_join_tolerates_slashes() {
        let config = Config {
            api_base_url: "http://localhost:8000/api/".to_string(),
            ..Default::default()
        };
        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(
            transport.url("/auth/login/"),
            "http://localhost:8000/api/auth/login/"
        );
        assert_eq!(
            transport.url("clients/"),
            "http://localhost:8000/api/clients/"
        );
    }

    #[test]
    fn test_http_status_classification_and_messages() {
        let err = BackendError::http_status(401, r#"{"detail":"Invalid token."}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.message, "HTTP 401: Invalid token.");

        let err = BackendError::http_status(
            400,
            r#"{"non_field_errors":["Unable to log in with provided credentials."]}"#,
        );
        assert_eq!(err.kind, BackendErrorKind::HttpStatus);
        assert_eq!(
            err.user_message("fallback"),
            "Unable to log in with provided credentials."
        );

        let err = BackendError::http_status(400, r#"{"new_password":["This password is too short."]}"#);
        assert_eq!(err.user_message("fallback"), "This password is too short.");

        let err = BackendError::http_status(500, "<html>oops</html>");
        assert_eq!(err.payload, Some(json!("<html>oops</html>")));
        assert_eq!(err.user_message("fallback"), "fallback");
    }

    #[test]
    fn test_no_response_uses_generic_message() {
        let err = BackendError::new(BackendErrorKind::Transport, "Network error: refused");
        assert!(!err.response_arrived());
        assert_eq!(err.user_message("fallback"), "Could not reach the server.");
    }

    #[tokio::test]
    async fn test_login_posts_credentials_without_role() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .and(body_json(json!({"username": "ada", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "tok-1",
                "user": {"id": 1, "username": "ada", "role": "admin", "email": "a@x.io"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server).login("ada", "pw").await.unwrap();
        assert_eq!(response.token, "tok-1");
        assert_eq!(response.user.role, Role::Admin);
        assert_eq!(response.user.profile_field("email"), Some(&json!("a@x.io")));
    }

    #[tokio::test]
    async fn test_login_rejection_keeps_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"detail": "Bad credentials"})),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server).login("ada", "nope").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::HttpStatus);
        assert_eq!(err.status, Some(400));
        assert_eq!(err.payload, Some(json!({"detail": "Bad credentials"})));
    }

    #[tokio::test]
    async fn test_login_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
            .mount(&server)
            .await;

        let err = backend_for(&server).login("ada", "pw").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_probe_sends_token_and_maps_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dashboard/overview/"))
            .and(header("Authorization", "Token good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/dashboard/overview/"))
            .and(header("Authorization", "Token revoked"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid token."})),
            )
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        assert!(backend.probe("good").await.is_ok());
        assert!(backend.probe("revoked").await.unwrap_err().is_unauthorized());
    }

    #[tokio::test]
    async fn test_logout_and_change_password_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout/"))
            .and(header("Authorization", "Token tok"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/change-password/"))
            .and(body_json(json!({"old_password": "a", "new_password": "b"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        backend.logout("tok").await.unwrap();
        backend
            .change_password("tok", &PasswordChange::new("a", "b"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/dashboard/overview/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = Config {
            api_base_url: format!("{}/api", server.uri()),
            api_timeout_ms: 100,
            ..Default::default()
        };
        let backend = HttpAuthBackend::from_config(&config).unwrap();

        let err = backend.probe("tok").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let config = Config {
            api_base_url: "http://127.0.0.1:1/api".to_string(),
            ..Default::default()
        };
        let backend = HttpAuthBackend::from_config(&config).unwrap();

        let err = backend.login("ada", "pw").await.unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Transport);
        assert!(!err.response_arrived());
    }
}
