//! Authenticated JSON requests against the console API.
//!
//! Every request carries the current session token. A 401 from any endpoint
//! means the token is gone server-side, so the session is invalidated before
//! the error is handed back.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{BackendError, BackendErrorKind, BackendResult, HttpTransport};
use crate::session::SessionHandle;

/// Request helper bound to a session.
#[derive(Clone)]
pub struct ApiClient {
    transport: HttpTransport,
    session: Arc<dyn SessionHandle>,
}

impl ApiClient {
    pub fn new(transport: HttpTransport, session: Arc<dyn SessionHandle>) -> Self {
        Self { transport, session }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> BackendResult<Value> {
        self.send(Method::GET, path, query, None::<&Value>).await
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> BackendResult<Value> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn put<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> BackendResult<Value> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn patch<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> BackendResult<Value> {
        self.send(Method::PATCH, path, &[], Some(body)).await
    }

    /// # Errors
    /// See [`ApiClient::send`].
    pub async fn delete(&self, path: &str) -> BackendResult<Value> {
        self.send(Method::DELETE, path, &[], None::<&Value>).await
    }

    /// Sends one request and decodes the JSON body. Empty bodies decode to
    /// `null`.
    ///
    /// # Errors
    /// Returns the classified [`BackendError`]. On a 401 the session has
    /// already been invalidated when this returns.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&T>,
    ) -> BackendResult<Value> {
        let token = self.session.current_token();
        debug!(%method, path, authenticated = token.is_some(), "API request");

        let mut builder = self.transport.request(method, path, token.as_deref());
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match self.transport.send(builder).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_unauthorized() {
                    warn!(path, "Request unauthorized, ending session");
                    self.session.invalidate();
                }
                return Err(e);
            }
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_reqwest(&e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            BackendError::new(BackendErrorKind::Parse, format!("Invalid response body: {e}"))
        })
    }
}
