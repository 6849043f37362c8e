//! Raw API access through the session.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use sheba_core::api::ApiClient;
use sheba_core::backend::HttpAuthBackend;
use sheba_core::session::{SessionManager, SessionStatus};

use super::Console;

pub async fn get(console: &Console, path: &str, query: &[(String, String)]) -> Result<()> {
    if console.manager.initialize().await != SessionStatus::Authenticated {
        bail!("Not logged in.");
    }

    let manager: Arc<SessionManager<HttpAuthBackend>> = Arc::clone(&console.manager);
    let client = ApiClient::new(console.manager.backend().transport().clone(), manager);

    let query: Vec<(&str, &str)> = query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let value = match client.get(path, &query).await {
        Ok(value) => value,
        Err(e) if e.is_unauthorized() => bail!("Session expired. Please log in again."),
        Err(e) => bail!("{}", e.user_message("Request failed.")),
    };

    let pretty = serde_json::to_string_pretty(&value).context("format response")?;
    println!("{pretty}");
    Ok(())
}
