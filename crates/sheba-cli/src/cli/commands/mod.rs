//! CLI command handlers.

use std::sync::Arc;

use anyhow::Result;
use sheba_core::backend::HttpAuthBackend;
use sheba_core::config::{Config, paths};
use sheba_core::session::{FileStore, SessionManager};

pub mod api;
pub mod auth;
pub mod config;
pub mod route;

/// Session manager over the on-disk session file, shared by all commands.
pub struct Console {
    pub manager: Arc<SessionManager<HttpAuthBackend>>,
}

impl Console {
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(FileStore::new(paths::session_path()));
        let manager = SessionManager::from_config(config, storage)?;
        Ok(Self {
            manager: Arc::new(manager),
        })
    }
}
