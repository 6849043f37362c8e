//! Tracing subscriber setup.
//!
//! Tokens and passwords are never logged; use [`redact`] when an identifier
//! has to appear in a log line.

use anyhow::{Context, Result};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LoggingConfig, paths};

/// Env var holding an `EnvFilter` directive that overrides the config level.
pub const LOG_ENV: &str = "SHEBA_LOG";

/// Installs the global subscriber: stderr always, plus a daily-rolling file
/// under `<SHEBA_HOME>/logs` when enabled.
///
/// Keep the returned guard alive for the lifetime of the process, dropping it
/// flushes the file writer.
///
/// # Errors
/// Returns an error if the filter directive is invalid or a global subscriber
/// is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_directive = std::env::var(LOG_ENV).ok();
    let (filter, rejected) = select_filter(env_directive.as_deref(), &config.level)?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let guard = if config.file {
        let appender = tracing_appender::rolling::daily(paths::logs_dir(), "sheba.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        None
    };

    if let Some(directive) = rejected {
        warn!(
            directive = %directive,
            level = %config.level,
            "Ignoring invalid {LOG_ENV} filter, using configured level"
        );
    }
    Ok(guard)
}

/// Picks the env directive when it parses, else the configured level.
/// Also returns the env directive if it was rejected.
fn select_filter(env_directive: Option<&str>, level: &str) -> Result<(EnvFilter, Option<String>)> {
    let mut rejected = None;
    if let Some(directive) = env_directive.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directive) {
            Ok(filter) => return Ok((filter, None)),
            Err(_) => rejected = Some(directive.to_string()),
        }
    }

    let filter =
        EnvFilter::try_new(level).with_context(|| format!("Invalid log filter: {level}"))?;
    Ok((filter, rejected))
}

/// Masks a secret for display: at most the first and last two characters
/// survive.
pub fn redact(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}***{tail}")
}
