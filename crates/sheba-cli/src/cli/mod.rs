//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use sheba_core::{config, logging};
use sheba_types::Role;

mod commands;

#[derive(Parser)]
#[command(name = "sheba")]
#[command(version)]
#[command(about = "Sheba admin console client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show who is logged in
    Status,

    /// Log in to the console
    Login {
        #[arg(short, long)]
        username: String,

        /// Password (prefer the environment variable)
        #[arg(short, long, env = "SHEBA_PASSWORD", hide_env_values = true)]
        password: String,

        /// Role you expect to hold (admin, manager, developer, client)
        #[arg(short, long, default_value = "admin", value_parser = parse_role)]
        role: Role,
    },

    /// End the current session
    Logout,

    /// Change the password of the logged-in account
    ChangePassword {
        #[arg(long = "old", env = "SHEBA_OLD_PASSWORD", hide_env_values = true)]
        old_password: String,

        #[arg(long = "new", env = "SHEBA_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },

    /// Show what the console would display for a path
    Route {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Authenticated GET against the API, printed as JSON
    Get {
        /// Path below the API base URL, e.g. /clients/
        #[arg(value_name = "PATH")]
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_query)]
        query: Vec<(String, String)>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

/// Role names on the command line are case-insensitive.
fn parse_role(value: &str) -> Result<Role, String> {
    let role: Role = value.trim().to_ascii_lowercase().parse().unwrap_or_default();
    if Role::selectable().contains(&role) {
        Ok(role)
    } else {
        let names: Vec<&str> = Role::selectable().iter().map(Role::as_str).collect();
        Err(format!("expected one of: {}", names.join(", ")))
    }
}

fn parse_query(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{value}'"))
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    // Config commands must work even when the config file is broken.
    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        };
    }

    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config.logging)?;
    let console = commands::Console::open(&config)?;

    match cli.command {
        Commands::Status => commands::auth::status(&console).await,
        Commands::Login {
            username,
            password,
            role,
        } => commands::auth::login(&console, username, password, role).await,
        Commands::Logout => commands::auth::logout(&console).await,
        Commands::ChangePassword {
            old_password,
            new_password,
        } => commands::auth::change_password(&console, &old_password, &new_password).await,
        Commands::Route { path } => commands::route::run(&console, &path).await,
        Commands::Get { path, query } => commands::api::get(&console, &path, &query).await,
        Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_accepts_selectable_roles() {
        assert_eq!(parse_role("Manager"), Ok(Role::Manager));
        assert_eq!(parse_role(" client "), Ok(Role::Client));
        assert!(parse_role("superuser").unwrap_err().contains("admin"));
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_query("page=2"),
            Ok(("page".to_string(), "2".to_string()))
        );
        assert_eq!(
            parse_query("q=a=b"),
            Ok(("q".to_string(), "a=b".to_string()))
        );
        assert!(parse_query("page").is_err());
    }
}
