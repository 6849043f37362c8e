//! Session command handlers.

use anyhow::{Result, bail};
use sheba_core::login_form::{LoginForm, LoginFormResult};
use sheba_core::session::SessionStatus;
use sheba_types::{PasswordChange, Role};

use super::Console;

pub async fn status(console: &Console) -> Result<()> {
    console.manager.initialize().await;
    match console.manager.snapshot().user() {
        Some(user) => println!("authenticated as {} ({})", user.username, user.role),
        None => println!("not logged in"),
    }
    Ok(())
}

pub async fn login(console: &Console, username: String, password: String, role: Role) -> Result<()> {
    console.manager.initialize().await;

    let form = LoginForm {
        username,
        password,
        role,
    };
    match form.submit(&console.manager).await {
        LoginFormResult::Navigate(_) => {
            if let Some(user) = console.manager.snapshot().user() {
                println!("Logged in as {} ({})", user.username, user.role);
            }
            Ok(())
        }
        LoginFormResult::Error(message) => bail!(message),
    }
}

pub async fn logout(console: &Console) -> Result<()> {
    console.manager.initialize().await;
    console.manager.logout().await;
    println!("Logged out.");
    Ok(())
}

pub async fn change_password(console: &Console, old_password: &str, new_password: &str) -> Result<()> {
    if console.manager.initialize().await != SessionStatus::Authenticated {
        bail!("Not logged in.");
    }

    let outcome = console
        .manager
        .change_password(&PasswordChange::new(old_password, new_password))
        .await;
    match outcome.error_message() {
        None => {
            println!("Password changed.");
            Ok(())
        }
        Some(message) => bail!(message),
    }
}
