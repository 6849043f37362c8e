//! Route guard command.

use anyhow::Result;
use sheba_core::guard::{GuardDecision, RouteGuard};

use super::Console;

pub async fn run(console: &Console, path: &str) -> Result<()> {
    let mut guard = RouteGuard::new(console.manager.subscribe());
    console.manager.initialize().await;
    guard.wait_until_ready().await;

    match guard.resolve(path) {
        GuardDecision::Loading => println!("loading"),
        GuardDecision::Render(route) => println!("render {route}"),
        GuardDecision::Redirect(route) => println!("redirect {route}"),
    }
    Ok(())
}
