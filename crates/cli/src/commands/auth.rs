//! Login and health commands

use anyhow::Result;
use clap::Args;

use nursery_fixtures::{LifecycleCoordinator, Role};

use crate::output::{print_error, print_success};

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Role to log in as (admin or user)
    #[arg(long, default_value = "admin")]
    pub role: Role,
}

/// Verify credentials for a role. The token itself is never printed.
pub async fn login(args: LoginArgs, coordinator: LifecycleCoordinator) -> Result<()> {
    let client = coordinator.client();
    match client.login(args.role).await {
        Ok(_) => {
            print_success(&format!("Logged in as {} at {}", args.role, client.base_url()));
            Ok(())
        }
        Err(e) => {
            print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

pub async fn health(coordinator: LifecycleCoordinator) -> Result<()> {
    let client = coordinator.client();
    match client.health().await {
        Ok(true) => {
            print_success(&format!("Backend is up at {}", client.base_url()));
            Ok(())
        }
        Ok(false) => {
            print_error(&format!("Backend at {} answered but is unhealthy", client.base_url()));
            std::process::exit(1);
        }
        Err(e) => {
            print_error(&format!("Cannot reach backend: {}", e));
            std::process::exit(1);
        }
    }
}
