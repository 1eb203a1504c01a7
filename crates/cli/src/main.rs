//! nurseryctl - Main Entry Point
//!
//! Sweeps test fixtures, seeds scenario data and checks connectivity for
//! the plant-nursery E2E environment.

use clap::{Parser, Subcommand};

use nursery_cli::commands::{auth, cleanup, hooks, seed};
use nursery_cli::context::GlobalOptions;
use nursery_cli::output;
use nursery_fixtures::HookTable;

/// nurseryctl - Fixture lifecycle tools for the nursery E2E suite
#[derive(Parser)]
#[command(name = "nurseryctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete test fixtures from the backend
    Cleanup(cleanup::CleanupArgs),

    /// Run the before-hooks for scenario tags and keep the data
    Seed(seed::SeedArgs),

    /// Verify credentials for a role
    Login(auth::LoginArgs),

    /// Check that the backend answers
    Health,

    /// List the hook table
    Hooks,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Cleanup(args) => cleanup::execute(args, cli.global.coordinator()?, cli.format).await?,
        Commands::Seed(args) => seed::execute(args, cli.global.coordinator()?, cli.format).await?,
        Commands::Login(args) => auth::login(args, cli.global.coordinator()?).await?,
        Commands::Health => auth::health(cli.global.coordinator()?).await?,
        Commands::Hooks => {
            let config = cli.global.load_config()?;
            let table = match &config.hooks_file {
                Some(path) => HookTable::load(path)?,
                None => HookTable::builtin()?,
            };
            hooks::execute(&table, cli.format)?;
        }
    }

    Ok(())
}
