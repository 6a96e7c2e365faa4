//! TravelSnap CLI - share geotagged travel photos from the terminal.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::comment::run_comment;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::post::run_post;
use crate::commands::profile::run_profile;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Config { command } => run_config(command, profile),
        Commands::Auth { command } => run_auth(command, profile).await,
        Commands::Profile { command } => run_profile(command, profile).await,
        Commands::Post { command } => run_post(command, profile).await,
        Commands::Comment { command } => run_comment(command, profile).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
