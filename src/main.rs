//! Unified keygate CLI.
//!
//! This binary provides a unified interface to the keygate components:
//! - `keygate auth` - Manage users and sessions
//! - `keygate check-config` - Validate a config file
//!
//! `keygate auth` can also be run as the standalone `keygate-auth` binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keygate_config::{CliOverrides, apply_overrides, load_config, validate_config};

/// keygate unified CLI.
#[derive(Parser)]
#[command(
    name = "keygate",
    version,
    about = "Pluggable session-key and credential storage",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users and sessions.
    #[command(name = "auth")]
    Auth(keygate_auth::AuthArgs),

    /// Load and validate a config file, then print the effective settings.
    #[command(name = "check-config")]
    CheckConfig {
        /// Config file path (json/yaml/toml)
        #[arg(short, long, default_value = "keygate.toml")]
        config: PathBuf,

        #[command(flatten)]
        overrides: CliOverrides,
    },
}

fn check_config(path: PathBuf, overrides: CliOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&path)?;
    apply_overrides(&mut config, &overrides);
    validate_config(&config)?;
    println!("{}: ok ({} store)", path.display(), config.store.kind());
    println!("{config:#?}");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Auth(args) => keygate_auth::cli::run(args).await,
        Commands::CheckConfig { config, overrides } => check_config(config, overrides),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
