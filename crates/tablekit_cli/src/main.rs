//! CLI smoke entry point.
//!
//! # Responsibility
//! - Load storage settings and probe every configured database.
//! - Keep output deterministic for quick local sanity checks.

use clap::{Parser, Subcommand};
use log::error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tablekit_core::{
    core_version, init_logging, query, Command, StorageManager, StorageSettings,
};

#[derive(Debug, Parser)]
#[command(name = "tablekit", about = "Probe tablekit storage configuration")]
struct Cli {
    /// Storage settings file (TOML).
    #[arg(long, short, default_value = "tablekit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Open a session on each database and run `SELECT 1`.
    Check,
    /// Print the core version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        CliCommand::Version => {
            println!("tablekit_core version={}", core_version());
            ExitCode::SUCCESS
        }
        CliCommand::Check => match check(&cli.config) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::from(1),
            Err(err) => {
                eprintln!("{err}");
                ExitCode::from(2)
            }
        },
    }
}

/// Returns `Ok(false)` when any database failed its probe.
fn check(config_path: &Path) -> tablekit_core::Result<bool> {
    let settings = StorageSettings::load(config_path)?;
    if let Some(logging) = &settings.logging {
        if let Err(err) = init_logging(&logging.level, &logging.directory) {
            eprintln!("logging disabled: {err}");
        }
    }

    let manager = StorageManager::new(settings.into_config()?)?;
    let probe = Command::new("SELECT 1;");
    let mut healthy = true;
    for name in manager.database_names() {
        let outcome = manager.start_session(Some(name)).and_then(|mut session| {
            let value = query::read_scalar::<i64>(&mut session, &probe)?;
            session.close()?;
            Ok(value)
        });
        match outcome {
            Ok(Some(1)) => println!("{name}: ok"),
            Ok(other) => {
                healthy = false;
                println!("{name}: unexpected probe result {other:?}");
            }
            Err(err) => {
                healthy = false;
                error!("event=cli_check module=cli status=error database={name} error={err}");
                println!("{name}: {err}");
            }
        }
    }
    Ok(healthy)
}
