//! CLI argument definitions using clap
//!
//! Commands:
//! - docshift run <migration> --env <d|p> [--confirm <phrase>]
//! - docshift status --env <d|p>
//! - docshift list

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// docshift - Versioned migrations and idempotent backfills for document stores
#[derive(Parser, Debug)]
#[command(name = "docshift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./docshift.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one migration against a target database
    ///
    /// Production requires --confirm with the configured phrase.
    /// Re-running a migration is safe.
    Run {
        /// Migration name or version (see `docshift list`)
        migration: String,

        /// Target database: d (development) or p (production)
        #[arg(long, short = 'e')]
        env: String,

        /// Production confirmation phrase
        #[arg(long)]
        confirm: Option<String>,

        /// Summary output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the version recorded in a target's ledger (read-only)
    Status {
        /// Target database: d (development) or p (production)
        #[arg(long, short = 'e')]
        env: String,
    },

    /// List known migrations
    List,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_parsing() {
        let cli = Cli::parse_from([
            "docshift",
            "run",
            "qr-scan-backfill",
            "--env",
            "p",
            "--confirm",
            "studycompass",
            "--format",
            "json",
        ]);

        match cli.command {
            Command::Run {
                migration,
                env,
                confirm,
                format,
            } => {
                assert_eq!(migration, "qr-scan-backfill");
                assert_eq!(env, "p");
                assert_eq!(confirm.as_deref(), Some("studycompass"));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("Expected Run, got {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("./docshift.json"));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["docshift", "status", "-e", "d", "--config", "/etc/docshift.json"]);
        assert_eq!(cli.config, PathBuf::from("/etc/docshift.json"));
        assert!(matches!(cli.command, Command::Status { .. }));
    }

    #[test]
    fn test_run_requires_env() {
        assert!(Cli::try_parse_from(["docshift", "run", "1.21"]).is_err());
    }
}
