//! CLI command implementations
//!
//! Every command loads and validates the config before touching a store.
//! `run` passes the production gate before the store is even opened.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::environment::Environment;
use crate::logging;
use crate::migrations::{MigrationError, MigrationRunner, Registry, RunSummary, VersionLedger};
use crate::store::JsonDirStore;

use super::args::{Cli, Command, OutputFormat};
use super::errors::{CliError, CliResult};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cli: Cli) -> CliResult<()> {
    match cli.command {
        Command::Run {
            migration,
            env,
            confirm,
            format,
        } => {
            let summary = run_migration(&cli.config, &migration, &env, confirm.as_deref())?;
            print_summary(&summary, format)?;
            match summary.ledger_error {
                Some(err) => Err(CliError::migration_failed(format!(
                    "Records processed but version ledger not updated: {}",
                    err
                ))),
                None => Ok(()),
            }
        }
        Command::Status { env } => {
            println!("{}", status(&cli.config, &env)?);
            Ok(())
        }
        Command::List => {
            println!("{}", list(&cli.config)?);
            Ok(())
        }
    }
}

fn load(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    logging::init(&config.log_level);
    Ok(config)
}

fn open_target(config: &Config, environment: Environment) -> CliResult<Arc<JsonDirStore>> {
    let target = config.target(environment)?;
    let store = JsonDirStore::open(target.data_path()).map_err(MigrationError::from)?;
    Ok(Arc::new(store))
}

fn open_target_read_only(config: &Config, environment: Environment) -> CliResult<Arc<JsonDirStore>> {
    let target = config.target(environment)?;
    let store = JsonDirStore::open_existing(target.data_path()).map_err(MigrationError::from)?;
    Ok(Arc::new(store))
}

/// Authorize, then run one migration and advance the ledger if it had effect.
pub fn run_migration(
    config_path: &Path,
    key: &str,
    selector: &str,
    confirm: Option<&str>,
) -> CliResult<RunSummary> {
    let config = load(config_path)?;
    let environment = config.gate().authorize(selector, confirm)?;

    let registry = Registry::standard(config.app.event_stamp());
    let migration = registry
        .resolve(key)
        .ok_or_else(|| CliError::unknown_migration(key))?;

    let store = open_target(&config, environment)?;
    info!(
        migration = migration.name(),
        %environment,
        data_dir = %store.root().display(),
        "Target selected"
    );

    let runner = MigrationRunner::new(store.clone(), store, environment);
    Ok(runner.run(migration)?)
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Text => println!("{}", summary),
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(summary).map_err(|e| {
                CliError::migration_failed(format!("Failed to render summary: {}", e))
            })?;
            println!("{}", rendered);
        }
    }
    Ok(())
}

/// Report the ledger version of a target. Never writes.
pub fn status(config_path: &Path, selector: &str) -> CliResult<String> {
    let config = load(config_path)?;
    let environment: Environment = selector.parse()?;
    let store = open_target_read_only(&config, environment)?;
    let ledger = VersionLedger::new(store);

    let line = match ledger.record()? {
        Some(record) => {
            let mut line = format!("{}: version {}", environment, record.version);
            if let Some(at) = record.updated_at {
                line.push_str(&format!(" (updated {}", at.to_rfc3339()));
                if let Some(by) = record.updated_by {
                    line.push_str(&format!(" by {}", by));
                }
                line.push(')');
            }
            line
        }
        None => format!("{}: no version recorded", environment),
    };
    Ok(line)
}

/// Known migrations, one per line. The config only supplies the event stamp.
pub fn list(config_path: &Path) -> CliResult<String> {
    let stamp = match Config::load(config_path) {
        Ok(config) => config.app.event_stamp(),
        Err(_) => Default::default(),
    };
    let registry = Registry::standard(stamp);

    let lines: Vec<String> = registry
        .iter()
        .map(|m| {
            json!({
                "version": m.version(),
                "name": m.name(),
                "collection": m.source_collection(),
                "description": m.description(),
            })
            .to_string()
        })
        .collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use crate::migrations::qr_backfill::{EVENTS_COLLECTION, EVENT_ID_FIELD, QR_COLLECTION};
    use crate::migrations::LedgerVersion;
    use serde_json::Value;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup(temp_dir: &TempDir) -> PathBuf {
        let dev = temp_dir.path().join("dev");
        let prod = temp_dir.path().join("prod");

        let store = JsonDirStore::open(&dev).unwrap();
        store.create_unique_index(EVENTS_COLLECTION, EVENT_ID_FIELD).unwrap();
        fs::write(
            dev.join(format!("{}.json", QR_COLLECTION)),
            json!([{
                "_id": "qr-1",
                "name": "Library Door",
                "scanHistory": [
                    {"timestamp": "2023-01-01T00:00:00Z", "ipAddress": "203.0.113.7", "userAgent": "Mozilla/5.0"}
                ]
            }])
            .to_string(),
        )
        .unwrap();

        let path = temp_dir.path().join("docshift.json");
        fs::write(
            &path,
            json!({
                "development": {"data_dir": dev.to_string_lossy()},
                "production": {"data_dir": prod.to_string_lossy()},
                "log_level": "warn"
            })
            .to_string(),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_dev_run_advances_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup(&temp_dir);

        let summary = run_migration(&config, "qr-scan-backfill", "d", None).unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.version_advanced, Some(LedgerVersion::new(1.22)));

        let again = run_migration(&config, "1.22", "dev", None).unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(again.duplicate_skipped, 1);

        let events: Value = serde_json::from_str(
            &fs::read_to_string(temp_dir.path().join("dev").join("analytics_events.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(events.as_array().unwrap().len(), 1);

        let line = status(&config, "d").unwrap();
        assert!(line.starts_with("development: version 1.22"));
    }

    #[test]
    fn test_production_requires_confirmation() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup(&temp_dir);

        let err = run_migration(&config, "roles-to-custom", "p", None).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::Aborted);

        let err = run_migration(&config, "roles-to-custom", "p", Some("yes")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::Aborted);

        // Nothing was opened, so nothing was created
        assert!(!temp_dir.path().join("prod").exists());
    }

    #[test]
    fn test_confirmed_production_run() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup(&temp_dir);

        let summary = run_migration(&config, "roles-to-custom", "prod", Some(" StudyCompass ")).unwrap();
        assert_eq!(summary.environment, Environment::Production);
        assert_eq!(summary.total_records, 0);
        assert_eq!(summary.version_advanced, None);
        assert_eq!(status(&config, "p").unwrap(), "production: no version recorded");
    }

    #[test]
    fn test_status_does_not_create_missing_target() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup(&temp_dir);

        let err = status(&config, "p").unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::MigrationFailed);
        assert!(err.message().contains("does not exist"));
        assert!(!temp_dir.path().join("prod").exists());
    }

    #[test]
    fn test_unknown_migration_and_bad_selector() {
        let temp_dir = TempDir::new().unwrap();
        let config = setup(&temp_dir);

        let err = run_migration(&config, "9.99", "d", None).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::UnknownMigration);

        let err = run_migration(&config, "1.21", "staging", None).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let err = status(&temp_dir.path().join("missing.json"), "d").unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_list_in_version_order() {
        let temp_dir = TempDir::new().unwrap();
        let listing = list(&temp_dir.path().join("missing.json")).unwrap();
        let lines: Vec<Value> = listing
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["name"], "roles-to-custom");
        assert_eq!(lines[1]["name"], "qr-scan-backfill");
        assert_eq!(lines[1]["collection"], "QR");
    }
}
