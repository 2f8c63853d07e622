//! # Migration Runner
//!
//! Executes one migration against one already-authorized environment:
//!
//! 1. preflight checks (fatal, nothing written)
//! 2. snapshot scan of the source collection
//! 3. per record: transform + write, outcome folded into the summary
//! 4. ledger advance, only when the migration's policy sees an effect
//!
//! Record failures never abort the run; they land in `errored`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use super::errors::{MigrationResult, RecordError};
use super::ledger::{LedgerVersion, VersionLedger};
use super::{Migration, RecordOutcome, RunContext};
use crate::environment::Environment;
use crate::store::{document_id, DocumentStore, VersionStore};

/// Aggregate result of one migration run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub migration: String,
    pub version: LedgerVersion,
    pub environment: Environment,
    /// Source documents in the snapshot
    pub total_records: u64,
    /// Sub-units seen across records (positions, scans)
    pub units_seen: u64,
    pub updated: u64,
    pub skipped: u64,
    pub duplicate_skipped: u64,
    pub errored: u64,
    pub duration_ms: u64,
    /// Version written to the ledger, if the run advanced it
    pub version_advanced: Option<LedgerVersion>,
    /// Ledger write failure after an otherwise complete run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
}

impl RunSummary {
    fn new(migration: &dyn Migration, environment: Environment) -> Self {
        Self {
            migration: migration.name().to_string(),
            version: migration.version(),
            environment,
            total_records: 0,
            units_seen: 0,
            updated: 0,
            skipped: 0,
            duplicate_skipped: 0,
            errored: 0,
            duration_ms: 0,
            version_advanced: None,
            ledger_error: None,
        }
    }

    fn absorb(&mut self, outcome: &RecordOutcome) {
        self.units_seen += outcome.units_seen;
        self.updated += outcome.updated;
        self.skipped += outcome.skipped;
        self.duplicate_skipped += outcome.duplicate_skipped;
    }

    fn absorb_failure(&mut self, failure: &RecordError) {
        self.units_seen += failure.units_seen;
        self.errored += failure.errored;
    }

    /// Bucket totals, as seen by advance policies
    pub fn totals(&self) -> RecordOutcome {
        RecordOutcome {
            units_seen: self.units_seen,
            updated: self.updated,
            skipped: self.skipped,
            duplicate_skipped: self.duplicate_skipped,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{}", rule)?;
        writeln!(f, "Migration Summary: {} ({})", self.migration, self.environment)?;
        writeln!(f, "  Records processed: {}", self.total_records)?;
        writeln!(f, "  Units seen: {}", self.units_seen)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Skipped: {}", self.skipped)?;
        writeln!(f, "  Skipped (duplicates): {}", self.duplicate_skipped)?;
        writeln!(f, "  Errors: {}", self.errored)?;
        writeln!(f, "{}", rule)?;
        match (&self.version_advanced, &self.ledger_error) {
            (Some(version), _) => write!(f, "Database version updated to {}", version),
            (None, Some(err)) => write!(f, "Version not updated: {}", err),
            (None, None) => write!(f, "No changes made, version not updated"),
        }
    }
}

/// Migration runner
///
/// Owns the ledger lifecycle: only this type advances the version.
pub struct MigrationRunner {
    store: Arc<dyn DocumentStore>,
    ledger: VersionLedger,
    environment: Environment,
}

impl MigrationRunner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        versions: Arc<dyn VersionStore>,
        environment: Environment,
    ) -> Self {
        Self {
            store,
            ledger: VersionLedger::new(versions),
            environment,
        }
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Run the record loop without touching the ledger.
    ///
    /// Errors only for failures before the first record (preflight, scan).
    pub fn execute(&self, migration: &dyn Migration) -> MigrationResult<RunSummary> {
        let start = Instant::now();
        migration.preflight(self.store.as_ref())?;

        let records = self.store.scan(migration.source_collection())?;
        info!(
            migration = migration.name(),
            version = %migration.version(),
            environment = %self.environment,
            collection = migration.source_collection(),
            records = records.len(),
            "Starting migration"
        );

        let ctx = RunContext {
            store: self.store.as_ref(),
            environment: self.environment,
        };
        let mut summary = RunSummary::new(migration, self.environment);

        for record in &records {
            summary.total_records += 1;
            match migration.apply(record, &ctx) {
                Ok(outcome) => summary.absorb(&outcome),
                Err(failure) => {
                    error!(
                        record = document_id(record).as_deref().unwrap_or("<no id>"),
                        error = %failure,
                        "Record failed"
                    );
                    summary.absorb_failure(&failure);
                }
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Execute, then advance the ledger if the migration's policy allows.
    ///
    /// A ledger write failure is reported in the summary, not as an error,
    /// so the counts of a finished run are never lost.
    pub fn run(&self, migration: &dyn Migration) -> MigrationResult<RunSummary> {
        let mut summary = self.execute(migration)?;

        if !migration.advance_policy().permits(&summary.totals()) {
            info!(migration = migration.name(), "No changes made, version not updated");
            return Ok(summary);
        }

        match self.ledger.advance(migration.version()) {
            Ok(()) => {
                info!(version = %migration.version(), "Database version updated");
                summary.version_advanced = Some(migration.version());
            }
            Err(e) => {
                error!(error = %e, "Failed to update version ledger");
                summary.ledger_error = Some(e.to_string());
            }
        }
        Ok(summary)
    }
}
