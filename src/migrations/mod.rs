//! # Data Migrations
//!
//! Versioned, re-runnable transformations over existing collections.
//!
//! # Design Principles
//!
//! 1. **Convergent**: applying a migration to already-migrated data reproduces
//!    the same state, so a re-run is always safe
//! 2. **Deterministic identity**: backfilled records get ids derived from their
//!    source, and a unique index turns re-inserts into duplicate skips
//! 3. **Per-record isolation**: one bad record is counted under `errored` and
//!    the run continues
//! 4. **Tracked**: a single ledger document records the latest applied version
//!
//! # Usage
//!
//! ```bash
//! docshift list                                   # Known migrations
//! docshift run roles-to-custom --env d            # Development run
//! docshift run 1.22 --env p --confirm <phrase>    # Production run
//! docshift status --env d                         # Ledger version
//! ```

pub mod batch;
pub mod errors;
pub mod identity;
pub mod ledger;
pub mod qr_backfill;
pub mod registry;
pub mod roles;
pub mod runner;

pub use errors::{MigrationError, MigrationResult, RecordError};
pub use ledger::{LedgerVersion, VersionLedger};
pub use registry::Registry;
pub use runner::{MigrationRunner, RunSummary};

use std::ops::AddAssign;

use crate::environment::Environment;
use crate::store::{Document, DocumentStore};

/// Everything a migration may touch while processing one record
pub struct RunContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub environment: Environment,
}

/// A versioned data migration
pub trait Migration: Send + Sync {
    /// Version recorded in the ledger after a run with effect
    fn version(&self) -> LedgerVersion;

    /// Stable name used to select the migration
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Collection scanned record by record
    fn source_collection(&self) -> &'static str;

    /// Which summary counts make a run worth recording in the ledger
    fn advance_policy(&self) -> AdvancePolicy;

    /// Checks that must pass before the first record is touched
    fn preflight(&self, _store: &dyn DocumentStore) -> MigrationResult<()> {
        Ok(())
    }

    /// Transform (and write) one source record
    fn apply(&self, record: &Document, ctx: &RunContext<'_>) -> Result<RecordOutcome, RecordError>;
}

/// What processing one record did, in summary buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Sub-units seen (positions, scans)
    pub units_seen: u64,
    pub updated: u64,
    pub skipped: u64,
    pub duplicate_skipped: u64,
}

impl RecordOutcome {
    pub fn updated(units_seen: u64, updated: u64) -> Self {
        Self {
            units_seen,
            updated,
            ..Self::default()
        }
    }

    pub fn skipped(units_seen: u64, skipped: u64) -> Self {
        Self {
            units_seen,
            skipped,
            ..Self::default()
        }
    }
}

impl AddAssign for RecordOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.units_seen += rhs.units_seen;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
        self.duplicate_skipped += rhs.duplicate_skipped;
    }
}

/// Rule deciding whether a finished run advances the version ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancePolicy {
    /// In-place rewrites: any updated or deliberately skipped record counts
    UpdatedOrSkipped,
    /// Backfills: any inserted or already-present (duplicate) record counts
    InsertedOrDuplicate,
}

impl AdvancePolicy {
    pub fn permits(&self, totals: &RecordOutcome) -> bool {
        match self {
            AdvancePolicy::UpdatedOrSkipped => totals.updated > 0 || totals.skipped > 0,
            AdvancePolicy::InsertedOrDuplicate => {
                totals.updated > 0 || totals.duplicate_skipped > 0
            }
        }
    }
}
