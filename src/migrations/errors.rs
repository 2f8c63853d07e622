//! # Migration Errors
//!
//! Two levels of failure:
//!
//! - [`MigrationError`]: anything that can go wrong. Fatal when it happens
//!   before the record loop (configuration, gate, preflight, scan).
//! - [`RecordError`]: one record's failure inside the loop. Carries how many
//!   units it spoiled so the runner can bucket it under `errored` and move on.

use thiserror::Error;

use crate::store::{BulkWriteError, StoreError};

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Migration error types
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Environment selector is not one of the known targets
    #[error("Invalid environment selector '{selector}': expected 'd' (development) or 'p' (production)")]
    InvalidEnvironment { selector: String },

    /// Production confirmation was missing or did not match
    #[error("Aborted: {reason}")]
    Aborted { reason: String },

    /// The sink has no unique index the backfill depends on
    #[error("Collection '{collection}' has no unique index on '{field}'; create it before running this migration")]
    MissingUniqueIndex { collection: String, field: String },

    /// Source document has an unexpected shape
    #[error("Malformed record '{record}': {reason}")]
    MalformedRecord { record: String, reason: String },

    /// Bulk write failed for a reason other than duplicate keys
    #[error("Write to '{collection}' failed: {reason}")]
    WriteFailed { collection: String, reason: String },

    /// Stored ledger document cannot be interpreted
    #[error("Version ledger is unreadable: {message}")]
    Ledger { message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrationError {
    pub fn malformed(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            record: record.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failed(collection: &str, err: &BulkWriteError) -> Self {
        Self::WriteFailed {
            collection: collection.to_string(),
            reason: err.to_string(),
        }
    }

    /// Whether this error happened before any write could occur
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidEnvironment { .. }
                | Self::Aborted { .. }
                | Self::MissingUniqueIndex { .. }
        )
    }
}

/// Failure of a single source record.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct RecordError {
    #[source]
    pub source: MigrationError,
    /// Units (positions, scans) seen in the record before it failed
    pub units_seen: u64,
    /// Units counted under `errored`
    pub errored: u64,
}

impl RecordError {
    /// Whole-record failure counted as a single error
    pub fn single(source: MigrationError) -> Self {
        Self {
            source,
            units_seen: 0,
            errored: 1,
        }
    }

    /// Failure that spoils `errored` units (e.g. a whole batch of events)
    pub fn spoiled(source: MigrationError, units_seen: u64, errored: u64) -> Self {
        Self {
            source,
            units_seen,
            errored,
        }
    }
}

impl From<MigrationError> for RecordError {
    fn from(err: MigrationError) -> Self {
        Self::single(err)
    }
}
