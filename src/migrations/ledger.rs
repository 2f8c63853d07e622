//! # Version Ledger
//!
//! Tracks the single latest-applied migration version of a database, stored
//! as one document through a [`VersionStore`].
//!
//! `advance` is last-writer-wins. Nothing stops an older migration from
//! lowering the recorded version; that case is logged, and callers that need
//! monotonic advancement use `advance_if_newer`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::errors::{MigrationError, MigrationResult};
use crate::store::VersionStore;

/// Decimal migration version, e.g. `1.21`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerVersion(f64);

impl LedgerVersion {
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for LedgerVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LedgerVersion {}

impl PartialOrd for LedgerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LedgerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for LedgerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LedgerVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a decimal version", s))?;
        if !value.is_finite() || value.is_sign_negative() {
            return Err(format!("'{}' is not a valid version", s));
        }
        Ok(Self(value))
    }
}

/// The stored ledger document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub version: LedgerVersion,

    /// When the version was last written
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// User/process that wrote it
    #[serde(default)]
    pub updated_by: Option<String>,
}

/// Read/overwrite access to the version ledger
pub struct VersionLedger {
    store: Arc<dyn VersionStore>,
}

impl VersionLedger {
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self { store }
    }

    /// Full ledger document, `None` before the first migration ever ran
    pub fn record(&self) -> MigrationResult<Option<LedgerRecord>> {
        let Some(doc) = self.store.read_ledger()? else {
            return Ok(None);
        };
        serde_json::from_value(doc)
            .map(Some)
            .map_err(|e| MigrationError::Ledger {
                message: e.to_string(),
            })
    }

    /// Current version, `None` before the first migration ever ran
    pub fn read(&self) -> MigrationResult<Option<LedgerVersion>> {
        Ok(self.record()?.map(|r| r.version))
    }

    /// Unconditionally overwrite the stored version
    pub fn advance(&self, version: LedgerVersion) -> MigrationResult<()> {
        // An unreadable previous ledger must not block overwriting it.
        match self.read() {
            Ok(Some(current)) if version < current => {
                warn!(%current, new = %version, "Version ledger moving backwards");
            }
            Err(e) => warn!(error = %e, "Overwriting unreadable version ledger"),
            _ => {}
        }
        self.write(version)
    }

    /// Compare-and-set: write only when `version` is above the stored one.
    ///
    /// Returns whether the ledger was written.
    pub fn advance_if_newer(&self, version: LedgerVersion) -> MigrationResult<bool> {
        if let Some(current) = self.read()? {
            if version <= current {
                info!(%current, requested = %version, "Version ledger already at or past requested version");
                return Ok(false);
            }
        }
        self.write(version)?;
        Ok(true)
    }

    fn write(&self, version: LedgerVersion) -> MigrationResult<()> {
        let record = LedgerRecord {
            version,
            updated_at: Some(Utc::now()),
            updated_by: Some(whoami::username()),
        };
        let doc = serde_json::to_value(&record).map_err(|e| MigrationError::Ledger {
            message: e.to_string(),
        })?;
        self.store.write_ledger(&doc)?;
        Ok(())
    }
}
