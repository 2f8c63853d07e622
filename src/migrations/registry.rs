//! Known migrations, ordered by version

use super::ledger::LedgerVersion;
use super::qr_backfill::{EventStamp, QrScanBackfill};
use super::roles::RoleNormalization;
use super::Migration;

/// Set of migrations selectable by name or version
pub struct Registry {
    migrations: Vec<Box<dyn Migration>>,
}

impl Registry {
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Self {
        migrations.sort_by_key(|m| m.version());
        Self { migrations }
    }

    /// The migrations shipped with docshift
    pub fn standard(stamp: EventStamp) -> Self {
        Self::new(vec![
            Box::new(RoleNormalization),
            Box::new(QrScanBackfill::new(stamp)),
        ])
    }

    /// Look up by name (`roles-to-custom`) or by version (`1.21`)
    pub fn resolve(&self, key: &str) -> Option<&dyn Migration> {
        let key = key.trim();
        let version = key.parse::<LedgerVersion>().ok();
        self.migrations
            .iter()
            .map(Box::as_ref)
            .find(|m| m.name() == key || Some(m.version()) == version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Migration> {
        self.migrations.iter().map(Box::as_ref)
    }
}
