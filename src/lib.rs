//! docshift - Versioned migrations and idempotent backfills for document stores
//!
//! Migrations transform a source collection record by record, count every
//! outcome in a four-bucket summary and advance a single version ledger only
//! when a run had effect. Re-running any migration is safe.

pub mod cli;
pub mod config;
pub mod config_validator;
pub mod environment;
pub mod logging;
pub mod migrations;
pub mod store;
