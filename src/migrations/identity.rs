//! # Identity Derivation
//!
//! Deterministic identifiers for backfilled records. The same source scan
//! always maps to the same `event_id`, so a unique index on that field turns
//! a re-run into a stream of duplicate-key rejections instead of duplicates.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike, Utc};
use sha2::{Digest, Sha256};

/// Hex characters kept from each SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 32;

/// Stable identity of one embedded legacy scan
#[derive(Debug, Clone, Copy)]
pub struct ScanIdentity<'a> {
    /// Namespace tag, prefixed to the seed and to the resulting id
    pub namespace: &'a str,
    pub source_id: &'a str,
    /// Position of the scan within its source record
    pub index: usize,
    pub timestamp: ScanTime,
    pub ip: &'a str,
    pub user_agent: &'a str,
}

impl ScanIdentity<'_> {
    /// `<namespace>_<sourceId>_<index>_<timestamp>_<ip>_<userAgent>`
    pub fn seed(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}",
            self.namespace,
            self.source_id,
            self.index,
            self.timestamp.isoformat(),
            self.ip,
            self.user_agent
        )
    }

    /// `<namespace>_` followed by the truncated digest of the seed
    pub fn event_id(&self) -> String {
        format!("{}_{}", self.namespace, digest_prefix(&self.seed()))
    }

    pub fn anonymous_id(&self) -> String {
        anonymous_id(self.ip, self.user_agent)
    }
}

/// Actor fingerprint from network and client fields.
///
/// Falls back to a random id when both are empty; those events are only
/// deduplicated by `event_id`, never by actor.
pub fn anonymous_id(ip: &str, user_agent: &str) -> String {
    if ip.is_empty() && user_agent.is_empty() {
        return uuid::Uuid::new_v4().simple().to_string();
    }
    digest_prefix(&format!("{}{}", ip, user_agent))
}

/// A resolved scan time.
///
/// `offset` is the UTC offset written in the source value, if any. Stored
/// dates, epoch values and offset-less text carry none and render without
/// an offset, exactly as they were first hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTime {
    pub instant: DateTime<Utc>,
    pub offset: Option<FixedOffset>,
}

impl ScanTime {
    /// Wall-clock UTC time with no offset attached
    pub fn naive(instant: DateTime<Utc>) -> Self {
        Self {
            instant,
            offset: None,
        }
    }

    /// Time that carried an explicit offset in its source
    pub fn with_offset(ts: DateTime<FixedOffset>) -> Self {
        Self {
            instant: ts.with_timezone(&Utc),
            offset: Some(*ts.offset()),
        }
    }

    /// ISO-8601 rendering used in identity seeds.
    ///
    /// Fractional seconds appear only when non-zero, at microsecond
    /// precision. The offset, when present, is rendered as `+HH:MM`.
    pub fn isoformat(&self) -> String {
        match self.offset {
            None => isoformat_local(&self.instant.naive_utc(), ""),
            Some(offset) => {
                let local = self.instant.with_timezone(&offset);
                isoformat_local(&local.naive_local(), &local.format("%:z").to_string())
            }
        }
    }
}

fn isoformat_local(local: &NaiveDateTime, suffix: &str) -> String {
    let micros = local.nanosecond() / 1_000;
    if micros == 0 {
        format!("{}{}", local.format("%Y-%m-%dT%H:%M:%S"), suffix)
    } else {
        format!("{}.{:06}{}", local.format("%Y-%m-%dT%H:%M:%S"), micros, suffix)
    }
}

fn digest_prefix(input: &str) -> String {
    let mut hex = hex::encode(Sha256::digest(input.as_bytes()));
    hex.truncate(DIGEST_HEX_LEN);
    hex
}
