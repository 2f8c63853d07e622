//! # QR Scan Backfill (1.22)
//!
//! Scans recorded before analytics events existed live only in each QR
//! code's embedded `scanHistory`. This migration expands every historic scan
//! into an `admin_qr_scan` analytics event.
//!
//! The source is never modified. Event ids are derived from the scan itself,
//! and the sink's unique index on `event_id` makes re-runs skip what is
//! already there.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::batch::BatchWriter;
use super::errors::{MigrationError, MigrationResult, RecordError};
use super::identity::{ScanIdentity, ScanTime};
use super::ledger::LedgerVersion;
use super::{AdvancePolicy, Migration, RecordOutcome, RunContext};
use crate::environment::Environment;
use crate::store::{document_id, Document, DocumentStore};

pub const VERSION: LedgerVersion = LedgerVersion::new(1.22);
pub const QR_COLLECTION: &str = "QR";
pub const EVENTS_COLLECTION: &str = "analytics_events";
pub const EVENT_ID_FIELD: &str = "event_id";
pub const EVENT_TYPE: &str = "admin_qr_scan";
pub const ID_NAMESPACE: &str = "admin_qr_backfill";
pub const SCHEMA_VERSION: u32 = 1;

/// Application fields stamped on every generated event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStamp {
    pub platform: String,
    pub app: String,
    pub app_version: String,
    pub build: String,
}

impl Default for EventStamp {
    fn default() -> Self {
        Self {
            platform: "web".to_string(),
            app: "meridian".to_string(),
            app_version: "0.1.0".to_string(),
            build: "1".to_string(),
        }
    }
}

/// Events produced from one QR code
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub events: Vec<Document>,
    /// Length of the scan history
    pub scans: u64,
    /// Scans dropped for lacking a timestamp
    pub missing_timestamp: u64,
}

/// Expand one QR document into canonical analytics events.
///
/// `now` substitutes for timestamps that are present but unparseable.
pub fn expand_scans(
    qr: &Document,
    stamp: &EventStamp,
    environment: Environment,
    now: DateTime<Utc>,
) -> MigrationResult<Expansion> {
    let history = match qr.get("scanHistory") {
        None | Some(Value::Null) => return Ok(Expansion::default()),
        Some(Value::Array(history)) => history,
        Some(_) => {
            return Err(MigrationError::malformed(
                qr_label(qr),
                "scanHistory is not a list",
            ))
        }
    };

    let source_id = document_id(qr).unwrap_or_default();
    let qr_name = qr.get("name").cloned().unwrap_or(Value::Null);
    let mut expansion = Expansion {
        scans: history.len() as u64,
        ..Expansion::default()
    };

    for (index, scan) in history.iter().enumerate() {
        let scan = scan.as_object().ok_or_else(|| {
            MigrationError::malformed(qr_label(qr), format!("scanHistory[{}] is not an object", index))
        })?;

        let Some(timestamp) = resolve_timestamp(scan.get("timestamp"), now) else {
            expansion.missing_timestamp += 1;
            continue;
        };

        let ip = text_field(scan, "ipAddress");
        let user_agent = text_field(scan, "userAgent");
        let referrer = text_field(scan, "referrer");

        let identity = ScanIdentity {
            namespace: ID_NAMESPACE,
            source_id: &source_id,
            index,
            timestamp,
            ip,
            user_agent,
        };

        let mut context = Map::new();
        if !referrer.is_empty() {
            context.insert("referrer".to_string(), Value::String(referrer.to_string()));
        }

        expansion.events.push(json!({
            "schema_version": SCHEMA_VERSION,
            "event_id": identity.event_id(),
            "event": EVENT_TYPE,
            "ts": timestamp.instant,
            "received_at": timestamp.instant,
            "anonymous_id": identity.anonymous_id(),
            "user_id": null,
            "session_id": uuid::Uuid::new_v4().to_string(),
            "platform": stamp.platform,
            "app": stamp.app,
            "app_version": stamp.app_version,
            "build": stamp.build,
            "env": environment.label(),
            "context": context,
            "properties": { "qr_name": qr_name },
            "ip_hash": null,
            "user_agent_summary": null,
        }));
    }

    Ok(expansion)
}

/// Interpret a scan timestamp.
///
/// Falsy values (missing, null, `false`, `0`, `""`, empty containers) drop
/// the scan. Stored dates (`{"$date": ...}`) and epoch milliseconds resolve
/// to offset-less UTC times. Text is parsed as ISO-8601, keeping any offset
/// it carries, and falls back to an offset-less `now` when it cannot be.
pub fn resolve_timestamp(value: Option<&Value>, now: DateTime<Utc>) -> Option<ScanTime> {
    let value = value?;
    if is_falsy(value) {
        return None;
    }

    let fallback = ScanTime::naive(now);
    let resolved = match value {
        Value::String(s) => parse_iso8601(s).unwrap_or(fallback),
        Value::Number(n) => n.as_i64().and_then(from_millis).unwrap_or(fallback),
        Value::Object(map) => match map.get("$date") {
            Some(Value::String(s)) => parse_iso8601(s)
                .map(|ts| ScanTime::naive(ts.instant))
                .unwrap_or(fallback),
            Some(Value::Number(n)) => n.as_i64().and_then(from_millis).unwrap_or(fallback),
            Some(Value::Object(inner)) => inner
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .and_then(from_millis)
                .unwrap_or(fallback),
            _ => fallback,
        },
        _ => fallback,
    };
    Some(resolved)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn parse_iso8601(text: &str) -> Option<ScanTime> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ScanTime::with_offset(ts));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ScanTime::naive(Utc.from_utc_datetime(&ts)));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ScanTime::naive(Utc.from_utc_datetime(&ts)))
}

fn from_millis(millis: i64) -> Option<ScanTime> {
    DateTime::from_timestamp_millis(millis).map(ScanTime::naive)
}

fn text_field<'a>(scan: &'a Map<String, Value>, key: &str) -> &'a str {
    scan.get(key).and_then(Value::as_str).unwrap_or("")
}

fn qr_label(qr: &Document) -> String {
    qr.get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| document_id(qr))
        .unwrap_or_else(|| "Unknown QR".to_string())
}

/// Migration 1.22: backfill QR scanHistory into analytics_events
#[derive(Debug)]
pub struct QrScanBackfill {
    stamp: EventStamp,
    clock: fn() -> DateTime<Utc>,
}

impl QrScanBackfill {
    pub fn new(stamp: EventStamp) -> Self {
        Self {
            stamp,
            clock: Utc::now,
        }
    }

    /// Replace the clock used for unparseable timestamps
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for QrScanBackfill {
    fn default() -> Self {
        Self::new(EventStamp::default())
    }
}

impl Migration for QrScanBackfill {
    fn version(&self) -> LedgerVersion {
        VERSION
    }

    fn name(&self) -> &'static str {
        "qr-scan-backfill"
    }

    fn description(&self) -> &'static str {
        "Backfill QR scanHistory into analytics_events (admin_qr_scan)"
    }

    fn source_collection(&self) -> &'static str {
        QR_COLLECTION
    }

    fn advance_policy(&self) -> AdvancePolicy {
        AdvancePolicy::InsertedOrDuplicate
    }

    fn preflight(&self, store: &dyn DocumentStore) -> MigrationResult<()> {
        if store.has_unique_index(EVENTS_COLLECTION, EVENT_ID_FIELD)? {
            Ok(())
        } else {
            Err(MigrationError::MissingUniqueIndex {
                collection: EVENTS_COLLECTION.to_string(),
                field: EVENT_ID_FIELD.to_string(),
            })
        }
    }

    fn apply(&self, record: &Document, ctx: &RunContext<'_>) -> Result<RecordOutcome, RecordError> {
        let qr = qr_label(record);
        let expansion = expand_scans(record, &self.stamp, ctx.environment, (self.clock)())?;

        if expansion.missing_timestamp > 0 {
            debug!(qr = %qr, dropped = expansion.missing_timestamp, "Dropped scans without timestamp");
        }

        let mut outcome = RecordOutcome::skipped(expansion.scans, expansion.missing_timestamp);
        if expansion.events.is_empty() {
            return Ok(outcome);
        }

        let writer = BatchWriter::new(ctx.store, EVENTS_COLLECTION, EVENT_ID_FIELD);
        let report = writer.write(&expansion.events).map_err(|e| {
            RecordError::spoiled(e, expansion.scans, expansion.events.len() as u64)
        })?;

        if report.duplicates > 0 {
            warn!(qr = %qr, inserted = report.inserted, duplicates = report.duplicates, "Skipped duplicate scans");
        } else {
            info!(qr = %qr, inserted = report.inserted, "Inserted scans");
        }

        outcome.updated = report.inserted as u64;
        outcome.duplicate_skipped = report.duplicates as u64;
        Ok(outcome)
    }
}
