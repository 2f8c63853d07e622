//! # Role Normalization (1.21)
//!
//! Turns the built-in `admin` and `officer` positions of every organization
//! into custom roles: `isDefault` is cleared and a role color assigned.
//! `owner` and `member` get their default color when they have none.
//! Re-applying to a migrated organization yields the same positions.

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::errors::{MigrationError, RecordError};
use super::ledger::LedgerVersion;
use super::{AdvancePolicy, Migration, RecordOutcome, RunContext};
use crate::store::{document_id, Document};

pub const VERSION: LedgerVersion = LedgerVersion::new(1.21);
pub const ORGS_COLLECTION: &str = "orgs";
pub const POSITIONS_FIELD: &str = "positions";

/// Roles that stop being defaults
pub const PRIVILEGED_ROLES: [&str; 2] = ["admin", "officer"];

/// Color for a privileged role without its own entry
pub const FALLBACK_PRIVILEGED_COLOR: &str = "#a855f7";

fn privileged_color(name: &str) -> &'static str {
    match name {
        "admin" => "#3b82f6",
        "officer" => "#10b981",
        _ => FALLBACK_PRIVILEGED_COLOR,
    }
}

fn default_color(name: &str) -> Option<&'static str> {
    match name {
        "owner" => Some("#dc2626"),
        "member" => Some("#6b7280"),
        _ => None,
    }
}

/// Why an organization was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleSkip {
    NoPositions,
    PositionsNotSequence,
    NoPrivilegedRoles,
}

impl RoleSkip {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleSkip::NoPositions => "no positions array found",
            RoleSkip::PositionsNotSequence => "positions is not a list",
            RoleSkip::NoPrivilegedRoles => "no admin/officer roles found",
        }
    }
}

/// Result of normalizing one organization
#[derive(Debug, Clone, PartialEq)]
pub enum Normalization {
    Skip(RoleSkip),
    /// Full replacement positions sequence
    Rewrite(Vec<Value>),
}

/// Compute the normalized positions of an organization document.
///
/// Positions that are not objects make the whole record malformed.
pub fn normalize_positions(org: &Document) -> Result<Normalization, MigrationError> {
    let Some(positions) = org.get(POSITIONS_FIELD) else {
        return Ok(Normalization::Skip(RoleSkip::NoPositions));
    };
    let Some(positions) = positions.as_array() else {
        return Ok(Normalization::Skip(RoleSkip::PositionsNotSequence));
    };

    let roles = positions
        .iter()
        .enumerate()
        .map(|(i, pos)| {
            pos.as_object().ok_or_else(|| {
                MigrationError::malformed(
                    org_label(org),
                    format!("positions[{}] is not an object", i),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let has_privileged = roles
        .iter()
        .any(|role| role_name(role).is_some_and(|name| PRIVILEGED_ROLES.contains(&name)));
    if !has_privileged {
        return Ok(Normalization::Skip(RoleSkip::NoPrivilegedRoles));
    }

    Ok(Normalization::Rewrite(
        roles.into_iter().map(normalize_role).collect(),
    ))
}

fn normalize_role(role: &Map<String, Value>) -> Value {
    let mut updated = role.clone();
    match role_name(role) {
        Some(name) if PRIVILEGED_ROLES.contains(&name) => {
            updated.insert("isDefault".to_string(), Value::Bool(false));
            updated.insert(
                "color".to_string(),
                Value::String(privileged_color(name).to_string()),
            );
        }
        Some(name) => {
            if let (Some(color), false) = (default_color(name), has_color(role)) {
                updated.insert("color".to_string(), Value::String(color.to_string()));
            }
        }
        None => {}
    }
    Value::Object(updated)
}

fn role_name(role: &Map<String, Value>) -> Option<&str> {
    role.get("name").and_then(Value::as_str)
}

fn has_color(role: &Map<String, Value>) -> bool {
    role.get("color")
        .and_then(Value::as_str)
        .is_some_and(|c| !c.is_empty())
}

fn org_label(org: &Document) -> String {
    org.get("org_name")
        .or_else(|| org.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| document_id(org))
        .unwrap_or_else(|| "Unknown Org".to_string())
}

/// Migration 1.21: admin/officer to custom roles with colors
#[derive(Debug, Default)]
pub struct RoleNormalization;

impl Migration for RoleNormalization {
    fn version(&self) -> LedgerVersion {
        VERSION
    }

    fn name(&self) -> &'static str {
        "roles-to-custom"
    }

    fn description(&self) -> &'static str {
        "Convert admin/officer roles to custom roles with colors"
    }

    fn source_collection(&self) -> &'static str {
        ORGS_COLLECTION
    }

    fn advance_policy(&self) -> AdvancePolicy {
        AdvancePolicy::UpdatedOrSkipped
    }

    fn apply(&self, record: &Document, ctx: &RunContext<'_>) -> Result<RecordOutcome, RecordError> {
        let org = org_label(record);

        let positions = match normalize_positions(record)? {
            Normalization::Skip(reason) => {
                debug!(org = %org, reason = reason.as_str(), "Skipping organization");
                return Ok(RecordOutcome::skipped(0, 1));
            }
            Normalization::Rewrite(positions) => positions,
        };

        let id = document_id(record)
            .ok_or_else(|| MigrationError::malformed(org.as_str(), "document has no _id"))?;
        let units = positions.len() as u64;

        ctx.store
            .set_field(ORGS_COLLECTION, &id, POSITIONS_FIELD, Value::Array(positions))
            .map_err(|e| RecordError::spoiled(e.into(), units, 1))?;

        info!(org = %org, positions = units, "Updated organization roles");
        Ok(RecordOutcome::updated(units, 1))
    }
}
