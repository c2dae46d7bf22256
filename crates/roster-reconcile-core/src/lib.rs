//! Roster snapshot reconciliation engine.
//!
//! Merges the source tables of one roster export into a single snapshot,
//! matches every row against the preceding snapshot (the baseline) with an
//! age-tolerant identity key, and derives per-person change flags, the next
//! required ordinance, and the carried-forward `Active` status.
//!
//! The crate performs no I/O. Callers hand in materialized tables, an
//! optional baseline and an explicit `now`; [`reconcile`] returns a new
//! [`Snapshot`] plus diagnostics describing how the baseline was used.

use time::{OffsetDateTime, UtcOffset};

mod active;
mod config;
mod edit;
mod flags;
mod identity;
mod merge;
mod ordinance;
mod pipeline;
mod report;
mod table;

pub use active::{carry_active, ActiveCarry};
pub use config::{DuplicatePolicy, KeyShape, ReconcileConfig};
pub use edit::set_active;
pub use flags::{compute_flags, ChangeFlags, PersonFields};
pub use identity::{BaselineIndex, IdentityKey};
pub use merge::{merge_tables, normalize_headers};
pub use ordinance::{resolve_next_ordinance, Ordinance};
pub use pipeline::{
    reconcile, BaselineInput, BaselineStatus, MatchStats, ReconcileOutcome, Snapshot, SnapshotRow,
};
pub use report::{
    active_with_next, completed, filter_unit, unit_members, units, CompletedEntry, MemberEntry,
    NextOrdinanceEntry,
};
pub use table::{parse_roster_date, CellValue, RowRef, Table};

/// Canonical column names shared by source tables, baselines and snapshots.
pub mod columns {
    pub const NAME: &str = "Name";
    pub const AGE: &str = "Age";
    pub const GENDER: &str = "Gender";
    pub const UNIT: &str = "Unit";
    pub const PRIESTHOOD: &str = "Priesthood";
    pub const BAPTISM_DATE: &str = "Baptism Date";
    pub const ENDOWMENT_DATE: &str = "Endowment Date";
    pub const MARRIAGE_DATE: &str = "Marriage Date";
    pub const SEALED_TO_SPOUSE: &str = "Is Sealed to a Spouse";
    pub const TEMPLE_RECOMMEND: &str = "Temple Recommend Status";
    pub const ACTIVE: &str = "Active";
    pub const NEXT_ORDINANCE: &str = "Next Ordinance";
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ReconcileError {
    #[error("schema error: missing '{column}' column in table {table_index}")]
    Schema { table_index: usize, column: String },
    #[error("duplicate identity in baseline: {0}")]
    DuplicateIdentity(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`ReconcileError::Validation`] when parsing fails or the
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, ReconcileError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| ReconcileError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(ReconcileError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`ReconcileError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, ReconcileError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            ReconcileError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
