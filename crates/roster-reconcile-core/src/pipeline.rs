use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::active::carry_active;
use crate::columns;
use crate::flags::{compute_flags, ChangeFlags, PersonFields};
use crate::identity::BaselineIndex;
use crate::merge::{merge_tables, normalize_headers};
use crate::ordinance::{resolve_next_ordinance, Ordinance};
use crate::table::{CellValue, Table};
use crate::{ReconcileConfig, ReconcileError};

/// Baseline handed to [`reconcile`] by the storage layer.
#[derive(Debug, Clone, PartialEq)]
pub enum BaselineInput {
    /// No prior snapshot exists.
    Absent,
    Loaded(Table),
    /// A prior snapshot exists but could not be read.
    Dropped { reason: String },
}

/// How the baseline was used, reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BaselineStatus {
    Absent,
    Used { rows: usize },
    Dropped { reason: String },
}

impl BaselineStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Used { .. } => "used",
            Self::Dropped { .. } => "dropped",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchStats {
    pub rows: usize,
    pub matched: usize,
    pub new_move_ins: usize,
    pub unmatchable_age: usize,
    pub duplicate_keys: usize,
    pub active_carried: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    /// Passthrough cells aligned with [`Snapshot::passthrough_columns`].
    pub cells: Vec<CellValue>,
    pub next_ordinance: Option<Ordinance>,
    pub active: bool,
    pub flags: ChangeFlags,
}

/// Reconciled roster. Produced once per [`reconcile`] call and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    passthrough: Vec<String>,
    rows: Vec<SnapshotRow>,
}

impl Snapshot {
    /// Columns appended after the passthrough set, in output order.
    #[must_use]
    pub fn derived_columns() -> Vec<&'static str> {
        let mut derived = vec![columns::NEXT_ORDINANCE, columns::ACTIVE];
        derived.extend(ChangeFlags::COLUMNS);
        derived
    }

    #[must_use]
    pub fn passthrough_columns(&self) -> &[String] {
        &self.passthrough
    }

    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.passthrough
            .iter()
            .cloned()
            .chain(Self::derived_columns().into_iter().map(str::to_string))
            .collect()
    }

    #[must_use]
    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(self.columns());
        for row in &self.rows {
            let mut cells = row.cells.clone();
            cells.push(
                row.next_ordinance
                    .map_or(CellValue::Missing, |ordinance| CellValue::text(ordinance.as_str())),
            );
            cells.push(CellValue::Bool(row.active));
            cells.extend(row.flags.values().into_iter().map(CellValue::Bool));
            table.push_row(cells);
        }
        table
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        self.to_table().to_json()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub snapshot: Snapshot,
    pub baseline: BaselineStatus,
    pub stats: MatchStats,
}

/// Runs the whole pipeline: merge, match, flag, resolve, carry `Active`.
///
/// Only a schema error in a source table, an invalid `config`, or a
/// duplicate baseline identity under [`crate::DuplicatePolicy::Reject`]
/// aborts the run. Unusable baselines are dropped and reported through
/// [`ReconcileOutcome::baseline`].
///
/// # Errors
/// Returns [`ReconcileError::Schema`], [`ReconcileError::Configuration`] or
/// [`ReconcileError::DuplicateIdentity`] as described above.
pub fn reconcile(
    tables: &[Table],
    baseline: BaselineInput,
    now: OffsetDateTime,
    config: &ReconcileConfig,
) -> Result<ReconcileOutcome, ReconcileError> {
    config.validate()?;

    let merged = merge_tables(tables, config)?;
    let (baseline, baseline_status) = prepare_baseline(baseline, config);

    let baseline_index = baseline
        .as_ref()
        .map(|table| {
            BaselineIndex::build(
                table,
                config.match_key,
                config.duplicate_policy,
                config.birthday_tolerance_years,
            )
        })
        .transpose()?;
    let matches: Vec<_> = merged
        .rows()
        .map(|row| baseline_index.as_ref().and_then(|index| index.resolve(row)))
        .collect();
    let carry = carry_active(&matches);

    let derived = Snapshot::derived_columns();
    let passthrough: Vec<usize> = merged
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, column)| !derived.contains(&column.as_str()))
        .map(|(index, _)| index)
        .collect();

    let mut stats = MatchStats {
        rows: merged.len(),
        duplicate_keys: baseline_index.as_ref().map_or(0, BaselineIndex::duplicates),
        active_carried: carry.carried,
        ..MatchStats::default()
    };

    let mut rows = Vec::with_capacity(merged.len());
    for row in merged.rows() {
        let person = PersonFields::from_row(row);
        if person.age.is_none() {
            stats.unmatchable_age += 1;
        }

        let previous = matches[row.index()];
        let flags = compute_flags(row, previous, now, config.recent_baptism_window_days);
        if flags.new_move_in {
            stats.new_move_ins += 1;
        } else {
            stats.matched += 1;
        }

        let cells = row.cells();
        rows.push(SnapshotRow {
            cells: passthrough.iter().map(|&index| cells[index].clone()).collect(),
            next_ordinance: resolve_next_ordinance(&person),
            active: carry.values[row.index()],
            flags,
        });
    }

    if stats.unmatchable_age > 0 {
        tracing::warn!(
            rows = stats.unmatchable_age,
            "rows without a numeric age were excluded from baseline matching"
        );
    }
    tracing::info!(
        rows = stats.rows,
        matched = stats.matched,
        new_move_ins = stats.new_move_ins,
        active_carried = stats.active_carried,
        baseline = baseline_status.as_str(),
        "reconciled roster snapshot"
    );

    Ok(ReconcileOutcome {
        snapshot: Snapshot {
            passthrough: passthrough
                .iter()
                .map(|&index| merged.columns()[index].clone())
                .collect(),
            rows,
        },
        baseline: baseline_status,
        stats,
    })
}

fn prepare_baseline(
    baseline: BaselineInput,
    config: &ReconcileConfig,
) -> (Option<Table>, BaselineStatus) {
    let status = match baseline {
        BaselineInput::Absent => return (None, BaselineStatus::Absent),
        BaselineInput::Dropped { reason } => BaselineStatus::Dropped { reason },
        BaselineInput::Loaded(table) => {
            let table = normalize_headers(&table, config);
            let missing = [columns::NAME, columns::AGE]
                .into_iter()
                .find(|column| !table.has_column(column));
            match missing {
                None => {
                    let rows = table.len();
                    return (Some(table), BaselineStatus::Used { rows });
                }
                Some(column) => BaselineStatus::Dropped {
                    reason: format!("baseline is missing '{column}' column"),
                },
            }
        }
    };

    if let BaselineStatus::Dropped { reason } = &status {
        tracing::warn!(%reason, "baseline dropped; reconciling without one");
    }
    (None, status)
}
