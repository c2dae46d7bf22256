#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use roster_reconcile_core::{
    format_rfc3339, now_utc, parse_rfc3339_utc, set_active, BaselineInput, Table,
};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use time::macros::format_description;
use time::OffsetDateTime;
use ulid::Ulid;

const SNAPSHOT_MIGRATION_VERSION: i64 = 1;

const SCHEMA_SNAPSHOTS_V1: &str = r"
CREATE TABLE IF NOT EXISTS snapshots (
  snapshot_id TEXT PRIMARY KEY,
  filename TEXT NOT NULL,
  note TEXT,
  generated_at TEXT NOT NULL,
  sort_order INTEGER NOT NULL,
  row_count INTEGER NOT NULL CHECK (row_count >= 0),
  records_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_order
  ON snapshots(sort_order DESC, generated_at DESC);
";

const LIST_ORDER: &str = "ORDER BY sort_order DESC, generated_at DESC, snapshot_id DESC";

pub struct SqliteSnapshotStore {
    conn: Connection,
}

/// Metadata of one stored snapshot. Records are loaded separately.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct SnapshotArtifact {
    pub snapshot_id: Ulid,
    pub filename: String,
    pub note: Option<String>,
    pub generated_at: String,
    pub sort_order: i64,
    pub row_count: usize,
}

impl SnapshotArtifact {
    /// Human label used in notes and logs, e.g. `records.json (id=01J...)`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} (id={})", self.filename, self.snapshot_id)
    }
}

/// Which stored snapshot acts as the baseline of a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineSelection {
    Latest,
    Id(Ulid),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBaseline {
    pub input: BaselineInput,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved,
    Unchanged,
}

impl SqliteSnapshotStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_SNAPSHOTS_V1)
            .context("failed to apply snapshot schema")?;

        let now = format_rfc3339(now_utc()).map_err(|err| anyhow!(err.to_string()))?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![SNAPSHOT_MIGRATION_VERSION, now],
            )
            .context("failed to register snapshot schema migration")?;

        Ok(())
    }

    /// Stores `records` as the new top snapshot.
    ///
    /// A missing or blank `filename` becomes `records_YYYYMMDD_HHMMSS.json`
    /// derived from `generated_at`; any other name is sanitized.
    pub fn save_snapshot(
        &mut self,
        records: &Table,
        filename: Option<&str>,
        note: Option<&str>,
        generated_at: OffsetDateTime,
    ) -> Result<SnapshotArtifact> {
        let filename = match filename.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => sanitize_filename(raw),
            None => default_filename(generated_at)?,
        };
        let generated_at =
            format_rfc3339(generated_at).map_err(|err| anyhow!(err.to_string()))?;
        let records_json =
            serde_json::to_string(&records.to_json()).context("failed to serialize records")?;
        let snapshot_id = Ulid::new();

        let tx = self
            .conn
            .transaction()
            .context("failed to start snapshot transaction")?;
        let sort_order = max_sort_order(&tx)?.map_or(1, |value| value + 1);
        tx.execute(
            "INSERT INTO snapshots(
                snapshot_id, filename, note, generated_at, sort_order, row_count, records_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                snapshot_id.to_string(),
                filename,
                note,
                generated_at,
                sort_order,
                i64::try_from(records.len()).context("row count exceeds i64")?,
                records_json,
            ],
        )
        .context("failed to insert snapshot")?;
        tx.commit().context("failed to commit snapshot transaction")?;

        tracing::info!(%snapshot_id, %filename, rows = records.len(), sort_order, "saved snapshot");

        Ok(SnapshotArtifact {
            snapshot_id,
            filename,
            note: note.map(str::to_string),
            generated_at,
            sort_order,
            row_count: records.len(),
        })
    }

    pub fn list_snapshots(&self) -> Result<Vec<SnapshotArtifact>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT snapshot_id, filename, note, generated_at, sort_order, row_count
                 FROM snapshots {LIST_ORDER}"
            ))
            .context("failed to prepare snapshot listing")?;
        let rows = stmt
            .query_map([], parse_artifact_row)
            .context("failed to list snapshots")?;
        collect_rows(rows)
    }

    pub fn get_snapshot(&self, snapshot_id: Ulid) -> Result<Option<SnapshotArtifact>> {
        self.conn
            .query_row(
                "SELECT snapshot_id, filename, note, generated_at, sort_order, row_count
                 FROM snapshots WHERE snapshot_id = ?1",
                params![snapshot_id.to_string()],
                parse_artifact_row,
            )
            .optional()
            .with_context(|| format!("failed to load snapshot {snapshot_id}"))
    }

    /// The snapshot listed first, i.e. the default baseline.
    pub fn latest_snapshot(&self) -> Result<Option<SnapshotArtifact>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT snapshot_id, filename, note, generated_at, sort_order, row_count
                     FROM snapshots {LIST_ORDER} LIMIT 1"
                ),
                [],
                parse_artifact_row,
            )
            .optional()
            .context("failed to load latest snapshot")
    }

    /// Decodes the stored records of `snapshot_id`.
    pub fn load_records(&self, snapshot_id: Ulid) -> Result<Table> {
        let raw = self.records_json(snapshot_id)?;
        decode_records(&raw).with_context(|| format!("snapshot {snapshot_id} is unreadable"))
    }

    /// Resolves `selection` into a pipeline baseline.
    ///
    /// An unreadable snapshot is not an error: it comes back as
    /// [`BaselineInput::Dropped`] with an `[unreadable]` label. An unknown id is.
    pub fn load_baseline(&self, selection: BaselineSelection) -> Result<LoadedBaseline> {
        let artifact = match selection {
            BaselineSelection::None => None,
            BaselineSelection::Latest => self.latest_snapshot()?,
            BaselineSelection::Id(snapshot_id) => Some(
                self.get_snapshot(snapshot_id)?
                    .ok_or_else(|| anyhow!("snapshot not found: {snapshot_id}"))?,
            ),
        };

        let Some(artifact) = artifact else {
            return Ok(LoadedBaseline {
                input: BaselineInput::Absent,
                label: None,
            });
        };

        let raw = self.records_json(artifact.snapshot_id)?;
        match decode_records(&raw) {
            Ok(table) => Ok(LoadedBaseline {
                input: BaselineInput::Loaded(table),
                label: Some(artifact.label()),
            }),
            Err(err) => {
                tracing::warn!(snapshot_id = %artifact.snapshot_id, error = %err, "baseline snapshot is unreadable");
                Ok(LoadedBaseline {
                    input: BaselineInput::Dropped {
                        reason: format!("snapshot {} is unreadable: {err}", artifact.snapshot_id),
                    },
                    label: Some(format!("{} [unreadable]", artifact.label())),
                })
            }
        }
    }

    /// Returns `false` when nothing was deleted.
    pub fn delete_snapshot(&self, snapshot_id: Ulid) -> Result<bool> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM snapshots WHERE snapshot_id = ?1",
                params![snapshot_id.to_string()],
            )
            .with_context(|| format!("failed to delete snapshot {snapshot_id}"))?;
        if deleted > 0 {
            tracing::info!(%snapshot_id, "deleted snapshot");
        }
        Ok(deleted > 0)
    }

    /// Swaps positions with the neighbour listed directly above.
    pub fn move_up(&mut self, snapshot_id: Ulid) -> Result<MoveOutcome> {
        self.swap_with_neighbour(snapshot_id, Direction::Up)
    }

    /// Swaps positions with the neighbour listed directly below.
    pub fn move_down(&mut self, snapshot_id: Ulid) -> Result<MoveOutcome> {
        self.swap_with_neighbour(snapshot_id, Direction::Down)
    }

    /// Moves the snapshot to the top of the list, making it the default baseline.
    pub fn make_top(&mut self, snapshot_id: Ulid) -> Result<MoveOutcome> {
        let tx = self
            .conn
            .transaction()
            .context("failed to start reorder transaction")?;
        let current = sort_order_of(&tx, snapshot_id)?;
        let max = max_sort_order(&tx)?.unwrap_or(current);
        if current == max {
            return Ok(MoveOutcome::Unchanged);
        }

        set_sort_order(&tx, snapshot_id, max + 1)?;
        tx.commit().context("failed to commit reorder transaction")?;
        tracing::info!(%snapshot_id, sort_order = max + 1, "moved snapshot to top");
        Ok(MoveOutcome::Moved)
    }

    /// Overwrites the stored records of an existing snapshot.
    pub fn replace_records(&self, snapshot_id: Ulid, records: &Table) -> Result<()> {
        let records_json =
            serde_json::to_string(&records.to_json()).context("failed to serialize records")?;
        let updated = self
            .conn
            .execute(
                "UPDATE snapshots SET records_json = ?2, row_count = ?3 WHERE snapshot_id = ?1",
                params![
                    snapshot_id.to_string(),
                    records_json,
                    i64::try_from(records.len()).context("row count exceeds i64")?,
                ],
            )
            .with_context(|| format!("failed to update snapshot {snapshot_id}"))?;
        if updated == 0 {
            return Err(anyhow!("snapshot not found: {snapshot_id}"));
        }
        Ok(())
    }

    /// Edits the manual `Active` status inside the latest snapshot.
    ///
    /// Returns the edited snapshot and the number of updated rows.
    pub fn set_active_on_latest(
        &self,
        unit: &str,
        name: &str,
        age: i64,
        active: bool,
    ) -> Result<(SnapshotArtifact, usize)> {
        let artifact = self
            .latest_snapshot()?
            .ok_or_else(|| anyhow!("no snapshots stored"))?;
        let mut records = self.load_records(artifact.snapshot_id)?;
        let updated = set_active(&mut records, unit, name, age, active)
            .map_err(|err| anyhow!(err.to_string()))?;
        self.replace_records(artifact.snapshot_id, &records)?;
        Ok((artifact, updated))
    }

    fn records_json(&self, snapshot_id: Ulid) -> Result<String> {
        self.conn
            .query_row(
                "SELECT records_json FROM snapshots WHERE snapshot_id = ?1",
                params![snapshot_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to load records of snapshot {snapshot_id}"))?
            .ok_or_else(|| anyhow!("snapshot not found: {snapshot_id}"))
    }

    fn swap_with_neighbour(&mut self, snapshot_id: Ulid, direction: Direction) -> Result<MoveOutcome> {
        let ordered = self.list_snapshots()?;
        let position = ordered
            .iter()
            .position(|artifact| artifact.snapshot_id == snapshot_id)
            .ok_or_else(|| anyhow!("snapshot not found: {snapshot_id}"))?;

        let neighbour = match direction {
            Direction::Up => position.checked_sub(1).and_then(|index| ordered.get(index)),
            Direction::Down => ordered.get(position + 1),
        };
        let Some(neighbour) = neighbour else {
            return Ok(MoveOutcome::Unchanged);
        };
        let current = &ordered[position];

        let tx = self
            .conn
            .transaction()
            .context("failed to start reorder transaction")?;
        set_sort_order(&tx, current.snapshot_id, neighbour.sort_order)?;
        set_sort_order(&tx, neighbour.snapshot_id, current.sort_order)?;
        tx.commit().context("failed to commit reorder transaction")?;

        tracing::debug!(%snapshot_id, ?direction, "reordered snapshot");
        Ok(MoveOutcome::Moved)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// `records_YYYYMMDD_HHMMSS.json` for the given instant.
pub fn default_filename(generated_at: OffsetDateTime) -> Result<String> {
    let stamp = generated_at
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .context("failed to format snapshot timestamp")?;
    Ok(format!("records_{stamp}.json"))
}

/// Keeps ASCII letters, digits, `.`, `_` and `-`; spaces become `_` and
/// everything else is dropped. Leading dots and dashes are stripped and a
/// `.json` extension is enforced.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter_map(|ch| match ch {
            ' ' => Some('_'),
            ch if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') => Some(ch),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '-']);
    let stem = cleaned
        .strip_suffix(".json")
        .or_else(|| cleaned.strip_suffix(".JSON"))
        .unwrap_or(cleaned);
    let stem = if stem.is_empty() { "output" } else { stem };
    format!("{stem}.json")
}

fn decode_records(raw: &str) -> Result<Table> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("records are not valid JSON")?;
    Table::from_json(&value).map_err(|err| anyhow!(err.to_string()))
}

fn parse_artifact_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotArtifact> {
    let snapshot_id_raw: String = row.get(0)?;
    let generated_at: String = row.get(3)?;
    let row_count_i64: i64 = row.get(5)?;

    let snapshot_id = Ulid::from_string(&snapshot_id_raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
    })?;

    parse_rfc3339_utc(&generated_at).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err.to_string(),
            )),
        )
    })?;

    let row_count = usize::try_from(row_count_i64).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Integer,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid row_count: {row_count_i64}"),
            )),
        )
    })?;

    Ok(SnapshotArtifact {
        snapshot_id,
        filename: row.get(1)?,
        note: row.get(2)?,
        generated_at,
        sort_order: row.get(4)?,
        row_count,
    })
}

fn max_sort_order(tx: &Transaction<'_>) -> Result<Option<i64>> {
    tx.query_row("SELECT MAX(sort_order) FROM snapshots", [], |row| row.get(0))
        .context("failed to query max sort_order")
}

fn sort_order_of(tx: &Transaction<'_>, snapshot_id: Ulid) -> Result<i64> {
    tx.query_row(
        "SELECT sort_order FROM snapshots WHERE snapshot_id = ?1",
        params![snapshot_id.to_string()],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("failed to load sort_order of snapshot {snapshot_id}"))?
    .ok_or_else(|| anyhow!("snapshot not found: {snapshot_id}"))
}

fn set_sort_order(tx: &Transaction<'_>, snapshot_id: Ulid, sort_order: i64) -> Result<()> {
    tx.execute(
        "UPDATE snapshots SET sort_order = ?2 WHERE snapshot_id = ?1",
        params![snapshot_id.to_string(), sort_order],
    )
    .with_context(|| format!("failed to update sort_order of snapshot {snapshot_id}"))?;
    Ok(())
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::manual_let_else)]

    use super::*;
    use proptest::prelude::*;
    use roster_reconcile_core::{reconcile, BaselineStatus, CellValue, ReconcileConfig};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn fixture_store() -> SqliteSnapshotStore {
        let store = must(SqliteSnapshotStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn fixture_time(raw: &str) -> OffsetDateTime {
        match parse_rfc3339_utc(raw) {
            Ok(value) => value,
            Err(err) => panic!("invalid fixture timestamp: {err}"),
        }
    }

    fn fixture_table() -> Table {
        match Table::from_json(&json!([
            {"Name": "Amy", "Age": 17, "Unit": "Ward 1", "Active": true},
            {"Name": "Ben", "Age": 40, "Unit": "Ward 2", "Active": false}
        ])) {
            Ok(table) => table,
            Err(err) => panic!("invalid fixture table: {err}"),
        }
    }

    fn save(store: &mut SqliteSnapshotStore, filename: &str) -> SnapshotArtifact {
        must(store.save_snapshot(
            &fixture_table(),
            Some(filename),
            None,
            fixture_time("2026-02-07T12:00:00Z"),
        ))
    }

    fn listed_names(store: &SqliteSnapshotStore) -> Vec<String> {
        must(store.list_snapshots())
            .into_iter()
            .map(|artifact| artifact.filename)
            .collect()
    }

    #[test]
    fn migration_is_idempotent_and_preserves_existing_data() {
        let mut store = fixture_store();
        save(&mut store, "a");
        must(store.migrate());
        assert_eq!(listed_names(&store), ["a.json"]);

        let versions: i64 = match store.connection().query_row(
            "SELECT COUNT(*) FROM schema_migrations",
            [],
            |row| row.get(0),
        ) {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        };
        assert_eq!(versions, 1);
    }

    #[test]
    fn saved_snapshot_round_trips_records() {
        let mut store = fixture_store();
        let artifact = must(store.save_snapshot(
            &fixture_table(),
            None,
            Some("compared to: none"),
            fixture_time("2026-02-07T12:03:04Z"),
        ));

        assert_eq!(artifact.filename, "records_20260207_120304.json");
        assert_eq!(artifact.row_count, 2);
        assert_eq!(artifact.sort_order, 1);
        assert_eq!(must(store.get_snapshot(artifact.snapshot_id)), Some(artifact.clone()));

        let records = must(store.load_records(artifact.snapshot_id));
        assert_eq!(records, fixture_table());
        assert_eq!(records.cell(0, "Active"), &CellValue::Bool(true));
    }

    #[test]
    fn newest_snapshot_is_listed_first_and_is_latest() {
        let mut store = fixture_store();
        save(&mut store, "first");
        let second = save(&mut store, "second");
        assert_eq!(second.sort_order, 2);

        assert_eq!(listed_names(&store), ["second.json", "first.json"]);
        assert_eq!(must(store.latest_snapshot()), Some(second));
    }

    #[test]
    fn reordering_changes_the_default_baseline() {
        let mut store = fixture_store();
        let a = save(&mut store, "a");
        save(&mut store, "b");
        let c = save(&mut store, "c");

        assert_eq!(must(store.move_up(c.snapshot_id)), MoveOutcome::Unchanged);
        assert_eq!(must(store.move_down(c.snapshot_id)), MoveOutcome::Moved);
        assert_eq!(listed_names(&store), ["b.json", "c.json", "a.json"]);

        assert_eq!(must(store.make_top(a.snapshot_id)), MoveOutcome::Moved);
        assert_eq!(listed_names(&store), ["a.json", "b.json", "c.json"]);
        assert_eq!(must(store.make_top(a.snapshot_id)), MoveOutcome::Unchanged);
        assert_eq!(must(store.move_down(c.snapshot_id)), MoveOutcome::Unchanged);

        let latest = must(store.latest_snapshot());
        assert_eq!(latest.map(|artifact| artifact.snapshot_id), Some(a.snapshot_id));
    }

    #[test]
    fn moving_an_unknown_snapshot_fails() {
        let mut store = fixture_store();
        assert!(store.move_up(Ulid::new()).is_err());
        assert!(store.make_top(Ulid::new()).is_err());
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let mut store = fixture_store();
        let artifact = save(&mut store, "a");
        assert!(must(store.delete_snapshot(artifact.snapshot_id)));
        assert!(!must(store.delete_snapshot(artifact.snapshot_id)));
        assert_eq!(must(store.latest_snapshot()), None);
    }

    #[test]
    fn baseline_selection_resolves_latest_by_id_or_none() {
        let mut store = fixture_store();
        assert_eq!(
            must(store.load_baseline(BaselineSelection::Latest)).input,
            BaselineInput::Absent
        );

        let first = save(&mut store, "first");
        save(&mut store, "second");

        let latest = must(store.load_baseline(BaselineSelection::Latest));
        assert!(matches!(latest.input, BaselineInput::Loaded(_)));
        assert!(latest.label.as_deref().is_some_and(|label| label.starts_with("second.json (id=")));

        let chosen = must(store.load_baseline(BaselineSelection::Id(first.snapshot_id)));
        assert_eq!(chosen.label, Some(first.label()));

        let none = must(store.load_baseline(BaselineSelection::None));
        assert_eq!(none.input, BaselineInput::Absent);
        assert_eq!(none.label, None);

        assert!(store.load_baseline(BaselineSelection::Id(Ulid::new())).is_err());
    }

    #[test]
    fn unreadable_baseline_is_dropped_not_fatal() {
        let mut store = fixture_store();
        let artifact = save(&mut store, "broken");
        if let Err(err) = store.connection().execute(
            "UPDATE snapshots SET records_json = 'not json' WHERE snapshot_id = ?1",
            params![artifact.snapshot_id.to_string()],
        ) {
            panic!("test failure: {err}");
        }

        let loaded = must(store.load_baseline(BaselineSelection::Latest));
        assert!(matches!(loaded.input, BaselineInput::Dropped { .. }));
        assert_eq!(loaded.label, Some(format!("{} [unreadable]", artifact.label())));

        let outcome = match reconcile(
            &[fixture_table()],
            loaded.input,
            fixture_time("2026-02-07T12:00:00Z"),
            &ReconcileConfig::v1(),
        ) {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        };
        assert_eq!(outcome.baseline.as_str(), "dropped");
        assert!(matches!(outcome.baseline, BaselineStatus::Dropped { .. }));
    }

    #[test]
    fn active_edit_targets_the_latest_snapshot_only() {
        let mut store = fixture_store();
        let older = save(&mut store, "older");
        let latest = save(&mut store, "latest");

        let (edited, updated) = must(store.set_active_on_latest("Ward 2", "Ben", 40, true));
        assert_eq!(edited.snapshot_id, latest.snapshot_id);
        assert_eq!(updated, 1);

        let records = must(store.load_records(latest.snapshot_id));
        assert_eq!(records.cell(1, "Active"), &CellValue::Bool(true));
        let untouched = must(store.load_records(older.snapshot_id));
        assert_eq!(untouched.cell(1, "Active"), &CellValue::Bool(false));

        assert!(store.set_active_on_latest("Ward 9", "Ben", 40, true).is_err());
    }

    #[test]
    fn replace_records_on_unknown_snapshot_fails() {
        let store = fixture_store();
        assert!(store.replace_records(Ulid::new(), &fixture_table()).is_err());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("March roster"), "March_roster.json");
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd.json");
        assert_eq!(sanitize_filename("report.JSON"), "report.json");
        assert_eq!(sanitize_filename("***"), "output.json");
        assert_eq!(sanitize_filename("-.hidden"), "hidden.json");
    }

    #[test]
    fn blank_filename_falls_back_to_timestamp() {
        let mut store = fixture_store();
        let artifact = must(store.save_snapshot(
            &fixture_table(),
            Some("   "),
            None,
            fixture_time("2025-12-31T23:59:58Z"),
        ));
        assert_eq!(artifact.filename, "records_20251231_235958.json");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_reordering_keeps_a_strict_total_order(ops in prop::collection::vec((0u8..3, 0usize..5), 1..40)) {
            let mut store = fixture_store();
            let ids: Vec<Ulid> = (0..5)
                .map(|index| save(&mut store, &format!("s{index}")).snapshot_id)
                .collect();

            for (op, target) in ops {
                let id = ids[target];
                let _ = match op {
                    0 => must(store.move_up(id)),
                    1 => must(store.move_down(id)),
                    _ => must(store.make_top(id)),
                };
            }

            let listed = must(store.list_snapshots());
            prop_assert_eq!(listed.len(), ids.len());
            let orders: BTreeSet<i64> = listed.iter().map(|artifact| artifact.sort_order).collect();
            prop_assert_eq!(orders.len(), listed.len());
            for pair in listed.windows(2) {
                prop_assert!(pair[0].sort_order > pair[1].sort_order);
            }
            let latest = must(store.latest_snapshot());
            prop_assert_eq!(latest.map(|artifact| artifact.snapshot_id), Some(listed[0].snapshot_id));
        }
    }
}
