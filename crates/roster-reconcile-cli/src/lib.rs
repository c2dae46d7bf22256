//! Command surface of the `roster` binary.
//!
//! Host tools can embed the same behavior through [`run_cli`] for a parsed
//! [`Cli`] or [`run_with_store`] against an already opened
//! [`SqliteSnapshotStore`].

use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use roster_reconcile_core::{
    active_with_next, completed, filter_unit, format_rfc3339, now_utc, parse_rfc3339_utc,
    reconcile, unit_members, units, BaselineStatus, MatchStats, ReconcileConfig, Table,
};
use roster_reconcile_store_sqlite::{
    default_filename, sanitize_filename, BaselineSelection, SnapshotArtifact,
    SqliteSnapshotStore,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use ulid::Ulid;

static LOGGING: Once = Once::new();

#[derive(Debug, Parser)]
#[command(name = "roster")]
#[command(about = "Roster snapshot reconciliation CLI")]
pub struct Cli {
    #[arg(long, global = true, default_value = "./roster.sqlite3")]
    db: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile roster tables against the previous snapshot and store the result.
    Reconcile(ReconcileArgs),
    Snapshots {
        #[command(subcommand)]
        command: SnapshotsCommand,
    },
    /// Print the records of a stored snapshot.
    Export(ExportArgs),
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
    Active {
        #[command(subcommand)]
        command: ActiveCommand,
    },
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// JSON file holding an array of row objects; repeat for several tables.
    #[arg(long = "table", required = true)]
    tables: Vec<PathBuf>,
    #[arg(long, conflicts_with = "no_baseline")]
    baseline_id: Option<String>,
    #[arg(long)]
    no_baseline: bool,
    /// RFC3339 UTC timestamp used as the evaluation instant.
    #[arg(long)]
    now: Option<String>,
    #[arg(long)]
    filename: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotsCommand {
    List(ListArgs),
    Show(IdArgs),
    Delete(IdArgs),
    MoveUp(IdArgs),
    MoveDown(IdArgs),
    MakeTop(IdArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    unit: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    Units,
    Next(UnitFilterArgs),
    Completed(UnitFilterArgs),
    Members(UnitArgs),
}

#[derive(Debug, Args)]
pub struct UnitFilterArgs {
    #[arg(long)]
    unit: Option<String>,
}

#[derive(Debug, Args)]
pub struct UnitArgs {
    #[arg(long)]
    unit: String,
}

#[derive(Debug, Subcommand)]
pub enum ActiveCommand {
    Set(ActiveSetArgs),
}

#[derive(Debug, Args)]
pub struct ActiveSetArgs {
    #[arg(long)]
    unit: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    age: i64,
    #[arg(long, action = ArgAction::Set)]
    active: bool,
}

/// JSON printed by `roster reconcile`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub snapshot_id: Option<Ulid>,
    pub filename: String,
    pub note: String,
    pub generated_at: String,
    pub dry_run: bool,
    pub baseline: BaselineStatus,
    pub stats: MatchStats,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
struct ActiveSetSummary {
    snapshot_id: Ulid,
    updated_rows: usize,
    unit: String,
    name: String,
    age: i64,
    active: bool,
}

/// Installs the stderr `tracing` subscriber once; later calls are no-ops.
///
/// `RUST_LOG` overrides the default `warn` filter.
pub fn init_logging(format: LogFormat) {
    LOGGING.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let mut store = SqliteSnapshotStore::open(&cli.db)?;
    store.migrate()?;
    run_with_store(cli.command, &mut store)
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when input files cannot be read, the pipeline rejects the
/// input, or a store operation fails.
pub fn run_with_store(command: Command, store: &mut SqliteSnapshotStore) -> Result<()> {
    match command {
        Command::Reconcile(args) => {
            let summary = run_reconcile(&args, store)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Snapshots { command } => run_snapshots(command, store),
        Command::Export(args) => {
            let records = load_snapshot_records(store, args.id.as_deref())?;
            let records = match args.unit.as_deref() {
                Some(unit) => filter_unit(&records, unit.trim()),
                None => records,
            };
            println!("{}", serde_json::to_string_pretty(&records.to_json())?);
            Ok(())
        }
        Command::Report { command } => run_report(command, store),
        Command::Active { command } => match command {
            ActiveCommand::Set(args) => {
                let (artifact, updated_rows) =
                    store.set_active_on_latest(&args.unit, &args.name, args.age, args.active)?;
                let summary = ActiveSetSummary {
                    snapshot_id: artifact.snapshot_id,
                    updated_rows,
                    unit: args.unit,
                    name: args.name,
                    age: args.age,
                    active: args.active,
                };
                println!("{}", serde_json::to_string_pretty(&summary)?);
                Ok(())
            }
        },
    }
}

/// Runs one reconciliation and, unless `dry_run` is set, stores the snapshot.
///
/// # Errors
/// Returns an error for unreadable tables or config, an unknown baseline id,
/// a schema error in a source table, or a failed save.
pub fn run_reconcile(
    args: &ReconcileArgs,
    store: &mut SqliteSnapshotStore,
) -> Result<ReconcileSummary> {
    let config = match args.config.as_deref() {
        Some(path) => load_config(path)?,
        None => ReconcileConfig::v1(),
    };
    let now = parse_optional_utc(args.now.as_deref())?;
    let tables = args
        .tables
        .iter()
        .map(|path| load_table(path.as_path()))
        .collect::<Result<Vec<_>>>()?;

    let selection = if args.no_baseline {
        BaselineSelection::None
    } else {
        match args.baseline_id.as_deref() {
            Some(raw) => BaselineSelection::Id(parse_snapshot_id(raw)?),
            None => BaselineSelection::Latest,
        }
    };
    let baseline = store.load_baseline(selection)?;
    let note = format!(
        "compared to: {}",
        baseline.label.as_deref().unwrap_or("none")
    );

    let outcome = reconcile(&tables, baseline.input, now, &config)
        .map_err(|err| anyhow!("reconcile failed: {err}"))?;
    let records = outcome.snapshot.to_table();
    let generated_at = format_rfc3339(now).map_err(|err| anyhow!(err.to_string()))?;

    let (snapshot_id, filename) = if args.dry_run {
        let filename = match args.filename.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => sanitize_filename(raw),
            None => default_filename(now)?,
        };
        (None, filename)
    } else {
        let artifact = store.save_snapshot(&records, args.filename.as_deref(), Some(&note), now)?;
        (Some(artifact.snapshot_id), artifact.filename)
    };

    tracing::info!(
        rows = outcome.stats.rows,
        matched = outcome.stats.matched,
        baseline = outcome.baseline.as_str(),
        dry_run = args.dry_run,
        "reconcile finished"
    );

    Ok(ReconcileSummary {
        snapshot_id,
        filename,
        note,
        generated_at,
        dry_run: args.dry_run,
        baseline: outcome.baseline,
        stats: outcome.stats,
        columns: records.columns().to_vec(),
    })
}

fn run_snapshots(command: SnapshotsCommand, store: &mut SqliteSnapshotStore) -> Result<()> {
    match command {
        SnapshotsCommand::List(args) => {
            let artifacts = store.list_snapshots()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&artifacts)?);
            } else {
                print_snapshot_table(&artifacts);
            }
            Ok(())
        }
        SnapshotsCommand::Show(args) => {
            let snapshot_id = parse_snapshot_id(&args.id)?;
            let Some(artifact) = store.get_snapshot(snapshot_id)? else {
                return Err(anyhow!("snapshot not found: {snapshot_id}"));
            };
            println!("{}", serde_json::to_string_pretty(&artifact)?);
            Ok(())
        }
        SnapshotsCommand::Delete(args) => {
            let snapshot_id = parse_snapshot_id(&args.id)?;
            if !store.delete_snapshot(snapshot_id)? {
                return Err(anyhow!("snapshot not found: {snapshot_id}"));
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "snapshot_id": snapshot_id,
                    "deleted": true,
                }))?
            );
            Ok(())
        }
        SnapshotsCommand::MoveUp(args) => {
            let snapshot_id = parse_snapshot_id(&args.id)?;
            let outcome = store.move_up(snapshot_id)?;
            print_move(snapshot_id, outcome)
        }
        SnapshotsCommand::MoveDown(args) => {
            let snapshot_id = parse_snapshot_id(&args.id)?;
            let outcome = store.move_down(snapshot_id)?;
            print_move(snapshot_id, outcome)
        }
        SnapshotsCommand::MakeTop(args) => {
            let snapshot_id = parse_snapshot_id(&args.id)?;
            let outcome = store.make_top(snapshot_id)?;
            print_move(snapshot_id, outcome)
        }
    }
}

fn run_report(command: ReportCommand, store: &SqliteSnapshotStore) -> Result<()> {
    let records = load_snapshot_records(store, None)?;
    let scoped = |unit: Option<&str>| match unit {
        Some(unit) => filter_unit(&records, unit.trim()),
        None => records.clone(),
    };

    let rendered = match command {
        ReportCommand::Units => serde_json::to_string_pretty(&units(&records))?,
        ReportCommand::Next(args) => {
            serde_json::to_string_pretty(&active_with_next(&scoped(args.unit.as_deref())))?
        }
        ReportCommand::Completed(args) => {
            serde_json::to_string_pretty(&completed(&scoped(args.unit.as_deref())))?
        }
        ReportCommand::Members(args) => {
            serde_json::to_string_pretty(&unit_members(&records, args.unit.trim()))?
        }
    };
    println!("{rendered}");
    Ok(())
}

fn load_snapshot_records(store: &SqliteSnapshotStore, raw_id: Option<&str>) -> Result<Table> {
    let snapshot_id = match raw_id {
        Some(raw) => parse_snapshot_id(raw)?,
        None => {
            store
                .latest_snapshot()?
                .ok_or_else(|| anyhow!("no snapshots stored"))?
                .snapshot_id
        }
    };
    store.load_records(snapshot_id)
}

fn load_table(path: &Path) -> Result<Table> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read table {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("table {} is not valid JSON", path.display()))?;
    Table::from_json(&value).map_err(|err| anyhow!("table {}: {err}", path.display()))
}

fn load_config(path: &Path) -> Result<ReconcileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("config {} is not valid JSON", path.display()))?;
    ReconcileConfig::from_json(&value).map_err(|err| anyhow!("config {}: {err}", path.display()))
}

fn parse_optional_utc(raw: Option<&str>) -> Result<time::OffsetDateTime> {
    match raw {
        Some(value) => {
            parse_rfc3339_utc(value).map_err(|err| anyhow!("invalid --now value: {err}"))
        }
        None => Ok(now_utc()),
    }
}

fn parse_snapshot_id(raw: &str) -> Result<Ulid> {
    Ulid::from_string(raw).map_err(|err| anyhow!("invalid snapshot id {raw}: {err}"))
}

fn print_move(
    snapshot_id: Ulid,
    outcome: roster_reconcile_store_sqlite::MoveOutcome,
) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "snapshot_id": snapshot_id,
            "outcome": outcome,
        }))?
    );
    Ok(())
}

fn print_snapshot_table(artifacts: &[SnapshotArtifact]) {
    if artifacts.is_empty() {
        println!("no snapshots stored");
        return;
    }
    for artifact in artifacts {
        println!(
            "sort_order={} id={} generated_at={} rows={} filename={} note={}",
            artifact.sort_order,
            artifact.snapshot_id,
            artifact.generated_at,
            artifact.row_count,
            artifact.filename,
            artifact.note.as_deref().unwrap_or("n/a")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err:#}"),
        }
    }

    fn fixture_store() -> SqliteSnapshotStore {
        let store = must(SqliteSnapshotStore::open(Path::new(":memory:")));
        must(store.migrate());
        store
    }

    fn write_json(prefix: &str, value: &serde_json::Value) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{prefix}-{}.json", Ulid::new()));
        if let Err(err) = std::fs::write(&path, value.to_string()) {
            panic!("failed to write fixture {}: {err}", path.display());
        }
        path
    }

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(err) => panic!("failed to parse {args:?}: {err}"),
        }
    }

    fn reconcile_args(tables: Vec<PathBuf>, now: &str) -> ReconcileArgs {
        ReconcileArgs {
            tables,
            baseline_id: None,
            no_baseline: false,
            now: Some(now.to_string()),
            filename: None,
            config: None,
            dry_run: false,
        }
    }

    #[test]
    fn global_flags_parse_after_subcommands() {
        let cli = parse(&["roster", "report", "units", "--db", "x.sqlite3", "--log-format", "json"]);
        assert_eq!(cli.db, PathBuf::from("x.sqlite3"));
        assert_eq!(cli.log_format(), LogFormat::Json);
    }

    #[test]
    fn baseline_id_conflicts_with_no_baseline() {
        let parsed = Cli::try_parse_from([
            "roster",
            "reconcile",
            "--table",
            "a.json",
            "--baseline-id",
            "01J0SQQP7M70P6Y3R4T8D8G8M2",
            "--no-baseline",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn active_flag_takes_an_explicit_value() {
        let cli = parse(&[
            "roster", "active", "set", "--unit", "Ward 1", "--name", "Amy", "--age", "18",
            "--active", "false",
        ]);
        match cli.command {
            Command::Active {
                command: ActiveCommand::Set(args),
            } => assert!(!args.active),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn second_run_compares_to_the_first_snapshot() {
        let mut store = fixture_store();
        let members = write_json(
            "members",
            &json!([
                {"Name": "Amy", "Age": 17, "Gender": "F", "Unit": "Ward 1", "Baptism Date": "2015-03-01"}
            ]),
        );

        let first = must(run_reconcile(
            &reconcile_args(vec![members.clone()], "2026-01-01T00:00:00Z"),
            &mut store,
        ));
        assert_eq!(first.note, "compared to: none");
        assert_eq!(first.baseline, BaselineStatus::Absent);
        assert_eq!(first.filename, "records_20260101_000000.json");

        let second = must(run_reconcile(
            &reconcile_args(vec![members], "2026-02-01T00:00:00Z"),
            &mut store,
        ));
        assert_eq!(second.baseline, BaselineStatus::Used { rows: 1 });
        assert_eq!(second.stats.matched, 1);
        let first_id = first.snapshot_id.map(|id| id.to_string()).unwrap_or_default();
        assert!(second.note.contains(&first_id));
        assert_eq!(must(store.list_snapshots()).len(), 2);
    }

    #[test]
    fn dry_run_stores_nothing() {
        let mut store = fixture_store();
        let members = write_json("members", &json!([{"Name": "Amy", "Age": 17}]));
        let mut args = reconcile_args(vec![members], "2026-01-01T00:00:00Z");
        args.dry_run = true;
        args.filename = Some("March export".to_string());

        let summary = must(run_reconcile(&args, &mut store));
        assert_eq!(summary.snapshot_id, None);
        assert_eq!(summary.filename, "March_export.json");
        assert!(must(store.list_snapshots()).is_empty());
    }

    #[test]
    fn schema_error_names_the_table_position() {
        let mut store = fixture_store();
        let good = write_json("good", &json!([{"Name": "Amy", "Age": 17}]));
        let bad = write_json("bad", &json!([{"Name": "Ben"}]));

        let err = match run_reconcile(
            &reconcile_args(vec![good, bad], "2026-01-01T00:00:00Z"),
            &mut store,
        ) {
            Ok(summary) => panic!("expected schema error, got {summary:?}"),
            Err(err) => err.to_string(),
        };
        assert!(err.contains("missing 'Age' column in table 1"), "{err}");
        assert!(must(store.list_snapshots()).is_empty());
    }

    #[test]
    fn unknown_baseline_id_is_rejected() {
        let mut store = fixture_store();
        let members = write_json("members", &json!([{"Name": "Amy", "Age": 17}]));
        let mut args = reconcile_args(vec![members], "2026-01-01T00:00:00Z");
        args.baseline_id = Some(Ulid::new().to_string());
        assert!(run_reconcile(&args, &mut store).is_err());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut store = fixture_store();
        let members = write_json(
            "members",
            &json!([{"Name": "Amy", "Age": 17, "Baptism Date": "2025-12-01"}]),
        );
        let mut config = ReconcileConfig::v1();
        config.recent_baptism_window_days = 10;
        let config_json = match serde_json::to_value(&config) {
            Ok(value) => value,
            Err(err) => panic!("failed to encode config: {err}"),
        };
        let mut args = reconcile_args(vec![members], "2026-01-01T00:00:00Z");
        args.config = Some(write_json("config", &config_json));

        let summary = must(run_reconcile(&args, &mut store));
        let Some(snapshot_id) = summary.snapshot_id else {
            panic!("expected a stored snapshot");
        };
        let records = must(store.load_records(snapshot_id));
        assert_eq!(
            records.cell(0, "Was Baptized Recently"),
            &roster_reconcile_core::CellValue::Bool(false)
        );
    }

    #[test]
    fn invalid_now_is_rejected() {
        assert!(parse_optional_utc(Some("2026-01-01T00:00:00+02:00")).is_err());
        assert!(parse_optional_utc(Some("yesterday")).is_err());
    }
}
