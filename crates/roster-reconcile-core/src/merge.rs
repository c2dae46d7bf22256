use std::collections::HashMap;

use crate::columns;
use crate::table::{CellValue, RowRef, Table};
use crate::{ReconcileConfig, ReconcileError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AgeKey {
    Years(i64),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MergeKey {
    name: String,
    age: AgeKey,
}

impl MergeKey {
    fn for_row(row: RowRef<'_>) -> Self {
        // 17 and "17.0" join; 17.5 stays distinct from 17.
        let raw = row.get(columns::AGE).trimmed();
        let age = match (row.get(columns::AGE).as_age(), raw.parse::<f64>()) {
            (Some(years), Ok(parsed)) if parsed.fract() == 0.0 => AgeKey::Years(years),
            _ => AgeKey::Raw(raw),
        };
        Self {
            name: row.get(columns::NAME).trimmed(),
            age,
        }
    }
}

/// Trims headers and applies the configured `Name`/`Unit` aliases.
#[must_use]
pub fn normalize_headers(table: &Table, config: &ReconcileConfig) -> Table {
    let mut normalized = table.with_trimmed_headers();
    for alias in &config.name_aliases {
        if normalized.rename_column(alias.trim(), columns::NAME) {
            break;
        }
    }
    for alias in &config.unit_aliases {
        if normalized.rename_column(alias.trim(), columns::UNIT) {
            break;
        }
    }
    normalized
}

/// Full outer join of `tables` on (Name, Age), first non-missing value wins.
///
/// Row order follows first appearance across the input list; columns follow
/// first appearance as well. Rows sharing a key inside one table collapse the
/// same way rows from different tables do.
///
/// # Errors
/// Returns [`ReconcileError::Schema`] naming the first table that lacks a
/// `Name` (or alias) or `Age` column. Nothing is merged in that case.
pub fn merge_tables(tables: &[Table], config: &ReconcileConfig) -> Result<Table, ReconcileError> {
    let mut normalized = Vec::with_capacity(tables.len());
    for (table_index, table) in tables.iter().enumerate() {
        // A unit export with no rows decodes from `[]` without any headers.
        if table.columns().is_empty() && table.is_empty() {
            tracing::debug!(table_index, "skipping empty table without headers");
            continue;
        }
        let table = normalize_headers(table, config);
        for required in [columns::NAME, columns::AGE] {
            if !table.has_column(required) {
                return Err(ReconcileError::Schema {
                    table_index,
                    column: required.to_string(),
                });
            }
        }
        normalized.push(table);
    }

    let mut merged = Table::default();
    let mut positions: HashMap<MergeKey, usize> = HashMap::new();
    let mut collisions = 0_usize;

    for table in &normalized {
        for column in table.columns() {
            merged.add_column(column, &CellValue::Missing);
        }
        let targets: Vec<usize> = table
            .columns()
            .iter()
            .filter_map(|column| merged.column_index(column))
            .collect();

        for row in table.rows() {
            let key = MergeKey::for_row(row);
            if let Some(&position) = positions.get(&key) {
                collisions += 1;
                let Some(existing) = merged.raw_row_mut(position) else {
                    continue;
                };
                for (cell, &target) in row.cells().iter().zip(&targets) {
                    if existing[target].is_missing() && !cell.is_missing() {
                        existing[target] = cell.clone();
                    }
                }
            } else {
                let mut cells = vec![CellValue::Missing; merged.columns().len()];
                for (cell, &target) in row.cells().iter().zip(&targets) {
                    cells[target] = cell.clone();
                }
                positions.insert(key, merged.len());
                merged.push_row(cells);
            }
        }
    }

    tracing::debug!(
        tables = tables.len(),
        rows = merged.len(),
        collisions,
        "merged source tables"
    );

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn table(value: &serde_json::Value) -> Table {
        must_ok(Table::from_json(value))
    }

    #[test]
    fn disjoint_identities_sum_row_counts() {
        let first = table(&json!([
            {"Name": "Amy", "Age": 17},
            {"Name": "Ben", "Age": 40}
        ]));
        let second = table(&json!([
            {"Name": "Cal", "Age": 9},
            {"Name": "Amy", "Age": 18}
        ]));

        let merged = must_ok(merge_tables(&[first, second], &ReconcileConfig::v1()));
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn overlapping_identity_unions_columns() {
        let first = table(&json!([
            {"Name": "Amy", "Age": 17, "Gender": "F"}
        ]));
        let second = table(&json!([
            {"Name": "Amy", "Age": "17", "Baptism Date": "2016-05-01"}
        ]));

        let merged = must_ok(merge_tables(&[first, second], &ReconcileConfig::v1()));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.columns(), ["Name", "Age", "Gender", "Baptism Date"]);
        assert_eq!(merged.cell(0, "Gender"), &CellValue::text("F"));
        assert_eq!(merged.cell(0, "Baptism Date"), &CellValue::text("2016-05-01"));
    }

    #[test]
    fn first_table_wins_conflicts_and_gaps_are_filled() {
        let first = table(&json!([
            {"Name": "Amy", "Age": 17, "Unit": "Ward 1", "Priesthood": null}
        ]));
        let second = table(&json!([
            {"Name": "Amy", "Age": 17, "Unit": "Ward 9", "Priesthood": "aaronic"}
        ]));

        let merged = must_ok(merge_tables(&[first, second], &ReconcileConfig::v1()));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.cell(0, "Unit"), &CellValue::text("Ward 1"));
        assert_eq!(merged.cell(0, "Priesthood"), &CellValue::text("aaronic"));
    }

    #[test]
    fn preferred_name_alias_is_accepted() {
        let first = table(&json!([{"Preferred Name": "Amy", "Age": 17, "Current Unit": "Ward 1"}]));
        let merged = must_ok(merge_tables(&[first], &ReconcileConfig::v1()));
        assert_eq!(merged.columns(), ["Name", "Age", "Unit"]);
    }

    #[test]
    fn missing_age_column_names_table_position() {
        let first = table(&json!([{"Name": "Amy", "Age": 17}]));
        let second = table(&json!([{"Name": "Ben"}]));

        let err = merge_tables(&[first, second], &ReconcileConfig::v1());
        assert_eq!(
            err,
            Err(ReconcileError::Schema {
                table_index: 1,
                column: "Age".to_string(),
            })
        );
    }

    #[test]
    fn missing_name_column_fails_before_age() {
        let first = table(&json!([{"Full Name": "Amy"}]));
        let err = merge_tables(&[first], &ReconcileConfig::v1());
        assert_eq!(
            err,
            Err(ReconcileError::Schema {
                table_index: 0,
                column: "Name".to_string(),
            })
        );
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let merged = must_ok(merge_tables(&[], &ReconcileConfig::v1()));
        assert!(merged.is_empty());
        assert!(merged.columns().is_empty());
    }

    #[test]
    fn headerless_empty_table_contributes_nothing() {
        let empty_unit = table(&json!([]));
        let members = table(&json!([{"Name": "Amy", "Age": 17}]));
        let headless = table(&json!([{"Name": "Ben"}]));

        let merged = must_ok(merge_tables(
            &[empty_unit.clone(), members],
            &ReconcileConfig::v1(),
        ));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.columns(), ["Name", "Age"]);

        assert_eq!(
            merge_tables(&[empty_unit, headless], &ReconcileConfig::v1()),
            Err(ReconcileError::Schema {
                table_index: 1,
                column: "Age".to_string(),
            })
        );
    }

    #[test]
    fn duplicate_rows_inside_one_table_collapse() {
        let first = table(&json!([
            {"Name": "Amy", "Age": 17, "Gender": null},
            {"Name": "Amy", "Age": 17, "Gender": "F"}
        ]));

        let merged = must_ok(merge_tables(&[first], &ReconcileConfig::v1()));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.cell(0, "Gender"), &CellValue::text("F"));
    }
}
