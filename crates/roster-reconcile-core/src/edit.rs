use crate::columns;
use crate::table::{CellValue, Table};
use crate::ReconcileError;

/// Sets the manual `Active` status of one person inside a stored snapshot.
///
/// Unit and name compare as trimmed exact strings and age numerically, so
/// `"18"` and `18.0` both match `18`. Every matching row is updated and the
/// number of updated rows is returned.
///
/// # Errors
/// Returns [`ReconcileError::Validation`] when `Unit`, `Name` or `Age` is
/// missing from the table and [`ReconcileError::NotFound`] when no row
/// matches.
pub fn set_active(
    table: &mut Table,
    unit: &str,
    name: &str,
    age: i64,
    active: bool,
) -> Result<usize, ReconcileError> {
    for required in [columns::UNIT, columns::NAME, columns::AGE] {
        if !table.has_column(required) {
            return Err(ReconcileError::Validation(format!(
                "missing '{required}' column in snapshot"
            )));
        }
    }

    let unit = unit.trim();
    let name = name.trim();
    let targets: Vec<usize> = table
        .rows()
        .filter(|row| {
            row.get(columns::UNIT).trimmed() == unit
                && row.get(columns::NAME).trimmed() == name
                && row.get(columns::AGE).as_age() == Some(age)
        })
        .map(|row| row.index())
        .collect();

    if targets.is_empty() {
        return Err(ReconcileError::NotFound(format!(
            "person not found: {name} (age {age}) in unit {unit}"
        )));
    }

    table.add_column(columns::ACTIVE, &CellValue::Bool(false));
    for &row in &targets {
        table.set_cell(row, columns::ACTIVE, CellValue::Bool(active));
    }

    tracing::debug!(unit, name, age, active, rows = targets.len(), "updated manual status");
    Ok(targets.len())
}
