//! Read-side views over a stored snapshot table.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::columns;
use crate::table::{CellValue, RowRef, Table};

const COMPLETION_FLAGS: [&str; 6] = [
    "Received Aaronic Priesthood",
    "Received Melchizedek Priesthood",
    "Endowment Date Changed",
    "Marriage Date Changed",
    "Is Sealed to a Spouse Changed",
    "Was Baptized Recently",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextOrdinanceEntry {
    pub name: String,
    pub unit: String,
    pub age: CellValue,
    pub gender: String,
    pub next_ordinance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct CompletedEntry {
    pub name: String,
    pub unit: String,
    pub age: CellValue,
    pub gender: String,
    pub received_aaronic_priesthood: bool,
    pub received_melchizedek_priesthood: bool,
    pub endowment_date_changed: bool,
    pub marriage_date_changed: bool,
    pub sealed_to_spouse_changed: bool,
    pub was_baptized_recently: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberEntry {
    pub name: String,
    pub age: CellValue,
    pub active: bool,
}

/// Sorted distinct units present in `table`, trimmed so every entry is a
/// valid argument to [`filter_unit`].
#[must_use]
pub fn units(table: &Table) -> Vec<String> {
    if !table.has_column(columns::UNIT) {
        return Vec::new();
    }
    table
        .rows()
        .map(|row| row.get(columns::UNIT).trimmed())
        .filter(|unit| !unit.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Rows whose trimmed unit equals `unit`; empty when the column is absent.
#[must_use]
pub fn filter_unit(table: &Table, unit: &str) -> Table {
    if !table.has_column(columns::UNIT) {
        return table.filter_rows(|_| false);
    }
    table.filter_rows(|row| row.get(columns::UNIT).trimmed() == unit)
}

/// Active people who still have a pending ordinance.
#[must_use]
pub fn active_with_next(table: &Table) -> Vec<NextOrdinanceEntry> {
    if !table.has_column(columns::ACTIVE) || !table.has_column(columns::NEXT_ORDINANCE) {
        return Vec::new();
    }

    table
        .rows()
        .filter(|row| row.get(columns::ACTIVE).is_truthy())
        .filter_map(|row| {
            let next = row.get(columns::NEXT_ORDINANCE).trimmed();
            if next.is_empty() || next.eq_ignore_ascii_case("nan") {
                return None;
            }
            Some(NextOrdinanceEntry {
                name: row.get(columns::NAME).trimmed(),
                unit: row.get(columns::UNIT).trimmed(),
                age: row.get(columns::AGE).clone(),
                gender: row.get(columns::GENDER).trimmed(),
                next_ordinance: next,
            })
        })
        .collect()
}

/// People with at least one completed milestone, regardless of status.
/// Absent flag columns count as false.
#[must_use]
pub fn completed(table: &Table) -> Vec<CompletedEntry> {
    table
        .rows()
        .filter(|row| COMPLETION_FLAGS.iter().any(|flag| row.get(flag).is_truthy()))
        .map(|row| {
            let flag = |name: &str| row.get(name).is_truthy();
            CompletedEntry {
                name: row.get(columns::NAME).trimmed(),
                unit: row.get(columns::UNIT).trimmed(),
                age: row.get(columns::AGE).clone(),
                gender: row.get(columns::GENDER).trimmed(),
                received_aaronic_priesthood: flag(COMPLETION_FLAGS[0]),
                received_melchizedek_priesthood: flag(COMPLETION_FLAGS[1]),
                endowment_date_changed: flag(COMPLETION_FLAGS[2]),
                marriage_date_changed: flag(COMPLETION_FLAGS[3]),
                sealed_to_spouse_changed: flag(COMPLETION_FLAGS[4]),
                was_baptized_recently: flag(COMPLETION_FLAGS[5]),
            }
        })
        .collect()
}

/// Name, age and status of everyone in `unit`.
#[must_use]
pub fn unit_members(table: &Table, unit: &str) -> Vec<MemberEntry> {
    filter_unit(table, unit)
        .rows()
        .map(|row: RowRef<'_>| MemberEntry {
            name: row.get(columns::NAME).trimmed(),
            age: row.get(columns::AGE).clone(),
            active: row.get(columns::ACTIVE).is_truthy(),
        })
        .collect()
}
