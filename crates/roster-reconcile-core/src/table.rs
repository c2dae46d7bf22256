use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::Date;

use crate::ReconcileError;

static MISSING: CellValue = CellValue::Missing;

const ROSTER_DATE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]"),
    format_description!("[year]/[month]/[day]"),
    format_description!("[day padding:none] [month repr:short case_sensitive:false] [year]"),
    format_description!("[day padding:none] [month repr:long case_sensitive:false] [year]"),
    format_description!("[day padding:none]-[month repr:short case_sensitive:false]-[year]"),
    format_description!("[month repr:short case_sensitive:false] [day padding:none], [year]"),
    format_description!("[month repr:long case_sensitive:false] [day padding:none], [year]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
];

/// One loosely typed scalar cell.
///
/// Blank text and JSON `null` both collapse into [`CellValue::Missing`], the
/// only representation of an absent value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Missing,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(Date),
}

impl CellValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Self::Missing
        } else {
            Self::Text(value)
        }
    }

    #[must_use]
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Missing
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Trimmed string form used for every comparison; missing renders as "".
    #[must_use]
    pub fn trimmed(&self) -> String {
        match self {
            Self::Text(value) => value.trim().to_string(),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        !self.trimmed().is_empty()
    }

    /// Whole-year age, truncating fractional values. Non-numeric cells yield `None`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_age(&self) -> Option<i64> {
        let number = match self {
            Self::Number(value) => *value,
            Self::Text(value) => value.trim().parse::<f64>().ok()?,
            Self::Missing | Self::Bool(_) | Self::Date(_) => return None,
        };

        if !number.is_finite() || number.abs() > 1.0e9 {
            return None;
        }
        Some(number.trunc() as i64)
    }

    /// Interprets stored flags and manual status values.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => (*value - 1.0).abs() < f64::EPSILON,
            Self::Text(value) => matches!(
                value.trim().to_lowercase().as_str(),
                "true" | "1" | "yes" | "y" | "t"
            ),
            Self::Missing | Self::Date(_) => false,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(value) => Some(*value),
            Self::Text(value) => parse_roster_date(value),
            Self::Missing | Self::Number(_) | Self::Bool(_) => None,
        }
    }

    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => number.as_f64().map_or(Self::Missing, Self::number),
            Value::String(text) => Self::text(text.as_str()),
            other => Self::text(other.to_string()),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Missing => Value::Null,
            Self::Text(value) => Value::String(value.clone()),
            Self::Bool(value) => Value::Bool(*value),
            Self::Number(value) => integral(*value).map_or_else(
                || Number::from_f64(*value).map_or(Value::Null, Value::Number),
                |whole| Value::Number(Number::from(whole)),
            ),
            Self::Date(_) => Value::String(self.to_string()),
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Text(value) => f.write_str(value),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => match integral(*value) {
                Some(whole) => write!(f, "{whole}"),
                None => write!(f, "{value}"),
            },
            Self::Date(value) => write!(
                f,
                "{:04}-{:02}-{:02}",
                value.year(),
                u8::from(value.month()),
                value.day()
            ),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integral(value: f64) -> Option<i64> {
    if value.fract() == 0.0 && value.abs() < 1.0e15 {
        Some(value as i64)
    } else {
        None
    }
}

/// Parses the date layouts seen in roster exports. Timestamps keep only
/// their date part.
#[must_use]
pub fn parse_roster_date(raw: &str) -> Option<Date> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(date) = ROSTER_DATE_FORMATS
        .iter()
        .find_map(|layout| Date::parse(trimmed, layout).ok())
    {
        return Some(date);
    }

    match (trimmed.get(..10), trimmed.as_bytes().get(10)) {
        (Some(prefix), Some(b'T' | b' ')) => parse_roster_date(prefix),
        _ => None,
    }
}

/// Column-ordered table of loosely typed cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Table {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        let mut table = Self::default();
        for column in columns {
            if !table.has_column(&column) {
                table.columns.push(column);
            }
        }
        table
    }

    /// Builds a table from JSON records; columns follow first appearance.
    #[must_use]
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut table = Self::default();
        for record in records {
            for key in record.keys() {
                if !table.has_column(key) {
                    table.add_column(key, &CellValue::Missing);
                }
            }
            let cells = table
                .columns
                .iter()
                .map(|column| record.get(column).map_or(CellValue::Missing, CellValue::from_json))
                .collect();
            table.rows.push(cells);
        }
        table
    }

    /// Decodes a JSON array of objects.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Validation`] when the payload is not an
    /// array or an element is not an object.
    pub fn from_json(value: &Value) -> Result<Self, ReconcileError> {
        let Value::Array(items) = value else {
            return Err(ReconcileError::Validation(
                "table payload MUST be a JSON array of objects".to_string(),
            ));
        };

        let mut records = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let Value::Object(record) = item else {
                return Err(ReconcileError::Validation(format!(
                    "table row {index} MUST be a JSON object"
                )));
            };
            records.push(record.clone());
        }
        Ok(Self::from_records(&records))
    }

    #[must_use]
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|cells| {
                self.columns
                    .iter()
                    .zip(cells)
                    .map(|(column, cell)| (column.clone(), cell.to_json()))
                    .collect()
            })
            .collect()
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(self.to_records().into_iter().map(Value::Object).collect())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
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
    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        (index < self.rows.len()).then_some(RowRef { table: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'_>> + '_ {
        (0..self.rows.len()).map(move |index| RowRef { table: self, index })
    }

    /// Appends a row; short rows are padded with missing cells.
    pub fn push_row(&mut self, mut cells: Vec<CellValue>) {
        cells.resize(self.columns.len(), CellValue::Missing);
        self.rows.push(cells);
    }

    /// Appends a column filled with `default`; existing columns are left alone.
    pub fn add_column(&mut self, column: &str, default: &CellValue) {
        if self.has_column(column) {
            return;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(default.clone());
        }
    }

    /// Renames `from` to `to` unless `to` already exists.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if self.has_column(to) {
            return false;
        }
        match self.column_index(from) {
            Some(index) => {
                self.columns[index] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Trims header whitespace (including embedded line breaks) and keeps
    /// the first of any columns that collapse onto the same name.
    #[must_use]
    pub fn with_trimmed_headers(&self) -> Self {
        let mut keep = Vec::with_capacity(self.columns.len());
        let mut columns: Vec<String> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let trimmed = column.replace(['\r', '\n'], " ").trim().to_string();
            if columns.contains(&trimmed) {
                keep.push(false);
            } else {
                keep.push(true);
                columns.push(trimmed);
            }
        }

        let rows = self
            .rows
            .iter()
            .map(|cells| {
                cells
                    .iter()
                    .zip(&keep)
                    .filter(|(_, kept)| **kept)
                    .map(|(cell, _)| cell.clone())
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> &CellValue {
        self.column_index(column)
            .and_then(|index| self.rows.get(row).and_then(|cells| cells.get(index)))
            .unwrap_or(&MISSING)
    }

    /// Overwrites one cell. Returns `false` when the row or column is unknown.
    pub fn set_cell(&mut self, row: usize, column: &str, value: CellValue) -> bool {
        let Some(index) = self.column_index(column) else {
            return false;
        };
        match self.rows.get_mut(row).and_then(|cells| cells.get_mut(index)) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Keeps only rows accepted by `predicate`, preserving order.
    #[must_use]
    pub fn filter_rows(&self, predicate: impl Fn(RowRef<'_>) -> bool) -> Self {
        let rows = self
            .rows()
            .filter(|row| predicate(*row))
            .map(|row| self.rows[row.index].clone())
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    pub(crate) fn raw_row(&self, index: usize) -> &[CellValue] {
        self.rows.get(index).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn raw_row_mut(&mut self, index: usize) -> Option<&mut Vec<CellValue>> {
        self.rows.get_mut(index)
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> RowRef<'a> {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn get(&self, column: &str) -> &'a CellValue {
        self.table.cell(self.index, column)
    }

    #[must_use]
    pub fn cells(&self) -> &'a [CellValue] {
        self.table.raw_row(self.index)
    }

    #[must_use]
    pub fn table(&self) -> &'a Table {
        self.table
    }
}
