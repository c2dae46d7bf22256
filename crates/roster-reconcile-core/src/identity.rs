use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use crate::columns;
use crate::table::{RowRef, Table};
use crate::{DuplicatePolicy, KeyShape, ReconcileError};

/// Tolerant identity of one roster row: trimmed lowercase name, whole-year
/// age and, for [`KeyShape::NameAgeUnit`], the trimmed unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub name: String,
    pub age: i64,
    pub unit: Option<String>,
}

impl IdentityKey {
    /// Derives the key for `row`. Rows without a numeric age have no key.
    #[must_use]
    pub fn for_row(row: RowRef<'_>, shape: KeyShape) -> Option<Self> {
        let age = row.get(columns::AGE).as_age()?;
        let unit = match shape {
            KeyShape::NameAge => None,
            KeyShape::NameAgeUnit => Some(row.get(columns::UNIT).trimmed()),
        };
        Some(Self {
            name: row.get(columns::NAME).trimmed().to_lowercase(),
            age,
            unit,
        })
    }

    #[must_use]
    pub fn with_age(&self, age: i64) -> Self {
        Self {
            name: self.name.clone(),
            age,
            unit: self.unit.clone(),
        }
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "({}, {}, {unit})", self.name, self.age),
            None => write!(f, "({}, {})", self.name, self.age),
        }
    }
}

/// Lookup from identity key to baseline row.
///
/// Baseline rows are indexed under their recorded age only. A current row of
/// age `A` resolves against `A`, then `A-1`, down to `A - tolerance`, so a
/// person may have aged forward between snapshots but never backward.
#[derive(Debug, Clone)]
pub struct BaselineIndex<'a> {
    baseline: &'a Table,
    shape: KeyShape,
    tolerance_years: i64,
    entries: HashMap<IdentityKey, usize>,
    duplicates: usize,
    unkeyed: usize,
}

impl<'a> BaselineIndex<'a> {
    /// Indexes every keyable baseline row.
    ///
    /// # Errors
    /// Returns [`ReconcileError::DuplicateIdentity`] when `policy` is
    /// [`DuplicatePolicy::Reject`] and two rows share a key.
    pub fn build(
        baseline: &'a Table,
        shape: KeyShape,
        policy: DuplicatePolicy,
        tolerance_years: u8,
    ) -> Result<Self, ReconcileError> {
        let mut entries = HashMap::with_capacity(baseline.len());
        let mut duplicates = 0_usize;
        let mut unkeyed = 0_usize;

        for row in baseline.rows() {
            let Some(key) = IdentityKey::for_row(row, shape) else {
                unkeyed += 1;
                continue;
            };

            if entries.contains_key(&key) {
                duplicates += 1;
                match policy {
                    DuplicatePolicy::KeepFirst => {}
                    DuplicatePolicy::KeepLast => {
                        entries.insert(key, row.index());
                    }
                    DuplicatePolicy::Reject => {
                        return Err(ReconcileError::DuplicateIdentity(format!(
                            "baseline rows share identity key {key} ({})",
                            shape.as_str()
                        )));
                    }
                }
            } else {
                entries.insert(key, row.index());
            }
        }

        if duplicates > 0 {
            tracing::warn!(
                duplicates,
                shape = shape.as_str(),
                policy = policy.as_str(),
                "baseline contains rows with identical identity keys"
            );
        }

        Ok(Self {
            baseline,
            shape,
            tolerance_years: i64::from(tolerance_years),
            entries,
            duplicates,
            unkeyed,
        })
    }

    /// Finds the baseline counterpart of `current`, trying its own age first.
    #[must_use]
    pub fn resolve(&self, current: RowRef<'_>) -> Option<RowRef<'a>> {
        let key = IdentityKey::for_row(current, self.shape)?;
        (0..=self.tolerance_years).find_map(|drift| {
            self.entries
                .get(&key.with_age(key.age - drift))
                .and_then(|&index| self.baseline.row(index))
        })
    }

    #[must_use]
    pub fn shape(&self) -> KeyShape {
        self.shape
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Baseline rows that collided with an already indexed key.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Baseline rows skipped for lack of a numeric age.
    #[must_use]
    pub fn unkeyed(&self) -> usize {
        self.unkeyed
    }
}
