use crate::columns;
use crate::table::RowRef;

/// `Active` values aligned with the rows of the current table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveCarry {
    pub values: Vec<bool>,
    pub carried: usize,
}

/// Carries the manual `Active` status forward from already resolved matches.
///
/// `matches[i]` is the baseline row matched to current row `i`, the same row
/// the change flags were computed against. Every row defaults to `false`; a
/// matched row takes the baseline `Active` value read as a boolean when the
/// baseline has that column.
#[must_use]
pub fn carry_active(matches: &[Option<RowRef<'_>>]) -> ActiveCarry {
    let mut carry = ActiveCarry {
        values: vec![false; matches.len()],
        carried: 0,
    };

    for (slot, previous) in carry.values.iter_mut().zip(matches.iter().copied()) {
        let Some(previous) = previous.filter(|row| row.table().has_column(columns::ACTIVE)) else {
            continue;
        };
        *slot = previous.get(columns::ACTIVE).is_truthy();
        carry.carried += 1;
    }

    carry
}
