use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::columns;
use crate::table::{parse_roster_date, RowRef};

/// Normalized view of the fields the flag and ordinance rules read.
///
/// Text fields are trimmed, missing values are empty strings, gender is
/// upper-cased and priesthood/sealed status are lower-cased. A date counts as
/// present only when it parses as a roster date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonFields {
    pub age: Option<i64>,
    pub gender: String,
    pub priesthood: String,
    pub baptism_date: String,
    pub endowment_date: String,
    pub marriage_date: String,
    pub sealed: String,
    pub temple_recommend: String,
}

impl PersonFields {
    #[must_use]
    pub fn from_row(row: RowRef<'_>) -> Self {
        Self {
            age: row.get(columns::AGE).as_age(),
            gender: row.get(columns::GENDER).trimmed().to_uppercase(),
            priesthood: row.get(columns::PRIESTHOOD).trimmed().to_lowercase(),
            baptism_date: row.get(columns::BAPTISM_DATE).trimmed(),
            endowment_date: row.get(columns::ENDOWMENT_DATE).trimmed(),
            marriage_date: row.get(columns::MARRIAGE_DATE).trimmed(),
            sealed: row.get(columns::SEALED_TO_SPOUSE).trimmed().to_lowercase(),
            temple_recommend: row.get(columns::TEMPLE_RECOMMEND).trimmed(),
        }
    }

    #[must_use]
    pub fn is_male(&self) -> bool {
        self.gender == "M"
    }

    #[must_use]
    pub fn is_unordained(&self) -> bool {
        self.priesthood.is_empty() || self.priesthood == "unordained"
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed == "yes"
    }

    #[must_use]
    pub fn has_baptism_date(&self) -> bool {
        parse_roster_date(&self.baptism_date).is_some()
    }

    #[must_use]
    pub fn has_endowment_date(&self) -> bool {
        parse_roster_date(&self.endowment_date).is_some()
    }

    #[must_use]
    pub fn has_marriage_date(&self) -> bool {
        parse_roster_date(&self.marriage_date).is_some()
    }

    #[must_use]
    pub fn has_temple_recommend(&self) -> bool {
        !self.temple_recommend.is_empty()
    }

    fn is_adult(&self) -> bool {
        self.age.is_some_and(|age| age >= 18)
    }
}

/// Life-event and eligibility flags for one current row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeFlags {
    pub priesthood_changed: bool,
    pub received_aaronic_priesthood: bool,
    pub received_melchizedek_priesthood: bool,
    pub endowment_date_changed: bool,
    pub marriage_date_changed: bool,
    pub sealed_to_spouse_changed: bool,
    pub temple_recommend_became_filled: bool,
    pub new_move_in: bool,
    pub was_baptized_recently: bool,
    pub needs_deacon_ordination: bool,
    pub needs_melchizedek_ordination: bool,
    pub needs_endowment: bool,
    pub has_recommend_but_no_endowment: bool,
    pub married_not_sealed: bool,
    pub married_not_sealed_but_endowed: bool,
}

impl ChangeFlags {
    /// Output column names, in output order.
    pub const COLUMNS: [&'static str; 15] = [
        "Priesthood Changed",
        "Received Aaronic Priesthood",
        "Received Melchizedek Priesthood",
        "Endowment Date Changed",
        "Marriage Date Changed",
        "Is Sealed to a Spouse Changed",
        "Temple Recommend Became Filled",
        "New Move In",
        "Was Baptized Recently",
        "Needs Deacon Ordination",
        "Needs Melchizedek Ordination",
        "Needs Endowment",
        "Has Recommend but No Endowment",
        "Married Not Sealed",
        "Married Not Sealed but Endowed",
    ];

    /// Flag values aligned with [`ChangeFlags::COLUMNS`].
    #[must_use]
    pub fn values(&self) -> [bool; 15] {
        [
            self.priesthood_changed,
            self.received_aaronic_priesthood,
            self.received_melchizedek_priesthood,
            self.endowment_date_changed,
            self.marriage_date_changed,
            self.sealed_to_spouse_changed,
            self.temple_recommend_became_filled,
            self.new_move_in,
            self.was_baptized_recently,
            self.needs_deacon_ordination,
            self.needs_melchizedek_ordination,
            self.needs_endowment,
            self.has_recommend_but_no_endowment,
            self.married_not_sealed,
            self.married_not_sealed_but_endowed,
        ]
    }
}

/// Derives every flag for `current` given its baseline counterpart, if any.
///
/// Change flags compare trimmed string forms, so missing on both sides is no
/// change. Without a counterpart the row is a move-in and may be flagged as
/// recently baptized when its baptism date falls inside `recent_window_days`
/// before `now`.
#[must_use]
pub fn compute_flags(
    current: RowRef<'_>,
    baseline: Option<RowRef<'_>>,
    now: OffsetDateTime,
    recent_window_days: u32,
) -> ChangeFlags {
    let person = PersonFields::from_row(current);
    let mut flags = ChangeFlags::default();

    if let Some(previous) = baseline {
        flags.priesthood_changed = text_changed(previous, current, columns::PRIESTHOOD);
        flags.endowment_date_changed = text_changed(previous, current, columns::ENDOWMENT_DATE);
        flags.marriage_date_changed = text_changed(previous, current, columns::MARRIAGE_DATE);
        flags.sealed_to_spouse_changed =
            is_yes(previous, columns::SEALED_TO_SPOUSE) != is_yes(current, columns::SEALED_TO_SPOUSE);
        flags.temple_recommend_became_filled = !previous.get(columns::TEMPLE_RECOMMEND).has_value()
            && current.get(columns::TEMPLE_RECOMMEND).has_value();
    } else {
        flags.new_move_in = true;
        let cutoff = now - Duration::days(i64::from(recent_window_days));
        flags.was_baptized_recently = current
            .get(columns::BAPTISM_DATE)
            .as_date()
            .is_some_and(|date| date.midnight().assume_utc() > cutoff);
    }

    if flags.priesthood_changed {
        match person.priesthood.as_str() {
            "melchizedek" => flags.received_melchizedek_priesthood = true,
            "aaronic" => flags.received_aaronic_priesthood = true,
            _ => {}
        }
    }

    if let Some(age) = person.age {
        flags.needs_deacon_ordination = person.is_male() && person.is_unordained() && age >= 12;
        flags.needs_melchizedek_ordination =
            person.is_male() && person.priesthood == "aaronic" && age >= 18;
    }
    flags.needs_endowment = person.is_adult() && !person.has_endowment_date();
    flags.has_recommend_but_no_endowment = flags.needs_endowment && person.has_temple_recommend();
    flags.married_not_sealed = person.has_marriage_date() && !person.is_sealed();
    flags.married_not_sealed_but_endowed = flags.married_not_sealed && person.has_endowment_date();

    flags
}

fn text_changed(previous: RowRef<'_>, current: RowRef<'_>, column: &str) -> bool {
    previous.get(column).trimmed() != current.get(column).trimmed()
}

fn is_yes(row: RowRef<'_>, column: &str) -> bool {
    row.get(column).trimmed().to_lowercase() == "yes"
}
