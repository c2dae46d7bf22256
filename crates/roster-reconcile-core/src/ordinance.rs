use serde::{Deserialize, Serialize};

use crate::flags::PersonFields;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Ordinance {
    #[serde(rename = "Baptism")]
    Baptism,
    #[serde(rename = "Aaronic Priesthood Ordination")]
    AaronicPriesthoodOrdination,
    #[serde(rename = "Melchizedek Priesthood Ordination")]
    MelchizedekPriesthoodOrdination,
    #[serde(rename = "Endowment")]
    Endowment,
    #[serde(rename = "Sealing")]
    Sealing,
}

impl Ordinance {
    pub const ALL: [Self; 5] = [
        Self::Baptism,
        Self::AaronicPriesthoodOrdination,
        Self::MelchizedekPriesthoodOrdination,
        Self::Endowment,
        Self::Sealing,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baptism => "Baptism",
            Self::AaronicPriesthoodOrdination => "Aaronic Priesthood Ordination",
            Self::MelchizedekPriesthoodOrdination => "Melchizedek Priesthood Ordination",
            Self::Endowment => "Endowment",
            Self::Sealing => "Sealing",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ordinance| ordinance.as_str() == value.trim())
    }
}

/// Picks the single highest-precedence pending ordinance.
///
/// The ladder is evaluated top to bottom and stops at the first hit:
/// baptism, Aaronic ordination, Melchizedek ordination, endowment, sealing.
/// Every rung after baptism needs a known age.
#[must_use]
pub fn resolve_next_ordinance(person: &PersonFields) -> Option<Ordinance> {
    if !person.has_baptism_date() {
        return Some(Ordinance::Baptism);
    }

    let age = person.age?;

    if person.is_male() && age >= 12 && person.is_unordained() {
        return Some(Ordinance::AaronicPriesthoodOrdination);
    }

    if person.is_male() && age >= 18 && person.priesthood == "aaronic" {
        return Some(Ordinance::MelchizedekPriesthoodOrdination);
    }

    if age >= 18 && !person.has_endowment_date() {
        return Some(Ordinance::Endowment);
    }

    // Only an explicit "no" or a blank counts as unsealed here.
    let unsealed = person.sealed.is_empty() || person.sealed == "no";
    if age >= 18 && unsealed && person.has_marriage_date() {
        return Some(Ordinance::Sealing);
    }

    None
}
