use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ReconcileError;

/// Which fields form the identity key when matching against a baseline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KeyShape {
    NameAge,
    NameAgeUnit,
}

impl KeyShape {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NameAge => "name_age",
            Self::NameAgeUnit => "name_age_unit",
        }
    }
}

/// Resolution of two baseline rows that produce the same identity key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    KeepFirst,
    KeepLast,
    Reject,
}

impl DuplicatePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeepFirst => "keep_first",
            Self::KeepLast => "keep_last",
            Self::Reject => "reject",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "keep_first" => Some(Self::KeepFirst),
            "keep_last" => Some(Self::KeepLast),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

/// Per-call reconciliation settings. Nothing here is process-global.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub config_version: u32,
    pub recent_baptism_window_days: u32,
    pub birthday_tolerance_years: u8,
    /// Identity key shared by the change flags and the `Active` carry.
    pub match_key: KeyShape,
    pub duplicate_policy: DuplicatePolicy,
    pub name_aliases: Vec<String>,
    pub unit_aliases: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self::v1()
    }
}

impl ReconcileConfig {
    #[must_use]
    pub fn v1() -> Self {
        Self {
            config_version: 1,
            recent_baptism_window_days: 180,
            birthday_tolerance_years: 1,
            match_key: KeyShape::NameAge,
            duplicate_policy: DuplicatePolicy::KeepFirst,
            name_aliases: vec!["Preferred Name".to_string()],
            unit_aliases: vec!["Current Unit".to_string()],
        }
    }

    /// Validates numeric bounds and alias lists.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Configuration`] when a field is outside its
    /// allowed range.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.config_version == 0 {
            return Err(ReconcileError::Configuration(
                "config_version MUST be >= 1".to_string(),
            ));
        }

        if !(1..=3_650).contains(&self.recent_baptism_window_days) {
            return Err(ReconcileError::Configuration(
                "recent_baptism_window_days MUST be in [1, 3650]".to_string(),
            ));
        }

        if self.birthday_tolerance_years > 3 {
            return Err(ReconcileError::Configuration(
                "birthday_tolerance_years MUST be <= 3".to_string(),
            ));
        }

        for (name, aliases) in [
            ("name_aliases", &self.name_aliases),
            ("unit_aliases", &self.unit_aliases),
        ] {
            if aliases.iter().any(|alias| alias.trim().is_empty()) {
                return Err(ReconcileError::Configuration(format!(
                    "{name} MUST NOT contain blank entries"
                )));
            }
        }

        Ok(())
    }

    /// Decodes and validates a configuration from JSON.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Configuration`] when decoding fails or the
    /// decoded values violate configuration constraints.
    pub fn from_json(value: &Value) -> Result<Self, ReconcileError> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|err| {
            ReconcileError::Configuration(format!("invalid reconcile config JSON payload: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v1_defaults_are_valid() {
        let config = ReconcileConfig::v1();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.recent_baptism_window_days, 180);
        assert_eq!(config.match_key, KeyShape::NameAge);
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = ReconcileConfig::v1();
        config.recent_baptism_window_days = 0;
        assert!(matches!(
            config.validate(),
            Err(ReconcileError::Configuration(_))
        ));
    }

    #[test]
    fn from_json_round_trips_and_validates() {
        let mut value = match serde_json::to_value(ReconcileConfig::v1()) {
            Ok(value) => value,
            Err(err) => panic!("failed to encode config: {err}"),
        };
        assert_eq!(
            ReconcileConfig::from_json(&value),
            Ok(ReconcileConfig::v1())
        );

        value["duplicate_policy"] = json!("reject");
        value["match_key"] = json!("name_age_unit");
        let decoded = match ReconcileConfig::from_json(&value) {
            Ok(config) => config,
            Err(err) => panic!("expected valid config: {err}"),
        };
        assert_eq!(decoded.duplicate_policy, DuplicatePolicy::Reject);
        assert_eq!(decoded.match_key, KeyShape::NameAgeUnit);

        value["name_aliases"] = json!([" "]);
        assert!(ReconcileConfig::from_json(&value).is_err());
    }

    #[test]
    fn duplicate_policy_labels_parse_back() {
        for policy in [
            DuplicatePolicy::KeepFirst,
            DuplicatePolicy::KeepLast,
            DuplicatePolicy::Reject,
        ] {
            assert_eq!(DuplicatePolicy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(DuplicatePolicy::parse("newest"), None);
    }
}
