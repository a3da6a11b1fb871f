//! Matching configuration.
//!
//! [`MatchingSettings`] is the raw, serde-facing form read from the
//! configuration file. It is validated once into a [`MatchConfig`] before any
//! scoring starts; every invariant the scorer relies on (known fields, known
//! types, weights summing to one, values in range) is checked here.

use patientlink_features::{Calibration, Comparator};
use patientlink_model::{Field, FieldType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Allowed drift of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.80;

const DEFAULT_FIELDS: [(Field, FieldType, f64); 8] = [
    (Field::FirstName, FieldType::Name, 0.15),
    (Field::LastName, FieldType::Name, 0.15),
    (Field::Dob, FieldType::Exact, 0.30),
    (Field::Sex, FieldType::Exact, 0.05),
    (Field::PhoneNumber, FieldType::Phone, 0.05),
    (Field::Address, FieldType::Address, 0.15),
    (Field::City, FieldType::General, 0.05),
    (Field::Zipcode, FieldType::General, 0.10),
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unknown field '{name}' in {section}")]
    UnknownField { name: String, section: &'static str },

    #[error("Field '{field}' has unknown type '{kind}' (expected exact, name, general, address or phone)")]
    UnknownFieldType { field: Field, kind: String },

    #[error("Field '{0}' has a weight but no field type")]
    MissingFieldType(Field),

    #[error("Field '{field}' has invalid weight {weight}")]
    InvalidWeight { field: Field, weight: f64 },

    #[error("Field weights sum to {sum}, expected 1.0")]
    WeightSum { sum: f64 },

    #[error("No weighted fields configured")]
    NoFields,

    #[error("Match threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),

    #[error("Calibration constant '{name}' = {value} is outside [0, 1]")]
    CalibrationOutOfRange { name: &'static str, value: f64 },
}

/// Raw matching section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingSettings {
    /// Field name to weight
    pub field_weights: BTreeMap<String, f64>,
    /// Field name to comparator type
    pub field_types: BTreeMap<String, String>,
    pub match_threshold: f64,
    pub calibration: Calibration,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            field_weights: DEFAULT_FIELDS
                .iter()
                .map(|(field, _, weight)| (field.to_string(), *weight))
                .collect(),
            field_types: DEFAULT_FIELDS
                .iter()
                .map(|(field, field_type, _)| (field.to_string(), field_type.to_string()))
                .collect(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            calibration: Calibration::default(),
        }
    }
}

/// A weighted field with its comparator resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    pub field: Field,
    pub field_type: FieldType,
    pub weight: f64,
    pub comparator: Comparator,
}

/// Validated matching configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    rules: Vec<FieldRule>,
    total_weight: f64,
    threshold: f64,
    calibration: Calibration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        let calibration = Calibration::default();
        let rules = DEFAULT_FIELDS
            .iter()
            .map(|&(field, field_type, weight)| FieldRule {
                field,
                field_type,
                weight,
                comparator: Comparator::for_type(field_type, &calibration),
            })
            .collect();
        Self::from_rules(rules, DEFAULT_MATCH_THRESHOLD, calibration)
    }
}

impl MatchConfig {
    /// Validate typed weights and field types.
    ///
    /// Field types for unweighted fields are accepted and ignored.
    pub fn new(
        weights: impl IntoIterator<Item = (Field, f64)>,
        field_types: impl IntoIterator<Item = (Field, FieldType)>,
        threshold: f64,
        calibration: Calibration,
    ) -> Result<Self, ConfigError> {
        check_threshold(threshold)?;
        for (name, value) in calibration.entries() {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::CalibrationOutOfRange { name, value });
            }
        }

        let weights: BTreeMap<Field, f64> = weights.into_iter().collect();
        let field_types: BTreeMap<Field, FieldType> = field_types.into_iter().collect();
        if weights.is_empty() {
            return Err(ConfigError::NoFields);
        }

        let mut rules = Vec::with_capacity(weights.len());
        for (&field, &weight) in &weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight { field, weight });
            }
            let field_type = *field_types
                .get(&field)
                .ok_or(ConfigError::MissingFieldType(field))?;
            rules.push(FieldRule {
                field,
                field_type,
                weight,
                comparator: Comparator::for_type(field_type, &calibration),
            });
        }

        let sum: f64 = rules.iter().map(|rule| rule.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::WeightSum { sum });
        }

        Ok(Self::from_rules(rules, threshold, calibration))
    }

    fn from_rules(rules: Vec<FieldRule>, threshold: f64, calibration: Calibration) -> Self {
        let total_weight = rules.iter().map(|rule| rule.weight).sum();
        Self {
            rules,
            total_weight,
            threshold,
            calibration,
        }
    }

    /// Same configuration with another acceptance threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, ConfigError> {
        check_threshold(threshold)?;
        self.threshold = threshold;
        Ok(self)
    }

    /// Weighted fields in field order.
    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn rule(&self, field: Field) -> Option<&FieldRule> {
        self.rules.iter().find(|rule| rule.field == field)
    }

    /// Sum of configured weights; 1.0 within [`WEIGHT_TOLERANCE`].
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }
}

impl TryFrom<MatchingSettings> for MatchConfig {
    type Error = ConfigError;

    fn try_from(settings: MatchingSettings) -> Result<Self, Self::Error> {
        let weights = settings
            .field_weights
            .iter()
            .map(|(name, &weight)| Ok((parse_field(name, "field_weights")?, weight)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let field_types = settings
            .field_types
            .iter()
            .map(|(name, kind)| {
                let field = parse_field(name, "field_types")?;
                let field_type = kind
                    .parse::<FieldType>()
                    .map_err(|_| ConfigError::UnknownFieldType {
                        field,
                        kind: kind.clone(),
                    })?;
                Ok((field, field_type))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::new(weights, field_types, settings.match_threshold, settings.calibration)
    }
}

fn parse_field(name: &str, section: &'static str) -> Result<Field, ConfigError> {
    name.parse::<Field>().map_err(|_| ConfigError::UnknownField {
        name: name.to_string(),
        section,
    })
}

fn check_threshold(threshold: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::ThresholdOutOfRange(threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings_validate() {
        let config = MatchConfig::try_from(MatchingSettings::default()).unwrap();
        assert_eq!(config, MatchConfig::default());
        assert_eq!(config.rules().len(), 8);
        assert!((config.total_weight() - 1.0).abs() < WEIGHT_TOLERANCE);
        assert_eq!(config.rule(Field::Dob).map(|r| r.field_type), Some(FieldType::Exact));
    }

    #[test]
    fn test_settings_from_json() {
        let json = r#"{
            "field_weights": {"dob": 0.5, "last_name": 0.3, "first_name": 0.2},
            "field_types": {
                "dob": "exact",
                "last_name": "name",
                "first_name": "name",
                "city": "general"
            },
            "match_threshold": 0.9
        }"#;
        let settings: MatchingSettings = serde_json::from_str(json).unwrap();
        let config = MatchConfig::try_from(settings).unwrap();

        assert_eq!(config.threshold(), 0.9);
        assert_eq!(config.rules().len(), 3);
        assert_eq!(config.calibration(), &Calibration::default());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut settings = MatchingSettings::default();
        settings.field_weights.insert("shoe_size".to_string(), 0.0);
        assert_eq!(
            MatchConfig::try_from(settings),
            Err(ConfigError::UnknownField {
                name: "shoe_size".to_string(),
                section: "field_weights"
            })
        );
    }

    #[test]
    fn test_unknown_field_type_is_rejected() {
        let mut settings = MatchingSettings::default();
        settings.field_types.insert("city".to_string(), "fuzzy".to_string());
        let err = MatchConfig::try_from(settings).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownFieldType {
                field: Field::City,
                kind: "fuzzy".to_string()
            }
        );
        assert!(err.to_string().contains("city"));
    }

    #[test]
    fn test_weighted_field_needs_type() {
        let mut settings = MatchingSettings::default();
        settings.field_types.remove("zipcode");
        assert_eq!(
            MatchConfig::try_from(settings),
            Err(ConfigError::MissingFieldType(Field::Zipcode))
        );
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut settings = MatchingSettings::default();
        settings.field_weights.insert("dob".to_string(), 0.5);
        assert!(matches!(
            MatchConfig::try_from(settings),
            Err(ConfigError::WeightSum { .. })
        ));
    }

    #[test]
    fn test_negative_weight_is_rejected() {
        let result = MatchConfig::new(
            [(Field::Dob, 1.5), (Field::Sex, -0.5)],
            [(Field::Dob, FieldType::Exact), (Field::Sex, FieldType::Exact)],
            0.8,
            Calibration::default(),
        );
        assert_eq!(
            result,
            Err(ConfigError::InvalidWeight {
                field: Field::Sex,
                weight: -0.5
            })
        );
    }

    #[test]
    fn test_ranges_are_checked() {
        let mut settings = MatchingSettings::default();
        settings.match_threshold = 1.2;
        assert_eq!(
            MatchConfig::try_from(settings),
            Err(ConfigError::ThresholdOutOfRange(1.2))
        );

        let mut settings = MatchingSettings::default();
        settings.calibration.phone_partial_match = 2.0;
        assert!(matches!(
            MatchConfig::try_from(settings),
            Err(ConfigError::CalibrationOutOfRange { name: "phone_partial_match", .. })
        ));

        assert!(MatchConfig::default().with_threshold(-0.1).is_err());
        assert_eq!(MatchConfig::default().with_threshold(0.7).unwrap().threshold(), 0.7);
    }

    #[test]
    fn test_empty_weights_are_rejected() {
        let settings = MatchingSettings {
            field_weights: BTreeMap::new(),
            ..Default::default()
        };
        assert_eq!(MatchConfig::try_from(settings), Err(ConfigError::NoFields));
    }
}
