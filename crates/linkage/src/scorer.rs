//! Weighted aggregation of field similarities into a [`MatchScore`].

use crate::config::MatchConfig;
use patientlink_model::{Field, FieldBreakdown, MatchScore, NormalizedPatient, ReviewFlag};
use std::collections::BTreeMap;

/// Score one (external, internal) pair under `config`.
///
/// The value is the weighted mean of the per-field similarities, divided by
/// the configured total weight so that a pair agreeing on every field scores
/// exactly 1.0. Every weighted field appears in the breakdown.
pub fn score(
    external: &NormalizedPatient,
    internal: &NormalizedPatient,
    config: &MatchConfig,
) -> MatchScore {
    let mut breakdown = BTreeMap::new();
    let mut flags = Vec::new();
    let mut weighted_sum = 0.0;

    for rule in config.rules() {
        let result = rule
            .comparator
            .compare(external.get(rule.field), internal.get(rule.field));
        let contribution = result.similarity * rule.weight;
        weighted_sum += contribution;

        if let Some(signal) = &result.signal {
            flags.push(ReviewFlag {
                field: rule.field,
                signal: signal.clone(),
            });
        }
        breakdown.insert(
            rule.field,
            FieldBreakdown {
                result,
                weight: rule.weight,
                contribution,
            },
        );
    }

    let value = if config.total_weight() > 0.0 {
        (weighted_sum / config.total_weight()).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let threshold = config.threshold();
    let meets_threshold = value >= threshold;
    let reason = (!meets_threshold).then(|| {
        shortfall_reason(value, threshold, &breakdown, config.calibration().perceptible_floor)
    });

    MatchScore {
        value,
        breakdown,
        threshold,
        meets_threshold,
        reason,
        flags,
    }
}

/// Describe a below-threshold score by its weakest fields.
///
/// Fields under the perceptible floor are listed lowest contribution first;
/// when none are that weak, the imperfect field that lost the most weight is
/// named.
fn shortfall_reason(
    value: f64,
    threshold: f64,
    breakdown: &BTreeMap<Field, FieldBreakdown>,
    floor: f64,
) -> String {
    let mut weak: Vec<(&Field, &FieldBreakdown)> = breakdown
        .iter()
        .filter(|(_, entry)| entry.result.similarity < floor)
        .collect();

    if weak.is_empty() {
        weak.extend(
            breakdown
                .iter()
                .filter(|(_, entry)| entry.result.similarity < 1.0)
                .max_by(|a, b| shortfall(a.1).total_cmp(&shortfall(b.1))),
        );
    }
    weak.sort_by(|a, b| a.1.contribution.total_cmp(&b.1.contribution));

    let fields = weak
        .iter()
        .map(|(field, entry)| format!("{field} ({:.2})", entry.result.similarity))
        .collect::<Vec<_>>()
        .join(", ");

    format!("score {value:.3} below threshold {threshold:.3}; weakest: {fields}")
}

/// Weight a field failed to contribute.
fn shortfall(entry: &FieldBreakdown) -> f64 {
    entry.weight - entry.contribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use patientlink_features::{normalize_patient, Calibration};
    use patientlink_model::{FieldType, Patient, Signal};
    use pretty_assertions::assert_eq;

    fn full_patient(id: &str) -> Patient {
        Patient::new(id, "John", "Smith", "1980-01-01", "M")
            .with_phone("555-123-4567")
            .with_address("123 Main St", "Springfield", "12345")
    }

    #[test]
    fn test_identical_records_score_exactly_one() {
        let a = normalize_patient(&full_patient("E-1"));
        let b = normalize_patient(&full_patient("I-1"));
        let result = score(&a, &b, &MatchConfig::default());

        assert_eq!(result.value, 1.0);
        assert!(result.meets_threshold);
        assert_eq!(result.reason, None);
        assert!(result.flags.is_empty());
        assert_eq!(result.breakdown.len(), 8);
    }

    #[test]
    fn test_nothing_in_common_scores_exactly_zero() {
        let a = normalize_patient(&full_patient("E-1"));
        let b = normalize_patient(&Patient::default());
        let result = score(&a, &b, &MatchConfig::default());

        assert_eq!(result.value, 0.0);
        assert!(!result.meets_threshold);
        assert_eq!(result.flags.len(), 8);
        assert!(result
            .flags
            .iter()
            .all(|flag| flag.signal == Signal::MissingValue));
    }

    #[test]
    fn test_breakdown_contributions_sum_to_value() {
        let a = normalize_patient(&full_patient("E-1"));
        let b = normalize_patient(
            &Patient::new("I-1", "Jon", "Smyth", "1980-01-01", "M")
                .with_phone("555-123-4567")
                .with_address("123 Main Street", "Springfield", "12345"),
        );
        let result = score(&a, &b, &MatchConfig::default());

        let sum: f64 = result.breakdown.values().map(|b| b.contribution).sum();
        assert!((sum - result.value).abs() < 1e-9);
        assert!(result.value > 0.9 && result.value < 1.0);
        assert_eq!(result.similarity(Field::Address), Some(1.0));
    }

    #[test]
    fn test_reason_names_weak_fields() {
        let a = normalize_patient(&full_patient("E-1"));
        let b = normalize_patient(&Patient::new("I-1", "John", "Smith", "1980-01-01", "M"));
        let result = score(&a, &b, &MatchConfig::default());

        assert!((result.value - 0.65).abs() < 1e-9);
        assert!(!result.meets_threshold);
        let reason = result.reason.unwrap();
        assert!(reason.contains("address (0.00)"));
        assert!(reason.contains("zipcode"));
        assert!(!reason.contains("dob"));
    }

    #[test]
    fn test_reason_falls_back_to_weakest_field() {
        let a = normalize_patient(&full_patient("E-1"));
        let b = normalize_patient(
            &Patient::new("I-1", "Johnny", "Smith", "1980-01-01", "M")
                .with_phone("555-123-4567")
                .with_address("123 Main St", "Springfield", "12345"),
        );
        let config = MatchConfig::default().with_threshold(1.0).unwrap();
        let result = score(&a, &b, &config);

        assert!(!result.meets_threshold);
        let reason = result.reason.unwrap();
        assert!(reason.ends_with("weakest: first_name (0.93)"), "{reason}");
        assert!(!reason.contains("sex"));
    }

    #[test]
    fn test_reason_skips_perfect_light_fields() {
        let a = normalize_patient(&full_patient("E-1"));
        let b = normalize_patient(
            &Patient::new("I-1", "John", "Smith", "1980-01-01", "M")
                .with_phone("555-123-4567")
                .with_address("123 Main St", "Springfield", "12346"),
        );
        let config = MatchConfig::default().with_threshold(1.0).unwrap();
        let result = score(&a, &b, &config);

        assert_eq!(result.similarity(Field::City), Some(1.0));
        let reason = result.reason.unwrap();
        assert!(reason.ends_with("weakest: zipcode (0.56)"), "{reason}");
    }

    #[test]
    fn test_only_weighted_fields_are_scored() {
        let config = MatchConfig::new(
            [(Field::Dob, 0.6), (Field::LastName, 0.4)],
            [(Field::Dob, FieldType::Exact), (Field::LastName, FieldType::Name)],
            0.5,
            Calibration::default(),
        )
        .unwrap();
        let a = normalize_patient(&full_patient("E-1"));
        let b = normalize_patient(&Patient::new("I-1", "Zed", "Smith", "1980-01-01", "F"));
        let result = score(&a, &b, &config);

        assert_eq!(result.breakdown.len(), 2);
        assert_eq!(result.value, 1.0);
        assert_eq!(result.similarity(Field::FirstName), None);
    }
}
