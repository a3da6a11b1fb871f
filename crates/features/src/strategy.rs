//! Field comparators.
//!
//! A [`Comparator`] is chosen once per configured field from its
//! [`FieldType`] and the run's [`Calibration`], then applied to every
//! candidate pair. All comparators share one edge policy: an empty or
//! invalid value on either side scores 0.0 and raises
//! [`Signal::MissingValue`]; identical canonical values score 1.0.

use patientlink_model::{Algorithm, FieldSimilarityResult, FieldType, FieldValue, Signal};
use serde::{Deserialize, Serialize};

use crate::similarity::{
    first_token, jaccard_similarity, jaro_winkler_similarity, levenshtein_similarity,
    phonetic_match,
};

/// Digits in a full national phone number.
const NATIONAL_DIGITS: usize = 10;

/// Digits after the area code.
const LOCAL_DIGITS: usize = 7;

/// Tunable bands and multipliers used by the comparators and the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Name similarity at which a first/middle name mix-up is flagged
    pub first_name_middle_name: f64,
    /// Name similarity at which a variant spelling is flagged
    pub first_name_match: f64,
    /// Dampening for general edit-distance similarity
    pub general_multiplier: f64,
    /// Dampening for blended address similarity
    pub address_multiplier: f64,
    /// Share of the token-set signal in the address blend
    pub address_token_weight: f64,
    /// Token-set similarity treated as the same base address
    pub address_base_match: f64,
    /// Credit when only the area code differs
    pub phone_partial_match: f64,
    /// Credit when only the area code agrees
    pub phone_area_code_match: f64,
    /// Phone edit similarity below this counts as no agreement
    pub phone_fallback_floor: f64,
    /// Field similarity below this is named when a score fails
    pub perceptible_floor: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            first_name_middle_name: 0.95,
            first_name_match: 0.85,
            general_multiplier: 0.7,
            address_multiplier: 0.8,
            address_token_weight: 0.5,
            address_base_match: 1.0,
            phone_partial_match: 0.9,
            phone_area_code_match: 0.2,
            phone_fallback_floor: 0.5,
            perceptible_floor: 0.5,
        }
    }
}

impl Calibration {
    /// Named constants, for validation and reporting.
    pub fn entries(&self) -> [(&'static str, f64); 10] {
        [
            ("first_name_middle_name", self.first_name_middle_name),
            ("first_name_match", self.first_name_match),
            ("general_multiplier", self.general_multiplier),
            ("address_multiplier", self.address_multiplier),
            ("address_token_weight", self.address_token_weight),
            ("address_base_match", self.address_base_match),
            ("phone_partial_match", self.phone_partial_match),
            ("phone_area_code_match", self.phone_area_code_match),
            ("phone_fallback_floor", self.phone_fallback_floor),
            ("perceptible_floor", self.perceptible_floor),
        ]
    }
}

/// A field comparator with its calibration baked in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparator {
    Exact,
    Name {
        middle_name_band: f64,
        match_band: f64,
    },
    General {
        multiplier: f64,
    },
    Address {
        token_weight: f64,
        base_match: f64,
        multiplier: f64,
    },
    Phone {
        partial_match: f64,
        area_code_match: f64,
        fallback_floor: f64,
    },
}

impl Comparator {
    pub fn for_type(field_type: FieldType, calibration: &Calibration) -> Self {
        match field_type {
            FieldType::Exact => Self::Exact,
            FieldType::Name => Self::Name {
                middle_name_band: calibration.first_name_middle_name,
                match_band: calibration.first_name_match,
            },
            FieldType::General => Self::General {
                multiplier: calibration.general_multiplier,
            },
            FieldType::Address => Self::Address {
                token_weight: calibration.address_token_weight,
                base_match: calibration.address_base_match,
                multiplier: calibration.address_multiplier,
            },
            FieldType::Phone => Self::Phone {
                partial_match: calibration.phone_partial_match,
                area_code_match: calibration.phone_area_code_match,
                fallback_floor: calibration.phone_fallback_floor,
            },
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Exact => Algorithm::Exact,
            Self::Name { .. } => Algorithm::JaroWinkler,
            Self::General { .. } => Algorithm::Levenshtein,
            Self::Address { .. } => Algorithm::JaccardLevenshtein,
            Self::Phone { .. } => Algorithm::PhoneDigits,
        }
    }

    /// Compare two canonical values.
    pub fn compare(&self, a: &FieldValue, b: &FieldValue) -> FieldSimilarityResult {
        let algorithm = self.algorithm();
        let (Some(a), Some(b)) = (a.as_comparable(), b.as_comparable()) else {
            return FieldSimilarityResult::new(0.0, algorithm).with_signal(Signal::MissingValue);
        };
        if a == b {
            return FieldSimilarityResult::new(1.0, algorithm);
        }

        match *self {
            Self::Exact => FieldSimilarityResult::new(0.0, algorithm),
            Self::Name {
                middle_name_band,
                match_band,
            } => name_similarity(a, b, middle_name_band, match_band),
            Self::General { multiplier } => general_similarity(a, b, multiplier),
            Self::Address {
                token_weight,
                base_match,
                multiplier,
            } => address_similarity(a, b, token_weight, base_match, multiplier),
            Self::Phone {
                partial_match,
                area_code_match,
                fallback_floor,
            } => phone_similarity(a, b, partial_match, area_code_match, fallback_floor),
        }
    }
}

/// Jaro-Winkler over the leading tokens. The bands only label the result.
fn name_similarity(
    a: &str,
    b: &str,
    middle_name_band: f64,
    match_band: f64,
) -> FieldSimilarityResult {
    let (token_a, token_b) = (first_token(a), first_token(b));
    let similarity = jaro_winkler_similarity(token_a, token_b);
    let result = FieldSimilarityResult::new(similarity, Algorithm::JaroWinkler);

    if similarity >= middle_name_band {
        result.with_signal(Signal::MiddleNameConfusion)
    } else if similarity >= match_band {
        result.with_signal(Signal::NameVariant { similarity })
    } else if let Some((algorithm, code)) = phonetic_match(token_a, token_b) {
        result.with_signal(Signal::SoundAlike { algorithm, code })
    } else {
        result
    }
}

fn general_similarity(a: &str, b: &str, multiplier: f64) -> FieldSimilarityResult {
    let edit = levenshtein_similarity(a, b) * multiplier;
    let similarity = if a.contains(' ') || b.contains(' ') {
        edit.max(jaccard_similarity(a, b))
    } else {
        edit
    };
    FieldSimilarityResult::new(similarity, Algorithm::Levenshtein)
}

fn address_similarity(
    a: &str,
    b: &str,
    token_weight: f64,
    base_match: f64,
    multiplier: f64,
) -> FieldSimilarityResult {
    let token_score = jaccard_similarity(a, b);
    if token_score >= base_match {
        return FieldSimilarityResult::new(1.0, Algorithm::JaccardLevenshtein)
            .with_signal(Signal::AddressTokenSet);
    }

    let blended = token_weight * token_score + (1.0 - token_weight) * levenshtein_similarity(a, b);
    FieldSimilarityResult::new(blended * multiplier, Algorithm::JaccardLevenshtein)
}

fn phone_similarity(
    a: &str,
    b: &str,
    partial_match: f64,
    area_code_match: f64,
    fallback_floor: f64,
) -> FieldSimilarityResult {
    if shares_local_number(a, b) {
        return FieldSimilarityResult::new(partial_match, Algorithm::PhoneDigits)
            .with_signal(Signal::PhonePartialMatch);
    }

    let edit = levenshtein_similarity(a, b);
    let edit = if edit >= fallback_floor { edit } else { 0.0 };
    if edit < area_code_match && shares_area_code(a, b) {
        return FieldSimilarityResult::new(area_code_match, Algorithm::PhoneDigits)
            .with_signal(Signal::PhoneAreaCode);
    }
    FieldSimilarityResult::new(edit, Algorithm::PhoneDigits)
}

/// Same seven local digits: either two full numbers differing only in area
/// code, or a local number that is the tail of a full one.
fn shares_local_number(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.len() == NATIONAL_DIGITS && long.len() == NATIONAL_DIGITS {
        let area = NATIONAL_DIGITS - LOCAL_DIGITS;
        return short.get(area..).is_some() && short.get(area..) == long.get(area..);
    }
    short.len() >= LOCAL_DIGITS && short.len() < long.len() && long.ends_with(short)
}

fn shares_area_code(a: &str, b: &str) -> bool {
    let area = NATIONAL_DIGITS - LOCAL_DIGITS;
    if a.len() != NATIONAL_DIGITS || b.len() != NATIONAL_DIGITS {
        return false;
    }
    matches!((a.get(..area), b.get(..area)), (Some(x), Some(y)) if x == y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(field_type: FieldType, a: &str, b: &str) -> FieldSimilarityResult {
        Comparator::for_type(field_type, &Calibration::default())
            .compare(&FieldValue::text(a), &FieldValue::text(b))
    }

    #[test]
    fn test_missing_values_score_zero() {
        for field_type in [
            FieldType::Exact,
            FieldType::Name,
            FieldType::General,
            FieldType::Address,
            FieldType::Phone,
        ] {
            let comparator = Comparator::for_type(field_type, &Calibration::default());
            let result = comparator.compare(&FieldValue::text(""), &FieldValue::text(""));
            assert_eq!(result.similarity, 0.0);
            assert_eq!(result.signal, Some(Signal::MissingValue));

            let result = comparator.compare(&FieldValue::Invalid, &FieldValue::Invalid);
            assert_eq!(result.similarity, 0.0);
        }
    }

    #[test]
    fn test_exact() {
        assert_eq!(compare(FieldType::Exact, "1980-01-01", "1980-01-01").similarity, 1.0);
        assert_eq!(compare(FieldType::Exact, "1980-01-01", "1980-01-02").similarity, 0.0);
        assert_eq!(compare(FieldType::Exact, "m", "f").similarity, 0.0);
    }

    #[test]
    fn test_name_compares_leading_token() {
        let result = compare(FieldType::Name, "john", "john paul");
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.signal, Some(Signal::MiddleNameConfusion));

        let result = compare(FieldType::Name, "smith", "smyth");
        assert!(result.similarity > 0.85 && result.similarity < 0.95);
        assert!(matches!(result.signal, Some(Signal::NameVariant { .. })));

        let result = compare(FieldType::Name, "john", "maria");
        assert!(result.similarity < 0.85);
        assert_eq!(result.signal, None);
    }

    #[test]
    fn test_name_flags_sound_alike() {
        let result = compare(FieldType::Name, "robert", "rupert");
        assert!(result.similarity < 0.85);
        assert!(matches!(result.signal, Some(Signal::SoundAlike { .. })));
    }

    #[test]
    fn test_general_is_dampened() {
        assert_eq!(compare(FieldType::General, "springfield", "springfield").similarity, 1.0);
        let result = compare(FieldType::General, "12345", "12346");
        assert!((result.similarity - 0.8 * 0.7).abs() < 1e-12);
        assert_eq!(compare(FieldType::General, "abc", "xyz").similarity, 0.0);
    }

    #[test]
    fn test_general_uses_tokens_for_multiword_values() {
        let result = compare(FieldType::General, "san jose", "jose san");
        assert_eq!(result.similarity, 1.0);
    }

    #[test]
    fn test_address_token_set_base_match() {
        let result = compare(FieldType::Address, "123 main st", "main st 123");
        assert_eq!(result.similarity, 1.0);
        assert_eq!(result.signal, Some(Signal::AddressTokenSet));
    }

    #[test]
    fn test_address_blend() {
        let result = compare(FieldType::Address, "123 main st", "123 main");
        let expected = (0.5 * (2.0 / 3.0) + 0.5 * (8.0 / 11.0)) * 0.8;
        assert!((result.similarity - expected).abs() < 1e-12);
        assert!(compare(FieldType::Address, "123 main st", "456 elm ave").similarity < 0.15);
    }

    #[test]
    fn test_phone_bands() {
        assert_eq!(compare(FieldType::Phone, "5551234567", "5551234567").similarity, 1.0);

        let area_differs = compare(FieldType::Phone, "5551234567", "4441234567");
        assert_eq!(area_differs.similarity, 0.9);
        assert_eq!(area_differs.signal, Some(Signal::PhonePartialMatch));

        let local_only = compare(FieldType::Phone, "1234567890", "4567890");
        assert_eq!(local_only.similarity, 0.9);

        let typo = compare(FieldType::Phone, "1234567890", "1234567891");
        assert!((typo.similarity - 0.9).abs() < 1e-12);

        let area_only = compare(FieldType::Phone, "5551234567", "5559876543");
        assert_eq!(area_only.similarity, 0.2);
        assert_eq!(area_only.signal, Some(Signal::PhoneAreaCode));

        assert_eq!(compare(FieldType::Phone, "1234567890", "0000000000").similarity, 0.0);
    }
}
