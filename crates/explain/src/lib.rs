//! Explanation generation for linked patient pairs.
//!
//! Converts review flags and score breakdowns into human-readable
//! explanations for the reviewer deciding whether to accept a match.

use patientlink_model::{Field, MatchResult, MatchScore, Patient, ReviewFlag, Signal};
use serde::{Deserialize, Serialize};

/// Scores at or above this are reported as strong matches.
pub const STRONG_MATCH: f64 = 0.95;

/// A structured explanation for one review flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Short summary (1 line)
    pub summary: String,

    /// Detailed explanation (1-2 sentences)
    pub detail: String,

    /// How much reviewer attention this deserves (0.0 - 1.0)
    pub severity: f64,

    /// Evidence items supporting this explanation
    pub evidence: Vec<EvidenceItem>,
}

/// A piece of evidence behind an explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Type of evidence
    pub kind: String,

    /// The specific value or match
    pub value: String,

    /// Optional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Generate explanations for every flag raised on a match.
pub fn explain_match(result: &MatchResult) -> Vec<Explanation> {
    result
        .score
        .flags
        .iter()
        .map(|flag| explain_flag(flag, &result.external, &result.internal))
        .collect()
}

/// Generate the explanation for a single review flag.
pub fn explain_flag(flag: &ReviewFlag, external: &Patient, internal: &Patient) -> Explanation {
    let field = flag.field;
    let ours = external.raw(field);
    let theirs = internal.raw(field);
    let values = EvidenceItem {
        kind: field.to_string(),
        value: format!("'{ours}' / '{theirs}'"),
        context: None,
    };

    match &flag.signal {
        Signal::MissingValue => Explanation {
            summary: format!("No usable {field}"),
            detail: format!(
                "The {field} is empty or could not be parsed on at least one side \
                 ('{ours}' / '{theirs}'), so it contributed nothing to the score."
            ),
            severity: 0.5,
            evidence: vec![values],
        },

        Signal::MiddleNameConfusion => Explanation {
            summary: format!("{} may carry an extra name token", title(field)),
            detail: format!(
                "The leading {field} tokens agree almost exactly while the full values \
                 differ ('{ours}' / '{theirs}'). One record may include an extra {} token.",
                name_part(field)
            ),
            severity: 0.4,
            evidence: vec![values],
        },

        Signal::NameVariant { similarity } => Explanation {
            summary: format!("{} variant", title(field)),
            detail: format!(
                "'{ours}' and '{theirs}' are {:.0}% similar, consistent with a \
                 nickname, abbreviation or typo.",
                similarity * 100.0
            ),
            severity: 0.3,
            evidence: vec![
                values,
                EvidenceItem {
                    kind: "jaro_winkler".to_string(),
                    value: format!("{similarity:.2}"),
                    context: None,
                },
            ],
        },

        Signal::SoundAlike { algorithm, code } => Explanation {
            summary: "Sounds similar".to_string(),
            detail: format!(
                "'{ours}' and '{theirs}' are spelled differently but sound alike. \
                 This is common with transcribed names."
            ),
            severity: 0.6,
            evidence: vec![
                values,
                EvidenceItem {
                    kind: format!("phonetic_{algorithm}"),
                    value: code.clone(),
                    context: Some(format!("Both encode to: {code}")),
                },
            ],
        },

        Signal::PhonePartialMatch => Explanation {
            summary: "Phone area code differs".to_string(),
            detail: format!(
                "The local number matches but the area code does not ('{ours}' / '{theirs}'). \
                 The patient may have moved or kept a number across regions."
            ),
            severity: 0.4,
            evidence: vec![values],
        },

        Signal::PhoneAreaCode => Explanation {
            summary: "Only the phone area code matches".to_string(),
            detail: format!(
                "The phone numbers share an area code and nothing else ('{ours}' / '{theirs}'). \
                 This is weak evidence of the same region."
            ),
            severity: 0.7,
            evidence: vec![values],
        },

        Signal::AddressTokenSet => Explanation {
            summary: "Address reordered".to_string(),
            detail: format!(
                "The addresses contain the same words in a different arrangement \
                 ('{ours}' / '{theirs}')."
            ),
            severity: 0.2,
            evidence: vec![values],
        },
    }
}

/// Per-field evidence for a score: similarity, algorithm and weight.
pub fn explain_breakdown(score: &MatchScore) -> Vec<EvidenceItem> {
    score
        .breakdown
        .iter()
        .map(|(field, entry)| EvidenceItem {
            kind: field.to_string(),
            value: format!("{:.2}", entry.result.similarity),
            context: Some(format!(
                "{} x {:.2} = {:.3}",
                entry.result.algorithm.as_str(),
                entry.weight,
                entry.contribution
            )),
        })
        .collect()
}

/// One-line verdict for a score, followed by any flag labels.
pub fn summarize_match(score: &MatchScore) -> String {
    let level = if !score.meets_threshold {
        "BELOW THRESHOLD"
    } else if score.value >= STRONG_MATCH {
        "STRONG MATCH"
    } else {
        "PROBABLE MATCH"
    };

    let mut summary = format!("{level} ({:.2})", score.value);
    if !score.flags.is_empty() {
        let labels: Vec<String> = score
            .flags
            .iter()
            .map(|flag| format!("{} on {}", flag.signal.label(), flag.field))
            .collect();
        summary.push_str(": ");
        summary.push_str(&labels.join(", "));
    }
    summary
}

fn title(field: Field) -> &'static str {
    match field {
        Field::FirstName => "First name",
        Field::LastName => "Last name",
        Field::Dob => "Date of birth",
        Field::Sex => "Sex",
        Field::PhoneNumber => "Phone number",
        Field::Address => "Address",
        Field::City => "City",
        Field::Zipcode => "Zip code",
    }
}

fn name_part(field: Field) -> &'static str {
    match field {
        Field::FirstName => "given or middle name",
        Field::LastName => "surname",
        _ => "name",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patientlink_model::{Algorithm, FieldBreakdown, FieldSimilarityResult};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn score(value: f64, meets_threshold: bool, flags: Vec<ReviewFlag>) -> MatchScore {
        let mut breakdown = BTreeMap::new();
        breakdown.insert(
            Field::Dob,
            FieldBreakdown {
                result: FieldSimilarityResult::new(1.0, Algorithm::Exact),
                weight: 0.3,
                contribution: 0.3,
            },
        );
        MatchScore {
            value,
            breakdown,
            threshold: 0.8,
            meets_threshold,
            reason: None,
            flags,
        }
    }

    #[test]
    fn test_summary_levels() {
        assert_eq!(summarize_match(&score(1.0, true, vec![])), "STRONG MATCH (1.00)");
        assert_eq!(summarize_match(&score(0.85, true, vec![])), "PROBABLE MATCH (0.85)");
        assert_eq!(summarize_match(&score(0.4, false, vec![])), "BELOW THRESHOLD (0.40)");
    }

    #[test]
    fn test_summary_lists_flags() {
        let flags = vec![ReviewFlag {
            field: Field::PhoneNumber,
            signal: Signal::PhonePartialMatch,
        }];
        assert_eq!(
            summarize_match(&score(0.9, true, flags)),
            "PROBABLE MATCH (0.90): Area Code Differs on phone_number"
        );
    }

    #[test]
    fn test_explain_sound_alike() {
        let external = Patient::new("E-1", "Robert", "Smith", "1980-01-01", "M");
        let internal = Patient::new("I-1", "Rupert", "Smith", "1980-01-01", "M");
        let flag = ReviewFlag {
            field: Field::FirstName,
            signal: Signal::SoundAlike {
                algorithm: "soundex".to_string(),
                code: "R163".to_string(),
            },
        };
        let explanation = explain_flag(&flag, &external, &internal);

        assert!(explanation.detail.contains("sound alike"));
        assert_eq!(explanation.evidence[0].value, "'Robert' / 'Rupert'");
        assert_eq!(explanation.evidence[1].kind, "phonetic_soundex");
    }

    #[test]
    fn test_explain_missing_value_names_field() {
        let external = Patient::new("E-1", "Ann", "Lee", "1980-01-01", "F");
        let internal = Patient::new("I-1", "Ann", "Lee", "1980-01-01", "F");
        let flag = ReviewFlag {
            field: Field::Address,
            signal: Signal::MissingValue,
        };
        assert_eq!(explain_flag(&flag, &external, &internal).summary, "No usable address");
    }

    #[test]
    fn test_explain_extra_name_token_follows_field() {
        let external = Patient::new("E-1", "Maria", "Garcia", "1980-01-01", "F");
        let internal = Patient::new("I-1", "Maria", "Garcia Lopez", "1980-01-01", "F");
        let flag = ReviewFlag {
            field: Field::LastName,
            signal: Signal::MiddleNameConfusion,
        };
        let explanation = explain_flag(&flag, &external, &internal);

        assert_eq!(explanation.summary, "Last name may carry an extra name token");
        assert!(explanation.detail.contains("extra surname token"));
        assert!(!explanation.detail.contains("middle"));
        assert_eq!(explanation.evidence[0].value, "'Garcia' / 'Garcia Lopez'");

        let flag = ReviewFlag {
            field: Field::FirstName,
            signal: Signal::MiddleNameConfusion,
        };
        let explanation = explain_flag(&flag, &internal, &external);
        assert!(explanation.summary.starts_with("First name"));
        assert!(explanation.detail.contains("given or middle name"));
    }

    #[test]
    fn test_breakdown_evidence() {
        let evidence = explain_breakdown(&score(1.0, true, vec![]));
        assert_eq!(
            evidence,
            vec![EvidenceItem {
                kind: "dob".to_string(),
                value: "1.00".to_string(),
                context: Some("exact x 0.30 = 0.300".to_string()),
            }]
        );
    }
}
