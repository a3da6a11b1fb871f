//! String similarity primitives.
//!
//! All scores are in [0, 1]. None of these functions treat empty input
//! specially beyond keeping the result in range; the comparators in
//! [`crate::strategy`] apply the missing-value policy first.

use rphonetic::{Encoder, Metaphone, Soundex};
use std::collections::BTreeSet;

/// Phonetic encoding results for a name token.
#[derive(Debug, Clone, Default)]
pub struct PhoneticCodes {
    pub soundex: Option<String>,
    pub metaphone: Option<String>,
}

/// Compute phonetic encodings for a name token.
///
/// Only ASCII letters are encoded; anything else yields no codes.
pub fn compute_phonetics(text: &str) -> PhoneticCodes {
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_alphabetic()) {
        return PhoneticCodes::default();
    }

    let upper = text.to_ascii_uppercase();
    let soundex_code = Soundex::default().encode(&upper);
    let metaphone_code = Metaphone::default().encode(&upper);

    PhoneticCodes {
        soundex: if soundex_code.is_empty() { None } else { Some(soundex_code) },
        metaphone: if metaphone_code.is_empty() { None } else { Some(metaphone_code) },
    }
}

/// Check if two name tokens are phonetically similar.
///
/// Returns the algorithm and the shared code.
pub fn phonetic_match(text1: &str, text2: &str) -> Option<(String, String)> {
    let codes1 = compute_phonetics(text1);
    let codes2 = compute_phonetics(text2);

    if let (Some(s1), Some(s2)) = (&codes1.soundex, &codes2.soundex) {
        if s1 == s2 {
            return Some(("soundex".to_string(), s1.clone()));
        }
    }

    if let (Some(m1), Some(m2)) = (&codes1.metaphone, &codes2.metaphone) {
        if m1 == m2 {
            return Some(("metaphone".to_string(), m1.clone()));
        }
    }

    None
}

/// `1 - distance / max(len(a), len(b), 1)` over characters.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count()).max(1);
    let distance = strsim::levenshtein(a, b);
    (1.0 - distance as f64 / longest as f64).clamp(0.0, 1.0)
}

/// Jaro-Winkler similarity with the standard 0.1 prefix scale.
pub fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b).clamp(0.0, 1.0)
}

/// Intersection over union of whitespace tokens. Zero when both are empty.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        return 0.0;
    }
    tokens_a.intersection(&tokens_b).count() as f64 / union as f64
}

/// The first whitespace-delimited token, or the empty string.
pub fn first_token(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}
