//! Feature extraction for patient record linkage.
//!
//! Provides pure functions for turning raw roster values into comparable
//! features and comparing them:
//! - Field normalization (names, dates, sex, phones, addresses, zip codes)
//! - String similarity primitives (Levenshtein, Jaro-Winkler, Jaccard, phonetics)
//! - Field comparators selected by [`FieldType`](patientlink_model::FieldType)

pub mod normalize;
pub mod similarity;
pub mod strategy;

pub use normalize::{
    normalize_address, normalize_dob, normalize_patient, normalize_phone, normalize_sex,
    normalize_text, normalize_zip,
};
pub use similarity::{
    compute_phonetics, first_token, jaccard_similarity, jaro_winkler_similarity,
    levenshtein_similarity, phonetic_match, PhoneticCodes,
};
pub use strategy::{Calibration, Comparator};
