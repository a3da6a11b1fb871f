//! Canonical forms for raw roster values.
//!
//! Every function here is total and idempotent. Input that cannot be
//! canonicalized degrades to [`FieldValue::Invalid`] or an empty string,
//! both of which compare as "no agreement" downstream.

use chrono::{Datelike, NaiveDate};
use patientlink_model::{FieldValue, NormalizedPatient, Patient};

/// Accepted date-of-birth layouts, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%d-%b-%Y",
    "%Y%m%d",
];

/// Plausible birth years. Anything outside is a parse accident (`1/2/80`).
const BIRTH_YEARS: std::ops::RangeInclusive<i32> = 1850..=2200;

const UNIT_DESIGNATORS: &[&str] = &["apt", "apartment", "suite", "ste", "unit", "#", "rm", "room"];

const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("street", "st"),
    ("stret", "st"),
    ("avenue", "ave"),
    ("boulevard", "blvd"),
    ("drive", "dr"),
    ("place", "pl"),
    ("court", "ct"),
    ("lane", "ln"),
    ("road", "rd"),
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
];

/// Normalize free text (names, city) for comparison.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a date of birth to `YYYY-MM-DD`.
pub fn normalize_dob(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return FieldValue::Invalid;
    }

    parse_date(trimmed)
        // date-time exports: "1980-01-01T00:00:00", "1980-01-01 00:00"
        .or_else(|| trimmed.split(['T', ' ']).next().and_then(parse_date))
        .filter(|date| BIRTH_YEARS.contains(&date.year()))
        .map(|date| FieldValue::Text(date.format("%Y-%m-%d").to_string()))
        .unwrap_or(FieldValue::Invalid)
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

/// Normalize sex to `m` / `f`.
pub fn normalize_sex(raw: &str) -> FieldValue {
    match raw.trim().to_lowercase().as_str() {
        "m" | "male" | "man" => FieldValue::text("m"),
        "f" | "female" | "woman" => FieldValue::text("f"),
        _ => FieldValue::Invalid,
    }
}

/// Reduce a phone number to its digits, dropping a leading US country code.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('1') {
        Some(national) if digits.len() == 11 => national.to_string(),
        _ => digits,
    }
}

/// Reduce a zip code to its five-digit base.
pub fn normalize_zip(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).take(5).collect()
}

/// Normalize a street address into space-separated tokens.
///
/// Unit designators are dropped with the token that follows them, so
/// `"123 Main St Apt 4B"` and `"123 Main Street"` both become `"123 main st"`.
pub fn normalize_address(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        if c == '#' {
            cleaned.push_str(" # ");
        } else if c.is_alphanumeric() || c.is_whitespace() {
            cleaned.push(c);
        } else {
            cleaned.push(' ');
        }
    }

    let mut tokens: Vec<&str> = Vec::new();
    let mut words = cleaned.split_whitespace();
    while let Some(word) = words.next() {
        if is_unit_designator(word) {
            // "suite # 200" stacks designators before the unit number
            let mut unit = words.next();
            while unit.is_some_and(is_unit_designator) {
                unit = words.next();
            }
            continue;
        }
        tokens.push(abbreviate(word));
    }

    if let Some(&number) = tokens.first() {
        if number.chars().all(|c| c.is_ascii_digit()) {
            let trimmed = number.trim_start_matches('0');
            tokens[0] = if trimmed.is_empty() { "0" } else { trimmed };
        }
    }

    tokens.join(" ")
}

fn is_unit_designator(word: &str) -> bool {
    UNIT_DESIGNATORS.contains(&word)
}

fn abbreviate(word: &str) -> &str {
    STREET_ABBREVIATIONS
        .iter()
        .find(|(long, _)| *long == word)
        .map_or(word, |&(_, short)| short)
}

/// Build the canonical view of a patient.
pub fn normalize_patient(patient: &Patient) -> NormalizedPatient {
    NormalizedPatient {
        first_name: FieldValue::Text(normalize_text(&patient.first_name)),
        last_name: FieldValue::Text(normalize_text(&patient.last_name)),
        dob: normalize_dob(&patient.dob),
        sex: normalize_sex(&patient.sex),
        phone_number: FieldValue::Text(normalize_phone(&patient.phone_number)),
        address: FieldValue::Text(normalize_address(&patient.address)),
        city: FieldValue::Text(normalize_text(&patient.city)),
        zipcode: FieldValue::Text(normalize_zip(&patient.zipcode)),
    }
}
