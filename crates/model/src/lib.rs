//! Core domain model for patientlink roster linkage.
//!
//! This crate defines the fundamental types used throughout the system:
//! - `Patient`: A raw roster row, internal or external
//! - `NormalizedPatient`: The canonical view every comparison runs against
//! - `Field` / `FieldType`: Which attribute is compared, and how
//! - `FieldSimilarityResult`, `MatchScore`: Scoring output with its breakdown
//! - `BestMatch`, `MatchResult`, `MatchOutput`: Selection results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing model identifiers from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Unknown field name: '{0}'")]
    UnknownField(String),

    #[error("Unknown field type: '{0}' (expected exact, name, general, address or phone)")]
    UnknownFieldType(String),
}

/// A comparable patient attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FirstName,
    LastName,
    Dob,
    Sex,
    PhoneNumber,
    Address,
    City,
    Zipcode,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::FirstName,
        Field::LastName,
        Field::Dob,
        Field::Sex,
        Field::PhoneNumber,
        Field::Address,
        Field::City,
        Field::Zipcode,
    ];

    /// Configuration name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Dob => "dob",
            Self::Sex => "sex",
            Self::PhoneNumber => "phone_number",
            Self::Address => "address",
            Self::City => "city",
            Self::Zipcode => "zipcode",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first_name" | "firstname" => Ok(Self::FirstName),
            "last_name" | "lastname" => Ok(Self::LastName),
            "dob" => Ok(Self::Dob),
            "sex" => Ok(Self::Sex),
            "phone_number" | "phonenumber" | "phone" => Ok(Self::PhoneNumber),
            "address" => Ok(Self::Address),
            "city" => Ok(Self::City),
            "zipcode" | "zip_code" | "zip" => Ok(Self::Zipcode),
            _ => Err(ModelError::UnknownField(s.to_string())),
        }
    }
}

/// Comparison strategy applied to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Equal canonical values or nothing
    Exact,
    /// Jaro-Winkler over the leading name token
    Name,
    /// Dampened edit-distance similarity
    General,
    /// Token set blended with edit distance
    Address,
    /// Digit-aware phone comparison
    Phone,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Name => "name",
            Self::General => "general",
            Self::Address => "address",
            Self::Phone => "phone",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "name" => Ok(Self::Name),
            "general" => Ok(Self::General),
            "address" => Ok(Self::Address),
            "phone" => Ok(Self::Phone),
            _ => Err(ModelError::UnknownFieldType(s.to_string())),
        }
    }
}

/// A patient row as loaded from either roster.
///
/// Column names follow the roster CSV headers; snake_case aliases are
/// accepted so JSON fixtures can use either form. Absent columns are
/// empty strings, never errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Roster-local identifier
    #[serde(
        rename = "PatientId",
        alias = "InternalPatientId",
        alias = "ExternalPatientId",
        alias = "Id",
        alias = "patient_id",
        default
    )]
    pub patient_id: String,

    #[serde(rename = "FirstName", alias = "first_name", default)]
    pub first_name: String,

    #[serde(rename = "LastName", alias = "last_name", default)]
    pub last_name: String,

    /// Date of birth in whatever format the roster carries
    #[serde(rename = "DOB", alias = "dob", alias = "Dob", default)]
    pub dob: String,

    #[serde(rename = "Sex", alias = "sex", default)]
    pub sex: String,

    #[serde(rename = "PhoneNumber", alias = "phone_number", alias = "Phone", default)]
    pub phone_number: String,

    #[serde(rename = "Address", alias = "address", default)]
    pub address: String,

    #[serde(rename = "City", alias = "city", default)]
    pub city: String,

    #[serde(rename = "ZipCode", alias = "zipcode", alias = "zip_code", alias = "Zip", default)]
    pub zipcode: String,
}

impl Patient {
    /// Create a record with the blocking attributes and names set.
    pub fn new(
        patient_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        dob: impl Into<String>,
        sex: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            dob: dob.into(),
            sex: sex.into(),
            ..Default::default()
        }
    }

    pub fn with_phone(mut self, phone_number: impl Into<String>) -> Self {
        self.phone_number = phone_number.into();
        self
    }

    pub fn with_address(
        mut self,
        address: impl Into<String>,
        city: impl Into<String>,
        zipcode: impl Into<String>,
    ) -> Self {
        self.address = address.into();
        self.city = city.into();
        self.zipcode = zipcode.into();
        self
    }

    /// Raw value of a comparable field.
    pub fn raw(&self, field: Field) -> &str {
        match field {
            Field::FirstName => &self.first_name,
            Field::LastName => &self.last_name,
            Field::Dob => &self.dob,
            Field::Sex => &self.sex,
            Field::PhoneNumber => &self.phone_number,
            Field::Address => &self.address,
            Field::City => &self.city,
            Field::Zipcode => &self.zipcode,
        }
    }
}

/// A canonicalized field value.
///
/// `Invalid` marks input that could not be canonicalized. It never matches
/// anything, itself included; use [`FieldValue::matches`] rather than `==`
/// when deciding agreement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Invalid,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// The canonical text when it can take part in a comparison.
    pub fn as_comparable(&self) -> Option<&str> {
        match self {
            Self::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Agreement test that fails closed on empty and invalid values.
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self.as_comparable(), other.as_comparable()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Invalid => f.write_str("<invalid>"),
        }
    }
}

/// Canonical view of a [`Patient`], built once per linkage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPatient {
    pub first_name: FieldValue,
    pub last_name: FieldValue,
    pub dob: FieldValue,
    pub sex: FieldValue,
    pub phone_number: FieldValue,
    pub address: FieldValue,
    pub city: FieldValue,
    pub zipcode: FieldValue,
}

impl NormalizedPatient {
    pub fn get(&self, field: Field) -> &FieldValue {
        match field {
            Field::FirstName => &self.first_name,
            Field::LastName => &self.last_name,
            Field::Dob => &self.dob,
            Field::Sex => &self.sex,
            Field::PhoneNumber => &self.phone_number,
            Field::Address => &self.address,
            Field::City => &self.city,
            Field::Zipcode => &self.zipcode,
        }
    }
}

/// Algorithm that produced a field similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Exact,
    JaroWinkler,
    Levenshtein,
    JaccardLevenshtein,
    PhoneDigits,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::JaroWinkler => "jaro_winkler",
            Self::Levenshtein => "levenshtein",
            Self::JaccardLevenshtein => "jaccard_levenshtein",
            Self::PhoneDigits => "phone_digits",
        }
    }
}

/// Calibration band a comparison landed in. Reporting aid for reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum Signal {
    /// Empty or unparseable value on at least one side
    MissingValue,

    /// Leading tokens agree closely while the full names differ
    MiddleNameConfusion,

    /// Name similarity inside the match band
    NameVariant {
        /// Raw similarity that fired the band
        similarity: f64,
    },

    /// Names encode to the same phonetic code
    SoundAlike {
        /// Algorithm used (soundex, metaphone)
        algorithm: String,
        /// The code both names share
        code: String,
    },

    /// Local number agrees, area code differs
    PhonePartialMatch,

    /// Only the area code agrees
    PhoneAreaCode,

    /// Same address tokens in a different arrangement
    AddressTokenSet,
}

impl Signal {
    /// Get a human-readable label for this signal.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingValue => "Missing Value",
            Self::MiddleNameConfusion => "Possible Middle Name",
            Self::NameVariant { .. } => "Name Variant",
            Self::SoundAlike { .. } => "Sounds Similar",
            Self::PhonePartialMatch => "Area Code Differs",
            Self::PhoneAreaCode => "Area Code Only",
            Self::AddressTokenSet => "Address Reordered",
        }
    }
}

/// Similarity of one field for one candidate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSimilarityResult {
    /// Similarity in [0, 1]
    pub similarity: f64,

    pub algorithm: Algorithm,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
}

impl FieldSimilarityResult {
    pub fn new(similarity: f64, algorithm: Algorithm) -> Self {
        Self {
            similarity: similarity.clamp(0.0, 1.0),
            algorithm,
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// One field's entry in a score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBreakdown {
    pub result: FieldSimilarityResult,
    pub weight: f64,
    /// `similarity * weight`
    pub contribution: f64,
}

/// A signal raised on a specific field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub field: Field,
    pub signal: Signal,
}

/// Aggregate similarity for one (external, internal) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    /// Weighted mean of field similarities, in [0, 1]
    pub value: f64,

    pub breakdown: BTreeMap<Field, FieldBreakdown>,

    /// Acceptance threshold applied to `value`
    pub threshold: f64,

    pub meets_threshold: bool,

    /// Why the pair fell short, when it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default)]
    pub flags: Vec<ReviewFlag>,
}

impl MatchScore {
    /// Similarity recorded for a field, if the field was scored.
    pub fn similarity(&self, field: Field) -> Option<f64> {
        self.breakdown.get(&field).map(|b| b.result.similarity)
    }
}

/// The winning candidate for one external patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMatch {
    pub internal: Patient,
    /// Position of `internal` in the internal roster
    pub position: usize,
    pub score: MatchScore,
}

/// A linked pair above threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub external: Patient,
    pub internal: Patient,
    pub score: MatchScore,
}

impl MatchResult {
    pub fn from_best_match(external: Patient, best: BestMatch) -> Self {
        Self {
            external,
            internal: best.internal,
            score: best.score,
        }
    }
}

/// Identifier pair persisted for a match or an accepted decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutput {
    #[serde(rename = "ExternalPatientId")]
    pub external_id: String,

    #[serde(rename = "InternalPatientId")]
    pub internal_id: String,
}

impl MatchOutput {
    pub fn new(external_id: impl Into<String>, internal_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            internal_id: internal_id.into(),
        }
    }
}

impl From<&MatchResult> for MatchOutput {
    fn from(result: &MatchResult) -> Self {
        Self::new(
            result.external.patient_id.clone(),
            result.internal.patient_id.clone(),
        )
    }
}
