//! CSV roster input and match output.
//!
//! Provides the `RosterSource` trait and its CSV implementation, plus the
//! writers for the two output files: `matches.csv` (rewritten every run)
//! and `accepted.csv` (append-only reviewer decisions).

use patientlink_model::{MatchOutput, Patient};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Header of both output files.
pub const OUTPUT_HEADER: [&str; 2] = ["ExternalPatientId", "InternalPatientId"];

/// Errors from roster and output file operations.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Roster file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which roster a file holds. Decides the prefix of generated ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterSide {
    Internal,
    External,
}

impl RosterSide {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Internal => "int",
            Self::External => "ext",
        }
    }

    /// Stable positional id for a row without one.
    pub fn positional_id(&self, row: usize) -> String {
        format!("{}-{}", self.prefix(), row)
    }
}

/// Trait for roster sources.
pub trait RosterSource {
    /// Load every patient, in source order.
    fn load(&self) -> Result<Vec<Patient>, RosterError>;

    /// Describe the source for logging.
    fn describe(&self) -> String;
}

/// Roster read from a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvRosterSource {
    path: PathBuf,
    side: RosterSide,
}

impl CsvRosterSource {
    pub fn new(path: impl Into<PathBuf>, side: RosterSide) -> Self {
        Self {
            path: path.into(),
            side,
        }
    }
}

impl RosterSource for CsvRosterSource {
    fn load(&self) -> Result<Vec<Patient>, RosterError> {
        if !self.path.exists() {
            return Err(RosterError::NotFound(self.path.clone()));
        }
        let file = fs::File::open(&self.path).map_err(|source| RosterError::Io {
            path: self.path.clone(),
            source,
        })?;
        let patients = read_roster(file, self.side).map_err(|source| RosterError::Read {
            path: self.path.clone(),
            source,
        })?;

        info!(
            source = %self.describe(),
            records = patients.len(),
            "Loaded roster"
        );
        Ok(patients)
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.path.display(), self.side.prefix())
    }
}

/// Load a roster CSV from disk.
pub fn load_roster(
    path: impl Into<PathBuf>,
    side: RosterSide,
) -> Result<Vec<Patient>, RosterError> {
    CsvRosterSource::new(path, side).load()
}

/// Parse roster rows from any reader.
///
/// Cells are trimmed, missing columns become empty strings, and rows
/// without an identifier get a positional id for `side`.
pub fn read_roster<R: Read>(reader: R, side: RosterSide) -> Result<Vec<Patient>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut patients = Vec::new();
    for (row, record) in reader.deserialize::<Patient>().enumerate() {
        let mut patient = record?;
        if patient.patient_id.is_empty() {
            patient.patient_id = side.positional_id(row);
        }
        patients.push(patient);
    }
    Ok(patients)
}

/// Rewrite the matches file with the given pairs.
pub fn write_matches(path: &Path, matches: &[MatchOutput]) -> Result<(), RosterError> {
    create_parent(path)?;
    let file = fs::File::create(path).map_err(|source| io_error(path, source))?;
    let mut writer = headerless_writer(file);

    writer
        .write_record(OUTPUT_HEADER)
        .map_err(|source| write_error(path, source))?;
    for output in matches {
        serialize_row(&mut writer, output, path)?;
    }
    writer.flush().map_err(|source| io_error(path, source))?;

    info!(path = %path.display(), matches = matches.len(), "Wrote matches");
    Ok(())
}

/// Create the accepted-pairs file with its header unless it already exists.
pub fn ensure_accepted_file(path: &Path) -> Result<(), RosterError> {
    if path.exists() {
        return Ok(());
    }
    write_matches(path, &[])
}

/// Append one reviewer-accepted pair.
pub fn append_accepted(path: &Path, output: &MatchOutput) -> Result<(), RosterError> {
    ensure_accepted_file(path)?;
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|source| io_error(path, source))?;
    let mut writer = headerless_writer(file);
    serialize_row(&mut writer, output, path)?;
    writer.flush().map_err(|source| io_error(path, source))?;

    debug!(
        path = %path.display(),
        external_id = %output.external_id,
        internal_id = %output.internal_id,
        "Appended accepted match"
    );
    Ok(())
}

/// Read back an output file. A missing file reads as empty.
pub fn read_outputs(path: &Path) -> Result<Vec<MatchOutput>, RosterError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| read_error(path, source))?;
    reader
        .deserialize()
        .collect::<Result<Vec<MatchOutput>, _>>()
        .map_err(|source| read_error(path, source))
}

fn headerless_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(inner)
}

fn serialize_row<W: Write, T: Serialize>(
    writer: &mut csv::Writer<W>,
    row: &T,
    path: &Path,
) -> Result<(), RosterError> {
    writer
        .serialize(row)
        .map_err(|source| write_error(path, source))
}

fn create_parent(path: &Path) -> Result<(), RosterError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))
        }
        _ => Ok(()),
    }
}

fn io_error(path: &Path, source: io::Error) -> RosterError {
    RosterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_error(path: &Path, source: csv::Error) -> RosterError {
    RosterError::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn write_error(path: &Path, source: csv::Error) -> RosterError {
    RosterError::Write {
        path: path.to_path_buf(),
        source,
    }
}
