//! Application configuration file.

use anyhow::{Context, Result};
use patientlink_linkage::{MatchConfig, MatchingSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level configuration, read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory the roster and output file names are relative to
    #[serde(alias = "DATA_DIR")]
    pub data_dir: PathBuf,

    #[serde(alias = "FILES")]
    pub files: FileSettings,

    #[serde(alias = "MATCHING")]
    pub matching: MatchingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            files: FileSettings::default(),
            matching: MatchingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    #[serde(alias = "INTERNAL_CSV")]
    pub internal_csv: PathBuf,
    #[serde(alias = "EXTERNAL_CSV")]
    pub external_csv: PathBuf,
    #[serde(alias = "MATCHES_CSV")]
    pub matches_csv: PathBuf,
    #[serde(alias = "ACCEPTED_CSV")]
    pub accepted_csv: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            internal_csv: PathBuf::from("internal.csv"),
            external_csv: PathBuf::from("external.csv"),
            matches_csv: PathBuf::from("matches.csv"),
            accepted_csv: PathBuf::from("accepted.csv"),
        }
    }
}

impl AppConfig {
    /// Read the configuration file, or fall back to defaults when it is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Validate the matching section.
    pub fn match_config(&self) -> Result<MatchConfig> {
        MatchConfig::try_from(self.matching.clone()).context("Invalid matching configuration")
    }

    pub fn internal_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.internal_csv)
    }

    pub fn external_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.external_csv)
    }

    pub fn matches_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.matches_csv)
    }

    pub fn accepted_path(&self) -> PathBuf {
        self.data_dir.join(&self.files.accepted_csv)
    }
}
