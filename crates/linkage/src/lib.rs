//! Scoring and match selection for patient records.
//!
//! Takes two rosters and links each external patient to its best internal
//! counterpart:
//! - [`MatchConfig`]: validated weights, field types and threshold
//! - [`score`]: weighted aggregate with a per-field breakdown
//! - [`select_matches`]: blocking, scoring and best-match selection

pub mod config;
pub mod scorer;
pub mod selector;

pub use config::{
    ConfigError, FieldRule, MatchConfig, MatchingSettings, DEFAULT_MATCH_THRESHOLD,
    WEIGHT_TOLERANCE,
};
pub use scorer::score;
pub use selector::{select_matches, Linker};
