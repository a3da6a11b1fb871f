//! Candidate blocking over the internal roster.
//!
//! Internal patients are grouped by their canonical (date of birth, sex)
//! pair so each external patient is only scored against the handful of
//! records it could plausibly be:
//! - `BlockingKey`: the composite key, absent when either part is unusable
//! - `BlockingIndex`: key to roster positions, built once and shared read-only

use patientlink_model::{FieldValue, NormalizedPatient};
use std::collections::HashMap;
use tracing::debug;

/// Composite blocking key of canonical DOB and sex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockingKey {
    dob: String,
    sex: String,
}

impl BlockingKey {
    /// Build a key, or `None` when either value is empty or invalid.
    ///
    /// Invalid values never match, so records carrying them are never
    /// indexed and never looked up.
    pub fn new(dob: &FieldValue, sex: &FieldValue) -> Option<Self> {
        Some(Self {
            dob: dob.as_comparable()?.to_string(),
            sex: sex.as_comparable()?.to_string(),
        })
    }

    pub fn for_patient(patient: &NormalizedPatient) -> Option<Self> {
        Self::new(&patient.dob, &patient.sex)
    }
}

/// Blocking index from key to internal roster positions.
///
/// Positions are stored in roster order, which is the tie-break order used
/// by match selection. The index is immutable once built and is `Sync`, so
/// one instance serves every scoring thread.
#[derive(Debug, Clone, Default)]
pub struct BlockingIndex {
    blocks: HashMap<BlockingKey, Vec<usize>>,
    indexed: usize,
}

impl BlockingIndex {
    /// Build the index in a single pass over the internal roster.
    pub fn build(internal: &[NormalizedPatient]) -> Self {
        let mut blocks: HashMap<BlockingKey, Vec<usize>> = HashMap::new();
        let mut indexed = 0;

        for (position, patient) in internal.iter().enumerate() {
            if let Some(key) = BlockingKey::for_patient(patient) {
                blocks.entry(key).or_default().push(position);
                indexed += 1;
            }
        }

        let index = Self { blocks, indexed };
        debug!(
            records = internal.len(),
            indexed = index.indexed,
            blocks = index.block_count(),
            largest_block = index.largest_block(),
            "Built blocking index"
        );
        index
    }

    /// Roster positions sharing the given DOB and sex. Empty when absent.
    pub fn lookup(&self, dob: &FieldValue, sex: &FieldValue) -> &[usize] {
        match BlockingKey::new(dob, sex) {
            Some(key) => self.candidates(&key),
            None => &[],
        }
    }

    /// Roster positions stored under a key.
    pub fn candidates(&self, key: &BlockingKey) -> &[usize] {
        self.blocks.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of distinct keys.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of internal records that received a key.
    pub fn indexed_count(&self) -> usize {
        self.indexed
    }

    pub fn largest_block(&self) -> usize {
        self.blocks.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patientlink_features::normalize_patient;
    use patientlink_model::Patient;
    use pretty_assertions::assert_eq;

    fn roster(rows: &[(&str, &str, &str)]) -> Vec<NormalizedPatient> {
        rows.iter()
            .map(|(id, dob, sex)| normalize_patient(&Patient::new(*id, "A", "B", *dob, *sex)))
            .collect()
    }

    #[test]
    fn test_groups_by_dob_and_sex_in_roster_order() {
        let internal = roster(&[
            ("I-0", "1980-01-01", "M"),
            ("I-1", "1990-05-05", "F"),
            ("I-2", "01/01/1980", "male"),
            ("I-3", "1980-01-01", "F"),
        ]);
        let index = BlockingIndex::build(&internal);

        assert_eq!(index.block_count(), 3);
        assert_eq!(
            index.lookup(&FieldValue::text("1980-01-01"), &FieldValue::text("m")),
            &[0, 2]
        );
        assert_eq!(
            index.lookup(&FieldValue::text("1980-01-01"), &FieldValue::text("f")),
            &[3]
        );
    }

    #[test]
    fn test_missing_key_is_empty_not_error() {
        let index = BlockingIndex::build(&roster(&[("I-0", "1980-01-01", "M")]));
        assert!(index
            .lookup(&FieldValue::text("1975-03-03"), &FieldValue::text("m"))
            .is_empty());
    }

    #[test]
    fn test_invalid_values_are_never_indexed() {
        let internal = roster(&[
            ("I-0", "garbage", "M"),
            ("I-1", "1980-01-01", "?"),
            ("I-2", "", ""),
        ]);
        let index = BlockingIndex::build(&internal);

        assert!(index.is_empty());
        assert_eq!(index.indexed_count(), 0);
        assert!(index.lookup(&FieldValue::Invalid, &FieldValue::Invalid).is_empty());
    }

    #[test]
    fn test_empty_roster() {
        let index = BlockingIndex::build(&[]);
        assert!(index.is_empty());
        assert_eq!(index.largest_block(), 0);
    }
}
