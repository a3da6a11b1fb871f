//! Best-match selection across rosters.

use crate::config::MatchConfig;
use crate::scorer::score;
use patientlink_blocking::BlockingIndex;
use patientlink_features::normalize_patient;
use patientlink_model::{BestMatch, MatchResult, MatchScore, NormalizedPatient, Patient};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Internal roster prepared for linkage: normalized once, blocked once.
///
/// A `Linker` is read-only after construction, so a single instance is
/// shared by every worker scoring external records.
#[derive(Debug)]
pub struct Linker<'a> {
    internal: &'a [Patient],
    normalized: Vec<NormalizedPatient>,
    index: BlockingIndex,
    config: &'a MatchConfig,
}

impl<'a> Linker<'a> {
    pub fn new(internal: &'a [Patient], config: &'a MatchConfig) -> Self {
        let normalized: Vec<NormalizedPatient> =
            internal.par_iter().map(normalize_patient).collect();
        let index = BlockingIndex::build(&normalized);
        Self {
            internal,
            normalized,
            index,
            config,
        }
    }

    pub fn index(&self) -> &BlockingIndex {
        &self.index
    }

    /// Highest-scoring candidate in the external patient's block, threshold
    /// not applied. Ties go to the earliest roster position.
    pub fn best_candidate(&self, external: &NormalizedPatient) -> Option<(usize, MatchScore)> {
        let mut best: Option<(usize, MatchScore)> = None;

        for &position in self.index.lookup(&external.dob, &external.sex) {
            let Some(candidate) = self.normalized.get(position) else {
                continue;
            };
            let candidate_score = score(external, candidate, self.config);
            trace!(position, score = candidate_score.value, "Scored candidate");

            let improves = best
                .as_ref()
                .map_or(true, |(_, current)| candidate_score.value > current.value);
            if improves {
                best = Some((position, candidate_score));
            }
        }

        best
    }

    /// Link one external patient, if its best candidate meets the threshold.
    pub fn link(&self, external: &Patient) -> Option<MatchResult> {
        let normalized = normalize_patient(external);
        let Some((position, best_score)) = self.best_candidate(&normalized) else {
            debug!(external_id = %external.patient_id, "No candidates in block");
            return None;
        };

        if !best_score.meets_threshold {
            debug!(
                external_id = %external.patient_id,
                score = best_score.value,
                reason = best_score.reason.as_deref().unwrap_or_default(),
                "Best candidate below threshold"
            );
            return None;
        }

        let internal = self.internal.get(position)?.clone();
        debug!(
            external_id = %external.patient_id,
            internal_id = %internal.patient_id,
            score = best_score.value,
            "Matched"
        );
        let best = BestMatch {
            internal,
            position,
            score: best_score,
        };
        Some(MatchResult::from_best_match(external.clone(), best))
    }

    /// Link every external patient in parallel. Output follows input order.
    pub fn link_all(&self, external: &[Patient]) -> Vec<MatchResult> {
        external
            .par_iter()
            .filter_map(|patient| self.link(patient))
            .collect()
    }
}

/// Find the best internal match for each external patient.
///
/// Only external patients whose best candidate scores at or above the
/// configured threshold appear in the output, in external roster order.
pub fn select_matches(
    external: &[Patient],
    internal: &[Patient],
    config: &MatchConfig,
) -> Vec<MatchResult> {
    let started = Instant::now();
    if external.is_empty() || internal.is_empty() {
        info!(
            external = external.len(),
            internal = internal.len(),
            "Nothing to link"
        );
        return Vec::new();
    }

    let linker = Linker::new(internal, config);
    let matches = linker.link_all(external);

    info!(
        external = external.len(),
        internal = internal.len(),
        blocks = linker.index().block_count(),
        matched = matches.len(),
        threshold = config.threshold(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Linkage complete"
    );
    matches
}
