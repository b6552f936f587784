//! Twin matcher: pairwise similarity scoring and match classification.

use std::cmp::Ordering;

use rayon::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::fingerprint::{Fingerprint, SkinType};
use crate::types::{
    CandidateProfile, ConsentLevel, MatchConfig, MatchError, MatchLevel, MatchResult,
    SimilarityWeights,
};

/// Computes similarity between a requester's fingerprint and each pool
/// candidate, classifies match levels, and returns a ranked result set.
///
/// The score is a weighted sum of skin-type affinity, concern overlap, and
/// history-feature closeness. It is symmetric, reflexive, and monotone:
/// larger feature divergence never raises the score.
pub struct TwinMatcher {
    weights: SimilarityWeights,
    reporting_floor: f32,
}

impl TwinMatcher {
    pub fn new() -> Self {
        Self::with_config(&MatchConfig::default())
    }

    pub fn with_config(config: &MatchConfig) -> Self {
        Self {
            weights: config.weights.normalized(),
            reporting_floor: config.reporting_floor,
        }
    }

    /// Similarity between two fingerprints, in [0, 1].
    pub fn similarity(&self, a: &Fingerprint, b: &Fingerprint) -> f32 {
        let w = self.weights;
        let score = w.skin_type * type_affinity(a.skin_type(), b.skin_type())
            + w.concerns * concern_overlap(a, b)
            + w.history * history_closeness(a, b);
        score.clamp(0.0, 1.0)
    }

    /// Score every pool candidate against the requester's fingerprint.
    ///
    /// Returns matches sorted descending by similarity (ties broken by
    /// candidate id), with sub-floor candidates dropped. An empty pool is
    /// an error; a pool where nobody clears the floor is an empty result.
    pub fn find_matches(
        &self,
        owner_id: Uuid,
        fingerprint: &Fingerprint,
        pool: &[CandidateProfile],
    ) -> Result<Vec<MatchResult>, MatchError> {
        if pool.is_empty() {
            return Err(MatchError::EmptyPool);
        }

        let floor = self.reporting_floor;
        let mut matches: Vec<MatchResult> = pool
            .par_iter()
            .filter(|c| c.user_id != owner_id && c.consent != ConsentLevel::None)
            .filter_map(|c| {
                let similarity = self.similarity(fingerprint, &c.fingerprint);
                if similarity < floor {
                    return None;
                }
                Some(MatchResult {
                    id: MatchResult::stable_id(owner_id, c.user_id, fingerprint.version()),
                    candidate_id: c.user_id,
                    similarity,
                    level: MatchLevel::classify(similarity),
                    effective_products: Vec::new(),
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });

        debug!(
            pool = pool.len(),
            matched = matches.len(),
            floor,
            "scored match pool"
        );
        Ok(matches)
    }
}

impl Default for TwinMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed symmetric affinity between skin types. Every off-diagonal entry is
/// strictly below 1, so a type difference can only lower the score.
fn type_affinity(a: SkinType, b: SkinType) -> f32 {
    use SkinType::*;
    match (a, b) {
        _ if a == b => 1.0,
        (Combination, Oily) | (Oily, Combination) | (Combination, Dry) | (Dry, Combination) => 0.5,
        (Oily, Dry) | (Dry, Oily) => 0.0,
        (Sensitive, _) | (_, Sensitive) => 0.25,
        // Remaining pairs all involve Normal.
        _ => 0.4,
    }
}

/// Jaccard overlap of the concern sets. Two profiles with no recorded
/// concerns are indistinguishable on this axis and score 1.
fn concern_overlap(a: &Fingerprint, b: &Fingerprint) -> f32 {
    let (ca, cb) = (a.concerns(), b.concerns());
    if ca.is_empty() && cb.is_empty() {
        return 1.0;
    }
    let intersection = ca.intersection(cb).count() as f32;
    let union = ca.union(cb).count() as f32;
    intersection / union
}

/// 1 minus the mean L1 distance over the normalized history features.
fn history_closeness(a: &Fingerprint, b: &Fingerprint) -> f32 {
    let distance: f32 = a
        .history()
        .iter()
        .zip(b.history().iter())
        .map(|(x, y)| (x - y).abs())
        .sum::<f32>()
        / a.history().len() as f32;
    (1.0 - distance).clamp(0.0, 1.0)
}
