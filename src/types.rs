//! Shared domain types, configuration, and the error taxonomy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fingerprint::{Fingerprint, FingerprintVersion};

/// Namespace for deterministic match identifiers (UUIDv5).
const MATCH_ID_NAMESPACE: Uuid = Uuid::from_u128(0x9d41_c3a7_52f8_4b1e_a6d0_7e38_91cf_2b54);

/// Consent tier for participation in the match pool.
///
/// Ordered: `None < Pseudonymous < Identified`. `None` excludes a profile
/// from the pool and from being matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentLevel {
    None,
    Pseudonymous,
    Identified,
}

impl ConsentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentLevel::None => "none",
            ConsentLevel::Pseudonymous => "pseudonymous",
            ConsentLevel::Identified => "identified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ConsentLevel::None),
            "pseudonymous" => Some(ConsentLevel::Pseudonymous),
            "identified" => Some(ConsentLevel::Identified),
            _ => None,
        }
    }
}

/// A pool member eligible for matching.
///
/// Never the requesting user; excluded unless `consent != ConsentLevel::None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub user_id: Uuid,
    pub fingerprint: Fingerprint,
    pub consent: ConsentLevel,
}

/// Discrete classification derived from a continuous similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    Similar,
    VerySimilar,
    Twin,
}

impl MatchLevel {
    /// Similarity at or above this is a twin.
    pub const TWIN_THRESHOLD: f32 = 0.90;
    /// Similarity at or above this (but below twin) is very similar.
    pub const VERY_SIMILAR_THRESHOLD: f32 = 0.75;

    /// Classify a similarity score. Scores below the reporting floor never
    /// reach this point; everything else is at least `Similar`.
    pub fn classify(similarity: f32) -> Self {
        if similarity >= Self::TWIN_THRESHOLD {
            MatchLevel::Twin
        } else if similarity >= Self::VERY_SIMILAR_THRESHOLD {
            MatchLevel::VerySimilar
        } else {
            MatchLevel::Similar
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchLevel::Similar => "similar",
            MatchLevel::VerySimilar => "very_similar",
            MatchLevel::Twin => "twin",
        }
    }
}

/// A product a candidate has empirically found effective.
///
/// Owned by the candidate's tracking history; match results reference it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveProduct {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    /// Empirical effectiveness rating in [0, 1].
    pub effectiveness: f32,
}

/// A matched skin twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Stable identifier for this match, used as the feedback key. Derived
    /// from (owner, candidate, fingerprint version), so an unchanged
    /// fingerprint reproduces the same id across recomputes.
    pub id: Uuid,
    pub candidate_id: Uuid,
    /// Similarity in [0, 1].
    pub similarity: f32,
    pub level: MatchLevel,
    pub effective_products: Vec<EffectiveProduct>,
}

impl MatchResult {
    /// Deterministic match identifier for a (requester, candidate,
    /// fingerprint version) triple.
    pub fn stable_id(owner_id: Uuid, candidate_id: Uuid, version: &FingerprintVersion) -> Uuid {
        let name = format!("{owner_id}:{candidate_id}:{version}");
        Uuid::new_v5(&MATCH_ID_NAMESPACE, name.as_bytes())
    }
}

/// A ranked product recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecommendationScore {
    pub product_id: Uuid,
    pub name: String,
    /// Normalized score in [0, 1].
    pub score: f32,
    /// Contributing twins, in ranked twin order.
    pub supporting_twin_ids: Vec<Uuid>,
}

/// Aggregate over a match set. Always recomputed on read, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub total: usize,
    pub twins: usize,
    pub very_similar: usize,
    pub similar: usize,
    pub average_similarity: f32,
}

impl MatchStats {
    pub fn from_matches(matches: &[MatchResult]) -> Self {
        let mut twins = 0;
        let mut very_similar = 0;
        let mut similar = 0;
        let mut sum = 0.0f32;
        for m in matches {
            match m.level {
                MatchLevel::Twin => twins += 1,
                MatchLevel::VerySimilar => very_similar += 1,
                MatchLevel::Similar => similar += 1,
            }
            sum += m.similarity;
        }
        let average_similarity = if matches.is_empty() {
            0.0
        } else {
            sum / matches.len() as f32
        };
        Self {
            total: matches.len(),
            twins,
            very_similar,
            similar,
            average_similarity,
        }
    }
}

/// Durable-tier snapshot of a user's last match run.
///
/// Carries the fingerprint version it was computed for; the caller checks
/// that version before reusing the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMatches {
    pub fingerprint_version: FingerprintVersion,
    pub matches: Vec<MatchResult>,
    pub written_at: DateTime<Utc>,
}

/// Which tier served a match request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    MemoryCache,
    DurableCache,
    Computed,
}

/// Result of a match request.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub matches: Vec<MatchResult>,
    pub recommendations: Vec<ProductRecommendationScore>,
    pub stats: MatchStats,
    pub source: MatchSource,
}

/// Relative weights for the similarity components.
///
/// Weights are normalized to sum to 1 when the matcher is constructed, so
/// the combined score stays in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityWeights {
    pub skin_type: f32,
    pub concerns: f32,
    pub history: f32,
}

impl SimilarityWeights {
    pub(crate) fn normalized(self) -> Self {
        let total = self.skin_type + self.concerns + self.history;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            skin_type: self.skin_type / total,
            concerns: self.concerns / total,
            history: self.history / total,
        }
    }
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            skin_type: 0.35,
            concerns: 0.40,
            history: 0.25,
        }
    }
}

/// Configuration for the matching pipeline.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Candidates scoring below this are dropped entirely.
    pub reporting_floor: f32,
    /// Minimum match level written to either cache tier.
    pub persist_level: MatchLevel,
    pub weights: SimilarityWeights,
    /// TTL for the in-process cache tier.
    pub cache_ttl: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            reporting_floor: 0.40,
            persist_level: MatchLevel::Similar,
            weights: SimilarityWeights::default(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Errors surfaced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors surfaced by the matching pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// The requester's profile cannot yield a usable fingerprint.
    /// Non-retryable; the user needs to complete their profile.
    #[error("profile cannot produce a usable fingerprint: {0}")]
    InvalidFingerprint(String),

    /// No eligible candidates exist in the pool.
    #[error("no eligible candidates in the match pool")]
    EmptyPool,

    /// A required collaborator failed or is not configured.
    #[error("matching service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A durable-tier write failed. Reads never surface this; they degrade
    /// to a cache miss.
    #[error("match storage failed: {0}")]
    Cache(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_at_twin_boundary() {
        assert_eq!(MatchLevel::classify(0.90), MatchLevel::Twin);
        assert_eq!(MatchLevel::classify(0.899999), MatchLevel::VerySimilar);
    }

    #[test]
    fn classify_at_very_similar_boundary() {
        assert_eq!(MatchLevel::classify(0.75), MatchLevel::VerySimilar);
        assert_eq!(MatchLevel::classify(0.749999), MatchLevel::Similar);
    }

    #[test]
    fn match_level_ordering_supports_persistence_floor() {
        assert!(MatchLevel::Twin > MatchLevel::VerySimilar);
        assert!(MatchLevel::VerySimilar > MatchLevel::Similar);
    }

    #[test]
    fn consent_level_string_roundtrip() {
        for level in [
            ConsentLevel::None,
            ConsentLevel::Pseudonymous,
            ConsentLevel::Identified,
        ] {
            assert_eq!(ConsentLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(ConsentLevel::parse("anonymous"), None);
    }

    #[test]
    fn stable_id_is_deterministic_and_input_sensitive() {
        let owner = Uuid::new_v4();
        let candidate = Uuid::new_v4();
        let v1 = FingerprintVersion::from_raw("aaaa");
        let v2 = FingerprintVersion::from_raw("bbbb");

        assert_eq!(
            MatchResult::stable_id(owner, candidate, &v1),
            MatchResult::stable_id(owner, candidate, &v1)
        );
        assert_ne!(
            MatchResult::stable_id(owner, candidate, &v1),
            MatchResult::stable_id(owner, candidate, &v2)
        );
        assert_ne!(
            MatchResult::stable_id(owner, candidate, &v1),
            MatchResult::stable_id(candidate, owner, &v1)
        );
    }

    #[test]
    fn stats_count_by_level() {
        let owner = Uuid::new_v4();
        let v = FingerprintVersion::from_raw("v");
        let mk = |sim: f32| {
            let candidate = Uuid::new_v4();
            MatchResult {
                id: MatchResult::stable_id(owner, candidate, &v),
                candidate_id: candidate,
                similarity: sim,
                level: MatchLevel::classify(sim),
                effective_products: Vec::new(),
            }
        };
        let matches = vec![mk(0.95), mk(0.80), mk(0.60)];
        let stats = MatchStats::from_matches(&matches);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.twins, 1);
        assert_eq!(stats.very_similar, 1);
        assert_eq!(stats.similar, 1);
        assert!((stats.average_similarity - 0.7833).abs() < 1e-3);
    }

    #[test]
    fn stats_on_empty_set() {
        let stats = MatchStats::from_matches(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.average_similarity, 0.0);
    }
}
