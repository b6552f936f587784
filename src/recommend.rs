//! Product recommendation ranking over matched twins.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::fingerprint::Fingerprint;
use crate::types::{MatchResult, ProductRecommendationScore};

struct ScoreAccumulator {
    name: String,
    raw_score: f32,
    supporting_twin_ids: Vec<Uuid>,
}

/// Ranks candidate products for a requester from the matched twins'
/// effectiveness track records.
#[derive(Debug, Default)]
pub struct RecommendationEngine;

impl RecommendationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Rank every effective product across the supplied matches.
    ///
    /// Each twin contributes `similarity × effectiveness` per product;
    /// products supported by several twins accumulate contributions. Final
    /// scores are normalized by the total similarity mass of the match set
    /// so they stay in [0, 1], sorted descending with ties broken by
    /// product id. An empty match list yields an empty result.
    pub fn rank_products(
        &self,
        requester: &Fingerprint,
        matches: &[MatchResult],
    ) -> Vec<ProductRecommendationScore> {
        let total_similarity: f32 = matches.iter().map(|m| m.similarity).sum();
        if matches.is_empty() || total_similarity <= 0.0 {
            return Vec::new();
        }

        let mut accumulators: HashMap<Uuid, ScoreAccumulator> = HashMap::new();
        // Matches arrive in ranked order, so supporting-twin lists stay in
        // ranked twin order as contributions are appended.
        for m in matches {
            for product in &m.effective_products {
                let acc = accumulators
                    .entry(product.product_id)
                    .or_insert_with(|| ScoreAccumulator {
                        name: product.name.clone(),
                        raw_score: 0.0,
                        supporting_twin_ids: Vec::new(),
                    });
                acc.raw_score += m.similarity * product.effectiveness.clamp(0.0, 1.0);
                if !acc.supporting_twin_ids.contains(&m.candidate_id) {
                    acc.supporting_twin_ids.push(m.candidate_id);
                }
            }
        }

        let mut scores: Vec<ProductRecommendationScore> = accumulators
            .into_iter()
            .map(|(product_id, acc)| ProductRecommendationScore {
                product_id,
                name: acc.name,
                score: acc.raw_score / total_similarity,
                supporting_twin_ids: acc.supporting_twin_ids,
            })
            .collect();
        sort_ranked(&mut scores);

        debug!(
            fingerprint = %requester.version(),
            twins = matches.len(),
            products = scores.len(),
            "ranked products across match set"
        );
        scores
    }

    /// Rank a single twin's effective products, for match drill-down.
    pub fn products_from_twin(
        &self,
        requester: &Fingerprint,
        twin: &MatchResult,
    ) -> Vec<ProductRecommendationScore> {
        let mut scores: Vec<ProductRecommendationScore> = twin
            .effective_products
            .iter()
            .map(|product| ProductRecommendationScore {
                product_id: product.product_id,
                name: product.name.clone(),
                score: product.effectiveness.clamp(0.0, 1.0),
                supporting_twin_ids: vec![twin.candidate_id],
            })
            .collect();
        sort_ranked(&mut scores);

        debug!(
            fingerprint = %requester.version(),
            twin = %twin.candidate_id,
            products = scores.len(),
            "ranked single-twin products"
        );
        scores
    }
}

fn sort_ranked(scores: &mut [ProductRecommendationScore]) {
    scores.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::SkinType;
    use crate::types::{EffectiveProduct, MatchLevel};
    use std::collections::BTreeSet;

    fn requester() -> Fingerprint {
        Fingerprint::assemble(SkinType::Oily, BTreeSet::new(), [0.5; 4])
    }

    fn product(id: Uuid, effectiveness: f32) -> EffectiveProduct {
        EffectiveProduct {
            product_id: id,
            name: format!("product-{id}"),
            category: "serum".into(),
            effectiveness,
        }
    }

    fn twin(similarity: f32, products: Vec<EffectiveProduct>) -> MatchResult {
        let candidate = Uuid::new_v4();
        MatchResult {
            id: Uuid::new_v4(),
            candidate_id: candidate,
            similarity,
            level: MatchLevel::classify(similarity),
            effective_products: products,
        }
    }

    #[test]
    fn empty_match_list_yields_empty_recommendations() {
        let engine = RecommendationEngine::new();
        assert!(engine.rank_products(&requester(), &[]).is_empty());
    }

    #[test]
    fn shared_products_accumulate_weighted_support() {
        let engine = RecommendationEngine::new();
        let shared = Uuid::new_v4();
        let solo = Uuid::new_v4();

        let matches = vec![
            twin(0.95, vec![product(shared, 0.9)]),
            twin(0.80, vec![product(shared, 0.8), product(solo, 0.9)]),
        ];
        let ranked = engine.rank_products(&requester(), &matches);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].product_id, shared);
        assert_eq!(ranked[0].supporting_twin_ids.len(), 2);
        assert_eq!(ranked[1].product_id, solo);
        assert_eq!(ranked[1].supporting_twin_ids.len(), 1);
        // shared: (0.95*0.9 + 0.80*0.8) / 1.75, solo: 0.80*0.9 / 1.75
        assert!((ranked[0].score - 0.8543).abs() < 1e-3);
        assert!((ranked[1].score - 0.4114).abs() < 1e-3);
    }

    #[test]
    fn higher_similarity_twins_count_more() {
        let engine = RecommendationEngine::new();
        let from_twin = Uuid::new_v4();
        let from_weak = Uuid::new_v4();

        // Same effectiveness; only the supporting twin's similarity differs.
        let matches = vec![
            twin(0.95, vec![product(from_twin, 0.8)]),
            twin(0.45, vec![product(from_weak, 0.8)]),
        ];
        let ranked = engine.rank_products(&requester(), &matches);
        assert_eq!(ranked[0].product_id, from_twin);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn scores_stay_normalized() {
        let engine = RecommendationEngine::new();
        let id = Uuid::new_v4();
        let matches = vec![
            twin(0.95, vec![product(id, 1.0)]),
            twin(0.90, vec![product(id, 1.0)]),
            twin(0.85, vec![product(id, 1.0)]),
        ];
        let ranked = engine.rank_products(&requester(), &matches);
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].score <= 1.0);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_product_id() {
        let engine = RecommendationEngine::new();
        let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();

        let matches = vec![twin(0.9, vec![product(ids[1], 0.7), product(ids[0], 0.7)])];
        let ranked = engine.rank_products(&requester(), &matches);
        assert_eq!(ranked[0].product_id, ids[0]);
        assert_eq!(ranked[1].product_id, ids[1]);
    }

    #[test]
    fn supporting_twins_keep_ranked_order() {
        let engine = RecommendationEngine::new();
        let shared = Uuid::new_v4();
        let best = twin(0.95, vec![product(shared, 0.9)]);
        let second = twin(0.80, vec![product(shared, 0.9)]);

        let ranked = engine.rank_products(&requester(), &[best.clone(), second.clone()]);
        assert_eq!(
            ranked[0].supporting_twin_ids,
            vec![best.candidate_id, second.candidate_id]
        );
    }

    #[test]
    fn single_twin_drill_down_uses_effectiveness() {
        let engine = RecommendationEngine::new();
        let strong = Uuid::new_v4();
        let weak = Uuid::new_v4();
        let t = twin(0.92, vec![product(weak, 0.3), product(strong, 0.9)]);

        let ranked = engine.products_from_twin(&requester(), &t);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].product_id, strong);
        assert!((ranked[0].score - 0.9).abs() < 1e-6);
        assert_eq!(ranked[0].supporting_twin_ids, vec![t.candidate_id]);
    }

    #[test]
    fn twin_without_products_ranks_nothing() {
        let engine = RecommendationEngine::new();
        let t = twin(0.92, Vec::new());
        assert!(engine.products_from_twin(&requester(), &t).is_empty());
        assert!(engine.rank_products(&requester(), &[t]).is_empty());
    }
}
