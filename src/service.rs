//! Match pipeline orchestration.
//!
//! `TwinMatchService` owns the request flow: fingerprint resolution, the
//! two-tier cache consult, the full recompute pipeline, write-through, and
//! consent revocation. All collaborators are injected; there is no shared
//! static state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::MatchCache;
use crate::fingerprint::{Fingerprint, FingerprintProvider, RequesterProfile};
use crate::history::HistoryStore;
use crate::matcher::TwinMatcher;
use crate::pool::MatchPoolRepository;
use crate::recommend::RecommendationEngine;
use crate::types::{
    MatchConfig, MatchError, MatchOutcome, MatchResult, MatchSource, MatchStats,
    ProductRecommendationScore, StoreError,
};

/// Read access to the requester's own profile.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn requester_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<RequesterProfile>, StoreError>;
}

/// In-memory profile backend.
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<Uuid, RequesterProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, profile: RequesterProfile) {
        let mut map = self.profiles.write().await;
        map.insert(profile.user_id, profile);
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn requester_profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<RequesterProfile>, StoreError> {
        let map = self.profiles.read().await;
        Ok(map.get(&user_id).cloned())
    }
}

/// The skin-twin matching pipeline.
pub struct TwinMatchService {
    profiles: Arc<dyn ProfileStore>,
    fingerprints: Arc<dyn FingerprintProvider>,
    repository: Arc<dyn MatchPoolRepository>,
    history: Arc<dyn HistoryStore>,
    matcher: TwinMatcher,
    engine: RecommendationEngine,
    cache: MatchCache,
    /// Per-user guards serializing concurrent match computations.
    in_flight: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    config: MatchConfig,
}

impl TwinMatchService {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        fingerprints: Arc<dyn FingerprintProvider>,
        repository: Arc<dyn MatchPoolRepository>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self::with_config(profiles, fingerprints, repository, history, MatchConfig::default())
    }

    pub fn with_config(
        profiles: Arc<dyn ProfileStore>,
        fingerprints: Arc<dyn FingerprintProvider>,
        repository: Arc<dyn MatchPoolRepository>,
        history: Arc<dyn HistoryStore>,
        config: MatchConfig,
    ) -> Self {
        let matcher = TwinMatcher::with_config(&config);
        let cache = MatchCache::new(repository.clone(), config.cache_ttl);
        Self {
            profiles,
            fingerprints,
            repository,
            history,
            matcher,
            engine: RecommendationEngine::new(),
            cache,
            in_flight: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Load matches and recommendations for a user.
    ///
    /// Consults the in-process tier, then the durable tier (recomputing
    /// only recommendations on a version-matching snapshot), and finally
    /// runs the full pipeline. Concurrent calls for the same user collapse
    /// into one computation; the later caller reuses the first caller's
    /// cached result.
    #[instrument(skip(self), fields(user = %user_id, force_refresh))]
    pub async fn load_matches(
        &self,
        user_id: Uuid,
        force_refresh: bool,
    ) -> Result<MatchOutcome, MatchError> {
        let profile = self
            .profiles
            .requester_profile(user_id)
            .await
            .map_err(|e| MatchError::ServiceUnavailable(format!("profile store: {e}")))?
            .ok_or_else(|| MatchError::InvalidFingerprint("no profile on record".into()))?;
        let fingerprint = self.fingerprints.fingerprint(&profile)?;

        if !force_refresh {
            if let Some(outcome) = self.serve_memory(user_id, &fingerprint).await {
                return Ok(outcome);
            }
        }

        let guard = self.flight_guard(user_id).await;
        let _flight = guard.lock().await;

        if !force_refresh {
            // A concurrent caller may have populated the cache while this
            // request waited on the guard.
            if let Some(outcome) = self.serve_memory(user_id, &fingerprint).await {
                return Ok(outcome);
            }
            if let Some(outcome) = self.serve_durable(user_id, &fingerprint).await {
                return Ok(outcome);
            }
        }

        self.compute(user_id, &fingerprint).await
    }

    /// Single-twin product drill-down for a match detail view.
    pub fn products_from_twin(
        &self,
        requester: &Fingerprint,
        twin: &MatchResult,
    ) -> Vec<ProductRecommendationScore> {
        self.engine.products_from_twin(requester, twin)
    }

    /// Handle a consent change: drop every in-process entry and purge the
    /// user's durable entry before any further match attempt.
    pub async fn handle_consent_change(&self, user_id: Uuid) -> Result<(), MatchError> {
        self.cache.clear_all().await;
        self.cache.invalidate_user(user_id).await?;
        info!(user = %user_id, "cleared both cache tiers after consent change");
        Ok(())
    }

    async fn serve_memory(&self, user_id: Uuid, fingerprint: &Fingerprint) -> Option<MatchOutcome> {
        let hit = self.cache.fresh(user_id, fingerprint.version()).await?;
        debug!(user = %user_id, "serving matches from the in-process tier");
        Some(MatchOutcome {
            stats: MatchStats::from_matches(&hit.matches),
            matches: hit.matches,
            recommendations: hit.recommendations,
            source: MatchSource::MemoryCache,
        })
    }

    async fn serve_durable(&self, user_id: Uuid, fingerprint: &Fingerprint) -> Option<MatchOutcome> {
        let snapshot = self.cache.durable(user_id).await?;
        if snapshot.fingerprint_version != *fingerprint.version() {
            debug!(user = %user_id, "durable snapshot is for a stale fingerprint version");
            return None;
        }

        // Matches are reusable as-is; only recommendations are recomputed.
        let recommendations = self.engine.rank_products(fingerprint, &snapshot.matches);
        self.cache
            .store(
                user_id,
                fingerprint.version(),
                snapshot.matches.clone(),
                recommendations.clone(),
            )
            .await;
        debug!(user = %user_id, "reseeded the in-process tier from the durable tier");
        Some(MatchOutcome {
            stats: MatchStats::from_matches(&snapshot.matches),
            matches: snapshot.matches,
            recommendations,
            source: MatchSource::DurableCache,
        })
    }

    async fn compute(
        &self,
        user_id: Uuid,
        fingerprint: &Fingerprint,
    ) -> Result<MatchOutcome, MatchError> {
        let pool = self
            .repository
            .fetch_eligible_profiles(user_id)
            .await
            .map_err(|e| MatchError::ServiceUnavailable(format!("match pool: {e}")))?;

        let mut matches = self.matcher.find_matches(user_id, fingerprint, &pool)?;
        for m in &mut matches {
            match self.history.effective_products(m.candidate_id).await {
                Ok(products) => m.effective_products = products,
                Err(err) => warn!(
                    candidate = %m.candidate_id,
                    error = %err,
                    "history read failed; twin served without product data"
                ),
            }
        }

        let recommendations = self.engine.rank_products(fingerprint, &matches);
        self.write_through(user_id, fingerprint, &matches, &recommendations)
            .await;

        info!(
            user = %user_id,
            matches = matches.len(),
            recommendations = recommendations.len(),
            "match pipeline complete"
        );
        Ok(MatchOutcome {
            stats: MatchStats::from_matches(&matches),
            matches,
            recommendations,
            source: MatchSource::Computed,
        })
    }

    /// Write the run through both tiers: durable snapshot first, memory
    /// only after a confirmed durable write, so the in-process tier never
    /// holds data the durable tier missed. A failed durable write degrades
    /// to serving the computed result uncached.
    async fn write_through(
        &self,
        user_id: Uuid,
        fingerprint: &Fingerprint,
        matches: &[MatchResult],
        recommendations: &[ProductRecommendationScore],
    ) {
        let persisted: Vec<MatchResult> = matches
            .iter()
            .filter(|m| m.level >= self.config.persist_level)
            .cloned()
            .collect();

        if let Err(err) = self
            .cache
            .persist(user_id, fingerprint.version(), &persisted)
            .await
        {
            warn!(
                user = %user_id,
                error = %err,
                "failed to persist match snapshot; serving uncached result"
            );
            return;
        }

        // Cached recommendations must be ranked over the cached match set.
        let cached_recommendations = if persisted.len() == matches.len() {
            recommendations.to_vec()
        } else {
            self.engine.rank_products(fingerprint, &persisted)
        };
        self.cache
            .store(
                user_id,
                fingerprint.version(),
                persisted,
                cached_recommendations,
            )
            .await;
    }

    async fn flight_guard(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut guards = self.in_flight.lock().await;
        guards
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
