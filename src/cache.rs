//! Two-tier match cache.
//!
//! One facade over both tiers so invalidation logic lives in one place:
//! an in-process tier (TTL-bounded, keyed by user and fingerprint version)
//! and a durable tier delegated to the match pool repository (no TTL;
//! staleness is detected purely by fingerprint-version mismatch).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::fingerprint::FingerprintVersion;
use crate::pool::MatchPoolRepository;
use crate::types::{MatchResult, PersistedMatches, ProductRecommendationScore, StoreError};

/// In-process cache entry. Owned by the cache; readers get clones.
#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint_version: FingerprintVersion,
    matches: Vec<MatchResult>,
    recommendations: Vec<ProductRecommendationScore>,
    written_at: Instant,
}

/// A hit served from the in-process tier.
#[derive(Debug, Clone)]
pub struct CachedMatches {
    pub matches: Vec<MatchResult>,
    pub recommendations: Vec<ProductRecommendationScore>,
}

pub struct MatchCache {
    entries: RwLock<HashMap<Uuid, CacheEntry>>,
    repository: Arc<dyn MatchPoolRepository>,
    ttl: Duration,
}

impl MatchCache {
    pub fn new(repository: Arc<dyn MatchPoolRepository>, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            repository,
            ttl,
        }
    }

    /// In-process tier lookup. A hit requires the stored fingerprint
    /// version to equal `version` and the entry to be within its TTL.
    pub async fn fresh(
        &self,
        user_id: Uuid,
        version: &FingerprintVersion,
    ) -> Option<CachedMatches> {
        let entries = self.entries.read().await;
        let entry = entries.get(&user_id)?;
        if entry.fingerprint_version != *version {
            debug!(user = %user_id, "memory tier holds a stale fingerprint version");
            return None;
        }
        if entry.written_at.elapsed() > self.ttl {
            debug!(user = %user_id, "memory tier entry expired");
            return None;
        }
        Some(CachedMatches {
            matches: entry.matches.clone(),
            recommendations: entry.recommendations.clone(),
        })
    }

    /// Overwrite the in-process entry for a user. Atomic with respect to
    /// concurrent reads: readers see the old entry or the new one, never a
    /// partial write.
    pub async fn store(
        &self,
        user_id: Uuid,
        version: &FingerprintVersion,
        matches: Vec<MatchResult>,
        recommendations: Vec<ProductRecommendationScore>,
    ) {
        let mut entries = self.entries.write().await;
        entries.insert(
            user_id,
            CacheEntry {
                fingerprint_version: version.clone(),
                matches,
                recommendations,
                written_at: Instant::now(),
            },
        );
    }

    /// Durable-tier lookup. Read failures degrade to a miss; the caller is
    /// responsible for checking the snapshot's fingerprint version.
    pub async fn durable(&self, user_id: Uuid) -> Option<PersistedMatches> {
        match self.repository.cached_matches(user_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(user = %user_id, error = %err, "durable cache read failed; treating as miss");
                None
            }
        }
    }

    /// Durable-tier write. Failures propagate; silent loss of persisted
    /// matches is unacceptable.
    pub async fn persist(
        &self,
        user_id: Uuid,
        version: &FingerprintVersion,
        matches: &[MatchResult],
    ) -> Result<(), StoreError> {
        self.repository.save_matches(user_id, version, matches).await
    }

    /// Remove a user's entries from both tiers.
    pub async fn invalidate_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write().await;
            entries.remove(&user_id);
        }
        self.repository.invalidate(user_id).await
    }

    /// Drop every in-process entry. Paired with durable invalidation on
    /// consent revocation.
    pub async fn clear_all(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Sweep expired in-process entries; returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.written_at.elapsed() <= self.ttl);
        before - entries.len()
    }
}
