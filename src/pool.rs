//! Match pool repository: eligible-profile fetch and durable match snapshots.
//!
//! Implementations can target Postgres (production, behind the `database`
//! feature) or an in-memory map (tests, single-process deployments).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::fingerprint::FingerprintVersion;
use crate::types::{CandidateProfile, ConsentLevel, MatchResult, PersistedMatches, StoreError};

/// Durable store for the candidate pool and persisted match runs.
#[async_trait]
pub trait MatchPoolRepository: Send + Sync {
    /// All profiles with consent other than `none`, excluding the
    /// requester. Ordering is unspecified; the matcher re-sorts.
    async fn fetch_eligible_profiles(
        &self,
        excluding: Uuid,
    ) -> Result<Vec<CandidateProfile>, StoreError>;

    /// The last persisted match snapshot for a user, or `None`.
    async fn cached_matches(&self, user_id: Uuid) -> Result<Option<PersistedMatches>, StoreError>;

    /// Replace-on-write persistence of a match run.
    async fn save_matches(
        &self,
        user_id: Uuid,
        version: &FingerprintVersion,
        matches: &[MatchResult],
    ) -> Result<(), StoreError>;

    /// Purge the durable entry for a user. Used on consent revocation.
    async fn invalidate(&self, user_id: Uuid) -> Result<(), StoreError>;
}

#[derive(Default)]
struct PoolState {
    profiles: HashMap<Uuid, CandidateProfile>,
    snapshots: HashMap<Uuid, PersistedMatches>,
}

/// In-memory pool backend.
pub struct InMemoryMatchPool {
    state: RwLock<PoolState>,
}

impl InMemoryMatchPool {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PoolState::default()),
        }
    }

    pub async fn upsert_profile(&self, profile: CandidateProfile) {
        let mut state = self.state.write().await;
        state.profiles.insert(profile.user_id, profile);
    }

    pub async fn remove_profile(&self, user_id: Uuid) {
        let mut state = self.state.write().await;
        state.profiles.remove(&user_id);
    }
}

impl Default for InMemoryMatchPool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchPoolRepository for InMemoryMatchPool {
    async fn fetch_eligible_profiles(
        &self,
        excluding: Uuid,
    ) -> Result<Vec<CandidateProfile>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .profiles
            .values()
            .filter(|p| p.user_id != excluding && p.consent != ConsentLevel::None)
            .cloned()
            .collect())
    }

    async fn cached_matches(&self, user_id: Uuid) -> Result<Option<PersistedMatches>, StoreError> {
        let state = self.state.read().await;
        Ok(state.snapshots.get(&user_id).cloned())
    }

    async fn save_matches(
        &self,
        user_id: Uuid,
        version: &FingerprintVersion,
        matches: &[MatchResult],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.snapshots.insert(
            user_id,
            PersistedMatches {
                fingerprint_version: version.clone(),
                matches: matches.to_vec(),
                written_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.snapshots.remove(&user_id);
        Ok(())
    }
}

/// Postgres pool backend.
#[cfg(feature = "database")]
pub struct PgMatchPool {
    pool: sqlx::PgPool,
}

#[cfg(feature = "database")]
impl PgMatchPool {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl MatchPoolRepository for PgMatchPool {
    async fn fetch_eligible_profiles(
        &self,
        excluding: Uuid,
    ) -> Result<Vec<CandidateProfile>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, serde_json::Value)>(
            r#"
            SELECT user_id, consent, fingerprint
            FROM skintwin.pool_profiles
            WHERE user_id <> $1
              AND consent <> 'none'
            "#,
        )
        .bind(excluding)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(user_id, consent, fingerprint)| {
                let consent = ConsentLevel::parse(&consent).ok_or_else(|| {
                    StoreError::Serialization(format!("unknown consent level: {consent}"))
                })?;
                let fingerprint = serde_json::from_value(fingerprint)?;
                Ok(CandidateProfile {
                    user_id,
                    fingerprint,
                    consent,
                })
            })
            .collect()
    }

    async fn cached_matches(&self, user_id: Uuid) -> Result<Option<PersistedMatches>, StoreError> {
        let row = sqlx::query_as::<_, (String, serde_json::Value, chrono::DateTime<Utc>)>(
            r#"
            SELECT fingerprint_version, matches, written_at
            FROM skintwin.match_snapshots
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(version, matches, written_at)| {
            let matches = serde_json::from_value(matches)?;
            Ok(PersistedMatches {
                fingerprint_version: FingerprintVersion::from_raw(version),
                matches,
                written_at,
            })
        })
        .transpose()
    }

    async fn save_matches(
        &self,
        user_id: Uuid,
        version: &FingerprintVersion,
        matches: &[MatchResult],
    ) -> Result<(), StoreError> {
        let matches_json = serde_json::to_value(matches)?;

        sqlx::query(
            r#"
            INSERT INTO skintwin.match_snapshots (user_id, fingerprint_version, matches, written_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (user_id) DO UPDATE
            SET fingerprint_version = $2, matches = $3, written_at = now()
            "#,
        )
        .bind(user_id)
        .bind(version.as_str())
        .bind(&matches_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn invalidate(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM skintwin.match_snapshots
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{Fingerprint, SkinType};
    use crate::types::MatchLevel;
    use std::collections::BTreeSet;

    fn profile(consent: ConsentLevel) -> CandidateProfile {
        CandidateProfile {
            user_id: Uuid::new_v4(),
            fingerprint: Fingerprint::assemble(SkinType::Oily, BTreeSet::new(), [0.5; 4]),
            consent,
        }
    }

    fn match_result(owner: Uuid, version: &FingerprintVersion) -> MatchResult {
        let candidate = Uuid::new_v4();
        MatchResult {
            id: MatchResult::stable_id(owner, candidate, version),
            candidate_id: candidate,
            similarity: 0.91,
            level: MatchLevel::Twin,
            effective_products: Vec::new(),
        }
    }

    #[tokio::test]
    async fn eligibility_excludes_requester_and_unconsented() {
        let pool = InMemoryMatchPool::new();
        let requester = profile(ConsentLevel::Identified);
        let consenting = profile(ConsentLevel::Pseudonymous);
        let revoked = profile(ConsentLevel::None);

        pool.upsert_profile(requester.clone()).await;
        pool.upsert_profile(consenting.clone()).await;
        pool.upsert_profile(revoked).await;

        let eligible = pool
            .fetch_eligible_profiles(requester.user_id)
            .await
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].user_id, consenting.user_id);
    }

    #[tokio::test]
    async fn save_is_replace_on_write() {
        let pool = InMemoryMatchPool::new();
        let owner = Uuid::new_v4();
        let v1 = FingerprintVersion::from_raw("v1");
        let v2 = FingerprintVersion::from_raw("v2");

        pool.save_matches(owner, &v1, &[match_result(owner, &v1)])
            .await
            .unwrap();
        let second = vec![match_result(owner, &v2), match_result(owner, &v2)];
        pool.save_matches(owner, &v2, &second).await.unwrap();

        let stored = pool.cached_matches(owner).await.unwrap().unwrap();
        assert_eq!(stored.fingerprint_version, v2);
        assert_eq!(stored.matches.len(), 2);
    }

    #[tokio::test]
    async fn missing_snapshot_reads_as_none() {
        let pool = InMemoryMatchPool::new();
        assert!(pool.cached_matches(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_purges_the_snapshot() {
        let pool = InMemoryMatchPool::new();
        let owner = Uuid::new_v4();
        let v = FingerprintVersion::from_raw("v");

        pool.save_matches(owner, &v, &[match_result(owner, &v)])
            .await
            .unwrap();
        pool.invalidate(owner).await.unwrap();
        assert!(pool.cached_matches(owner).await.unwrap().is_none());
    }
}
