//! Fingerprints: versioned feature representations of a skin profile.
//!
//! A fingerprint is the unit of comparison for twin matching. It carries a
//! version stamp derived from its features, so any change to the underlying
//! profile or usage history produces a new version. The matching core only
//! compares fingerprints it is given; derivation happens behind the
//! [`FingerprintProvider`] seam.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::ConsentLevel;

/// Number of normalized usage-history features in a fingerprint.
pub const HISTORY_DIMS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinType {
    Normal,
    Oily,
    Dry,
    Combination,
    Sensitive,
}

impl SkinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinType::Normal => "normal",
            SkinType::Oily => "oily",
            SkinType::Dry => "dry",
            SkinType::Combination => "combination",
            SkinType::Sensitive => "sensitive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinConcern {
    Acne,
    Blackheads,
    Redness,
    Dryness,
    Oiliness,
    Aging,
    Pigmentation,
    Sensitivity,
    Texture,
    Dullness,
}

impl SkinConcern {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinConcern::Acne => "acne",
            SkinConcern::Blackheads => "blackheads",
            SkinConcern::Redness => "redness",
            SkinConcern::Dryness => "dryness",
            SkinConcern::Oiliness => "oiliness",
            SkinConcern::Aging => "aging",
            SkinConcern::Pigmentation => "pigmentation",
            SkinConcern::Sensitivity => "sensitivity",
            SkinConcern::Texture => "texture",
            SkinConcern::Dullness => "dullness",
        }
    }
}

/// Version stamp for a fingerprint: hex SHA-256 over the canonical feature
/// encoding. Identical features always produce an identical stamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintVersion(String);

impl FingerprintVersion {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FingerprintVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Versioned feature representation of a profile's skin attributes and
/// usage history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    skin_type: SkinType,
    concerns: BTreeSet<SkinConcern>,
    /// Normalized history features, each in [0, 1]:
    /// usage breadth, mean improvement, adherence share, category diversity.
    history: [f32; HISTORY_DIMS],
    version: FingerprintVersion,
}

impl Fingerprint {
    /// Assemble a fingerprint from already-derived features, computing the
    /// version stamp from the canonical encoding.
    pub fn assemble(
        skin_type: SkinType,
        concerns: BTreeSet<SkinConcern>,
        history: [f32; HISTORY_DIMS],
    ) -> Self {
        let history = history.map(|f| f.clamp(0.0, 1.0));
        let version = Self::stamp(skin_type, &concerns, &history);
        Self {
            skin_type,
            concerns,
            history,
            version,
        }
    }

    pub fn skin_type(&self) -> SkinType {
        self.skin_type
    }

    pub fn concerns(&self) -> &BTreeSet<SkinConcern> {
        &self.concerns
    }

    pub fn history(&self) -> &[f32; HISTORY_DIMS] {
        &self.history
    }

    pub fn version(&self) -> &FingerprintVersion {
        &self.version
    }

    /// Canonical encoding hashed into the version stamp. History features
    /// are rounded to 4 decimals so the stamp survives reserialization.
    fn stamp(
        skin_type: SkinType,
        concerns: &BTreeSet<SkinConcern>,
        history: &[f32; HISTORY_DIMS],
    ) -> FingerprintVersion {
        let concerns_enc = concerns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let history_enc = history
            .iter()
            .map(|f| format!("{f:.4}"))
            .collect::<Vec<_>>()
            .join(",");
        let canonical = format!(
            "type={}|concerns={}|history={}",
            skin_type.as_str(),
            concerns_enc,
            history_enc
        );
        let digest = Sha256::digest(canonical.as_bytes());
        FingerprintVersion(hex::encode(digest))
    }
}

/// One tracked product-usage record from the requester's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub product_id: Uuid,
    pub category: String,
    pub days_used: u32,
    /// Observed improvement in [0, 1].
    pub improvement: f32,
}

/// The requester-side profile handed over by the external profile store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequesterProfile {
    pub user_id: Uuid,
    pub consent: ConsentLevel,
    pub skin_type: Option<SkinType>,
    pub concerns: BTreeSet<SkinConcern>,
    pub usage: Vec<UsageRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("missing required profile attribute: {0}")]
    MissingAttributes(&'static str),
}

impl From<FingerprintError> for crate::types::MatchError {
    fn from(err: FingerprintError) -> Self {
        crate::types::MatchError::InvalidFingerprint(err.to_string())
    }
}

/// Derives a stable fingerprint from a profile and its usage history.
///
/// Must be deterministic and pure: identical inputs always yield an
/// identical fingerprint and version.
pub trait FingerprintProvider: Send + Sync {
    fn fingerprint(&self, profile: &RequesterProfile) -> Result<Fingerprint, FingerprintError>;
}

/// Default derivation over profile attributes and usage records.
#[derive(Debug, Default)]
pub struct ProfileFingerprintProvider;

impl ProfileFingerprintProvider {
    pub fn new() -> Self {
        Self
    }

    fn history_features(usage: &[UsageRecord]) -> [f32; HISTORY_DIMS] {
        if usage.is_empty() {
            return [0.0; HISTORY_DIMS];
        }
        let n = usage.len() as f32;

        // Usage breadth saturates at 20 tracked products.
        let breadth = (n / 20.0).min(1.0);

        let mean_improvement =
            usage.iter().map(|r| r.improvement.clamp(0.0, 1.0)).sum::<f32>() / n;

        // Records used for at least four weeks count toward adherence.
        let adherence = usage.iter().filter(|r| r.days_used >= 28).count() as f32 / n;

        let categories: BTreeSet<&str> = usage.iter().map(|r| r.category.as_str()).collect();
        let diversity = (categories.len() as f32 / 6.0).min(1.0);

        [breadth, mean_improvement, adherence, diversity]
    }
}

impl FingerprintProvider for ProfileFingerprintProvider {
    fn fingerprint(&self, profile: &RequesterProfile) -> Result<Fingerprint, FingerprintError> {
        let skin_type = profile
            .skin_type
            .ok_or(FingerprintError::MissingAttributes("skin type"))?;
        let history = Self::history_features(&profile.usage);
        Ok(Fingerprint::assemble(
            skin_type,
            profile.concerns.clone(),
            history,
        ))
    }
}
