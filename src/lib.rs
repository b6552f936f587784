//! Skin-Twin Matcher
//!
//! Matches a user's skin-care profile against a consent-gated pool of other
//! users, ranks the matched twins' proven-effective products into
//! personalized recommendations, and caches match runs across two tiers.
//!
//! # Architecture
//!
//! ```text
//! load_matches(user, force_refresh)
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  FingerprintProvider                    │
//! │  profile + history → versioned features │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  MatchCache (two tiers)                 │
//! │  in-process (24h TTL) → durable         │
//! │  hit requires version equality          │
//! └─────────────────────────────────────────┘
//!       │
//!       ├─── memory hit ───► matches + recommendations
//!       ├─── durable hit ──► re-rank recommendations only
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  MatchPoolRepository → TwinMatcher      │
//! │  score pool, classify, rank             │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  HistoryStore + RecommendationEngine    │
//! │  twins' effective products → ranked     │
//! │  recommendations; write through tiers   │
//! └─────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod feedback;
pub mod fingerprint;
pub mod history;
pub mod matcher;
pub mod pool;
pub mod recommend;
pub mod service;
pub mod types;

pub use cache::{CachedMatches, MatchCache};
pub use feedback::{FeedbackRecorder, FeedbackSink, InMemoryFeedbackSink, MatchFeedback};
pub use fingerprint::{
    Fingerprint, FingerprintError, FingerprintProvider, FingerprintVersion,
    ProfileFingerprintProvider, RequesterProfile, SkinConcern, SkinType, UsageRecord,
};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use matcher::TwinMatcher;
pub use pool::{InMemoryMatchPool, MatchPoolRepository};
pub use recommend::RecommendationEngine;
pub use service::{InMemoryProfileStore, ProfileStore, TwinMatchService};
pub use types::*;

#[cfg(feature = "database")]
pub use pool::PgMatchPool;
