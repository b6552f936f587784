//! Match feedback capture.
//!
//! Accuracy/helpfulness feedback is keyed by the stable match identifier
//! carried on every persisted [`MatchResult`](crate::types::MatchResult).
//! The sink itself is external; this layer stamps ids and timestamps and
//! hands records over.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One captured feedback record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFeedback {
    pub feedback_id: Uuid,
    /// Stable match identifier this feedback refers to.
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub accurate: bool,
    pub helpful: bool,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only destination for feedback records.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn capture(&self, feedback: &MatchFeedback) -> Result<()>;
}

/// In-memory sink.
pub struct InMemoryFeedbackSink {
    records: RwLock<Vec<MatchFeedback>>,
}

impl InMemoryFeedbackSink {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn captured(&self) -> Vec<MatchFeedback> {
        self.records.read().await.clone()
    }
}

impl Default for InMemoryFeedbackSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedbackSink for InMemoryFeedbackSink {
    async fn capture(&self, feedback: &MatchFeedback) -> Result<()> {
        let mut records = self.records.write().await;
        records.push(feedback.clone());
        Ok(())
    }
}

/// Stamps and forwards feedback records.
pub struct FeedbackRecorder {
    sink: Arc<dyn FeedbackSink>,
}

impl FeedbackRecorder {
    pub fn new(sink: Arc<dyn FeedbackSink>) -> Self {
        Self { sink }
    }

    /// Capture feedback for a match; returns the feedback record id.
    pub async fn record(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        accurate: bool,
        helpful: bool,
        comment: Option<String>,
    ) -> Result<Uuid> {
        let feedback = MatchFeedback {
            feedback_id: Uuid::new_v4(),
            match_id,
            user_id,
            accurate,
            helpful,
            comment,
            created_at: Utc::now(),
        };
        self.sink.capture(&feedback).await?;
        Ok(feedback.feedback_id)
    }
}
