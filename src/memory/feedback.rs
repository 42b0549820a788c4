//! User feedback on agent answers

use crate::models::FeedbackRating;
use crate::state::KeyValueStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const FEEDBACK_KEY_PREFIX: &str = "agent:feedback:";
pub const FEEDBACK_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub conversation_id: String,
    pub message_index: u64,
    pub rating: FeedbackRating,
    pub created_at: DateTime<Utc>,
}

/// Appends feedback to a per-conversation list.
#[derive(Clone)]
pub struct FeedbackStore {
    kv: Arc<dyn KeyValueStore>,
}

impl FeedbackStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn feedback_key(conversation_id: &str) -> String {
        format!("{}{}", FEEDBACK_KEY_PREFIX, conversation_id)
    }

    pub async fn list(&self, conversation_id: &str) -> Result<Vec<FeedbackRecord>> {
        match self.kv.get(&Self::feedback_key(conversation_id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn record(&self, feedback: FeedbackRecord) -> Result<()> {
        let mut entries = self.list(&feedback.conversation_id).await?;
        let key = Self::feedback_key(&feedback.conversation_id);

        info!(
            conversation_id = %feedback.conversation_id,
            message_index = feedback.message_index,
            rating = ?feedback.rating,
            "Feedback recorded"
        );

        entries.push(feedback);
        self.kv
            .set(&key, &serde_json::to_string(&entries)?, FEEDBACK_TTL)
            .await
    }
}
