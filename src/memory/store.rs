//! Conversation history storage
//!
//! One JSON array of role-tagged messages per conversation id, rewritten in
//! full on every save with a refreshed TTL. Load and save are fail-soft.
//!
//! Load-then-save is not atomic: two concurrent saves to the same
//! conversation can drop one of the appended turns (last write wins).

use crate::config::DEFAULT_CONVERSATION_TTL;
use crate::models::Message;
use crate::state::KeyValueStore;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const CONVERSATION_KEY_PREFIX: &str = "agent:conversation:";

#[derive(Clone)]
pub struct ConversationStore {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(kv, DEFAULT_CONVERSATION_TTL)
    }

    pub fn with_ttl(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn conversation_key(conversation_id: &str) -> String {
        format!("{}{}", CONVERSATION_KEY_PREFIX, conversation_id)
    }

    /// Prior messages in order. Missing, unreadable or corrupt history is empty.
    pub async fn load(&self, conversation_id: &str) -> Vec<Message> {
        match self.try_load(conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    conversation_id = conversation_id,
                    error = %e,
                    "Failed to load conversation history, starting fresh"
                );
                Vec::new()
            }
        }
    }

    /// Append one user/assistant pair. Failures are logged, never returned.
    pub async fn save(&self, conversation_id: &str, user_message: Message, assistant_message: Message) {
        if let Err(e) = self
            .try_save(conversation_id, user_message, assistant_message)
            .await
        {
            warn!(
                conversation_id = conversation_id,
                error = %e,
                "Failed to save conversation history"
            );
        }
    }

    async fn try_load(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let key = Self::conversation_key(conversation_id);
        match self.kv.get(&key).await? {
            Some(raw) => deserialize_history(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn try_save(
        &self,
        conversation_id: &str,
        user_message: Message,
        assistant_message: Message,
    ) -> Result<()> {
        let key = Self::conversation_key(conversation_id);

        // A failed read aborts the save; only corrupt history is reset.
        let mut history = match self.kv.get(&key).await? {
            Some(raw) => deserialize_history(&raw).unwrap_or_else(|e| {
                warn!(
                    conversation_id = conversation_id,
                    error = %e,
                    "Discarding corrupt conversation history"
                );
                Vec::new()
            }),
            None => Vec::new(),
        };
        history.push(user_message);
        history.push(assistant_message);

        self.kv
            .set(&key, &serialize_history(&history)?, self.ttl)
            .await?;

        debug!(
            conversation_id = conversation_id,
            message_count = history.len(),
            "Conversation history saved"
        );
        Ok(())
    }
}

pub fn serialize_history(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string(messages)?)
}

pub fn deserialize_history(raw: &str) -> Result<Vec<Message>> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::models::Role;
    use crate::state::InMemoryKeyValueStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct UnavailableStore;

    /// In-memory store whose next `get` can be made to fail once.
    #[derive(Default)]
    struct FlakyReadStore {
        inner: InMemoryKeyValueStore,
        fail_next_get: AtomicBool,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for FlakyReadStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            if self.fail_next_get.swap(false, Ordering::SeqCst) {
                return Err(OrchestrationError::StoreError("read timed out".into()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.inner.set(key, value, ttl).await
        }
    }

    #[async_trait::async_trait]
    impl KeyValueStore for UnavailableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(OrchestrationError::StoreError("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(OrchestrationError::StoreError("connection refused".into()))
        }
    }

    #[test]
    fn test_history_round_trip() {
        let messages = vec![
            Message::human("How is my portfolio doing?"),
            Message::ai("Your portfolio is up 11.35%."),
            Message::human("And versus the S&P 500?"),
            Message::ai("It beat SPY by 2.1 points."),
        ];

        let raw = serialize_history(&messages).unwrap();
        let restored = deserialize_history(&raw).unwrap();

        assert_eq!(restored, messages);
        let roles: Vec<Role> = restored.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Human, Role::Ai, Role::Human, Role::Ai]);
        assert!(raw.starts_with(r#"[{"type":"human","content":"How is my portfolio doing?"}"#));
    }

    #[tokio::test]
    async fn test_save_appends_pairs() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        let store = ConversationStore::new(kv.clone());

        assert!(store.load("c1").await.is_empty());

        store.save("c1", Message::human("q1"), Message::ai("a1")).await;
        store.save("c1", Message::human("q2"), Message::ai("a2")).await;

        let history = store.load("c1").await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[2], Message::human("q2"));
        assert_eq!(history[3], Message::ai("a2"));

        assert!(kv
            .get("agent:conversation:c1")
            .await
            .unwrap()
            .is_some());
        assert!(store.load("c2").await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_history_loads_empty() {
        let kv = Arc::new(InMemoryKeyValueStore::new());
        kv.set("agent:conversation:bad", "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let store = ConversationStore::new(kv);
        assert!(store.load("bad").await.is_empty());

        // Saving over corrupt history starts a fresh sequence.
        store.save("bad", Message::human("q"), Message::ai("a")).await;
        assert_eq!(store.load("bad").await.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_fail_soft() {
        let store = ConversationStore::new(Arc::new(UnavailableStore));
        assert!(store.load("c1").await.is_empty());
        store.save("c1", Message::human("q"), Message::ai("a")).await;
    }

    #[tokio::test]
    async fn test_failed_read_does_not_overwrite_history() {
        let kv = Arc::new(FlakyReadStore::default());
        let store = ConversationStore::new(kv.clone());

        store.save("c", Message::human("q1"), Message::ai("a1")).await;
        store.save("c", Message::human("q2"), Message::ai("a2")).await;

        kv.fail_next_get.store(true, Ordering::SeqCst);
        store.save("c", Message::human("q3"), Message::ai("a3")).await;

        // The failed save is dropped; earlier turns survive.
        let history = store.load("c").await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[3], Message::ai("a2"));

        store.save("c", Message::human("q3"), Message::ai("a3")).await;
        assert_eq!(store.load("c").await.len(), 6);
    }
}
