//! Trace export
//!
//! After each answered chat a trace record is handed to a `TraceSink`.
//! Tool outputs in a trace are always sanitized; every record carries a
//! SHA-256 hash of its content so tampering can be detected later.

use crate::models::{TokenUsage, ToolCallRecord, VerificationResult};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub trace_id: Uuid,
    pub conversation_id: String,
    pub model: String,
    /// Redacted copies of the executed tool calls.
    pub tool_calls: Vec<ToolCallRecord>,
    pub verification: Vec<VerificationResult>,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
}

impl TraceRecord {
    /// Build a record and seal it with its content hash.
    pub fn new(
        conversation_id: impl Into<String>,
        model: impl Into<String>,
        tool_calls: Vec<ToolCallRecord>,
        verification: Vec<VerificationResult>,
        token_usage: TokenUsage,
        latency_ms: u64,
    ) -> Self {
        let mut record = Self {
            trace_id: Uuid::new_v4(),
            conversation_id: conversation_id.into(),
            model: model.into(),
            tool_calls,
            verification,
            token_usage,
            latency_ms,
            created_at: Utc::now(),
            content_hash: String::new(),
        };
        record.content_hash = compute_trace_hash(&record);
        record
    }
}

/// Destination for exported traces
#[async_trait::async_trait]
pub trait TraceSink: Send + Sync {
    async fn export(&self, record: TraceRecord) -> Result<()>;
}

/// Traces kept by a `TraceLog` unless configured otherwise.
pub const DEFAULT_TRACE_CAPACITY: usize = 1_000;

#[derive(Default)]
struct TraceEntries {
    records: HashMap<Uuid, TraceRecord>,
    /// Insertion order, oldest at the front.
    order: VecDeque<Uuid>,
}

/// In-memory trace storage, bounded. The oldest trace is evicted once
/// `capacity` records are held.
#[derive(Clone)]
pub struct TraceLog {
    entries: Arc<RwLock<TraceEntries>>,
    capacity: usize,
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(TraceEntries::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, trace_id: Uuid) -> Result<Option<TraceRecord>> {
        let entries = self.entries.read().await;
        Ok(entries.records.get(&trace_id).cloned())
    }

    /// Trace ids of a conversation, oldest first
    pub async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Uuid>> {
        let entries = self.entries.read().await;

        let mut items: Vec<_> = entries
            .records
            .values()
            .filter(|record| record.conversation_id == conversation_id)
            .map(|record| (record.trace_id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Recompute the content hash. Unknown ids are reported as not intact.
    pub async fn verify_integrity(&self, trace_id: Uuid) -> Result<bool> {
        let entries = self.entries.read().await;

        Ok(entries
            .records
            .get(&trace_id)
            .map(|record| compute_trace_hash(record) == record.content_hash)
            .unwrap_or(false))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.records.len()
    }
}

#[async_trait::async_trait]
impl TraceSink for TraceLog {
    async fn export(&self, record: TraceRecord) -> Result<()> {
        let mut entries = self.entries.write().await;
        let trace_id = record.trace_id;

        if entries.records.insert(trace_id, record).is_none() {
            entries.order.push_back(trace_id);
        }

        while entries.records.len() > self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.records.remove(&oldest);
                }
                None => break,
            }
        }

        Ok(())
    }
}

/// Hashed fields: everything except `content_hash` itself.
#[derive(Serialize)]
struct HashedContent<'a> {
    trace_id: &'a Uuid,
    conversation_id: &'a str,
    model: &'a str,
    tool_calls: &'a [ToolCallRecord],
    verification: &'a [VerificationResult],
    token_usage: &'a TokenUsage,
    latency_ms: u64,
    created_at: &'a DateTime<Utc>,
}

/// SHA-256 over the record's JSON, streamed into the hasher.
pub fn compute_trace_hash(record: &TraceRecord) -> String {
    let content = HashedContent {
        trace_id: &record.trace_id,
        conversation_id: &record.conversation_id,
        model: &record.model,
        tool_calls: &record.tool_calls,
        verification: &record.verification,
        token_usage: &record.token_usage,
        latency_ms: record.latency_ms,
        created_at: &record.created_at,
    };

    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &content).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use serde_json::json;

    fn trace(conversation_id: &str) -> TraceRecord {
        TraceRecord::new(
            conversation_id,
            "test-model",
            vec![ToolCallRecord {
                name: "market_data".into(),
                input: json!({"symbols": ["AAPL"]}),
                output: json!({"quotes": {"AAPL": {}}}),
            }],
            vec![VerificationResult::fail("data_freshness", "stale", Severity::Warning)],
            TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            },
            120,
        )
    }

    #[tokio::test]
    async fn test_export_and_lookup() {
        let log = TraceLog::new();
        let first = trace("c1");
        let second = trace("c1");
        let other = trace("c2");

        log.export(first.clone()).await.unwrap();
        log.export(second.clone()).await.unwrap();
        log.export(other).await.unwrap();

        assert_eq!(log.get(first.trace_id).await.unwrap(), Some(first.clone()));
        let ids = log.list_for_conversation("c1").await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.trace_id) && ids.contains(&second.trace_id));
        assert_eq!(log.len().await, 3);
    }

    #[tokio::test]
    async fn test_integrity_detects_tampering() {
        let log = TraceLog::new();
        let record = trace("c1");
        let id = record.trace_id;
        assert_eq!(record.content_hash.len(), 64);

        log.export(record.clone()).await.unwrap();
        assert!(log.verify_integrity(id).await.unwrap());

        let mut tampered = record;
        tampered.latency_ms = 1;
        log.export(tampered).await.unwrap();
        assert!(!log.verify_integrity(id).await.unwrap());
        assert!(!log.verify_integrity(Uuid::new_v4()).await.unwrap());
    }

    #[test]
    fn test_hash_is_stable_across_exports() {
        let log = TraceLog::new();
        let record = trace("c3");
        let expected = compute_trace_hash(&record);
        assert_eq!(record.content_hash, expected);

        tokio_test::block_on(async {
            log.export(record.clone()).await.unwrap();
            let stored = log.get(record.trace_id).await.unwrap().unwrap();
            assert_eq!(stored.content_hash, expected);
        });
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let log = TraceLog::with_capacity(2);
        let first = trace("c1");
        let second = trace("c1");
        let third = trace("c2");

        log.export(first.clone()).await.unwrap();
        log.export(second.clone()).await.unwrap();
        // Re-exporting an id replaces it without taking a new slot.
        log.export(second.clone()).await.unwrap();
        assert_eq!(log.len().await, 2);

        log.export(third.clone()).await.unwrap();
        assert_eq!(log.len().await, 2);
        assert_eq!(log.get(first.trace_id).await.unwrap(), None);
        assert!(log.get(second.trace_id).await.unwrap().is_some());
        assert!(log.get(third.trace_id).await.unwrap().is_some());
        assert_eq!(
            log.list_for_conversation("c1").await.unwrap(),
            vec![second.trace_id]
        );
        assert_eq!(TraceLog::new().capacity(), DEFAULT_TRACE_CAPACITY);
    }
}
