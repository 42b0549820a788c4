//! Key/value state store with per-key TTL
//!
//! Conversation histories and feedback live behind `KeyValueStore`, passed
//! explicitly to whoever needs it. Postgres is used when a database URL is
//! configured; otherwise an in-process map stands in for development.

use crate::error::OrchestrationError;
use crate::Result;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// How often the Postgres backend deletes expired rows.
pub const POSTGRES_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// External key/value cache. Both operations may fail.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

//
// ================= In-memory =================
//

/// Writes between sweeps of expired in-memory entries.
const SWEEP_EVERY_WRITES: u64 = 64;

struct Entry {
    value: String,
    /// `None` when the TTL is too large to represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory store for development and tests. Expired entries are dropped
/// when read and swept every `SWEEP_EVERY_WRITES` writes.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    #[cfg(test)]
    async fn stored_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(Instant::now()) => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it.
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY_WRITES == 0 {
            let removed = self.purge_expired().await;
            if removed > 0 {
                debug!(removed = removed, "Swept expired key/value entries");
            }
        }
        Ok(())
    }
}

//
// ================= Postgres =================
//

pub struct PostgresKeyValueStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresKeyValueStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS agent_kv (
                      key TEXT PRIMARY KEY,
                      value TEXT NOT NULL,
                      expires_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_agent_kv_expires_at
                    ON agent_kv (expires_at);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "Failed to initialize key/value schema: {}",
                    e
                ))
            })?;

        Ok(())
    }

    /// Delete expired rows. Reads already ignore them.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM agent_kv WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for PostgresKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT value FROM agent_kv WHERE key = $1 AND expires_at > NOW()")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!("Failed to read key {}: {}", key, e))
            })?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.ensure_schema().await?;

        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                OrchestrationError::StoreError(format!("TTL out of range: {:?}", ttl))
            })?;

        sqlx::query(
            r#"
            INSERT INTO agent_kv (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
              SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::DatabaseError(format!("Failed to write key {}: {}", key, e))
        })?;

        Ok(())
    }
}

/// Periodically delete expired Postgres rows. No-op outside a Tokio runtime.
fn spawn_expiry_purge(store: Arc<PostgresKeyValueStore>, every: Duration) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!("No Tokio runtime; expired key/value rows will not be purged");
        return;
    };

    handle.spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed = removed, "Purged expired key/value rows"),
                Err(e) => warn!(error = %e, "Failed to purge expired key/value rows"),
            }
        }
    });
}

/// Postgres when `database_url` is set and the pool can be created,
/// in-memory otherwise.
pub fn build_key_value_store(database_url: Option<&str>) -> Arc<dyn KeyValueStore> {
    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
        {
            Ok(pool) => {
                info!("Key/value backend: postgres");
                let store = Arc::new(PostgresKeyValueStore::new(pool));
                spawn_expiry_purge(store.clone(), POSTGRES_PURGE_INTERVAL);
                return store;
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres key/value backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Key/value backend: in-memory");
    Arc::new(InMemoryKeyValueStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryKeyValueStore::new();
        store.set("k", "v1", Duration::from_secs(60)).await.unwrap();
        store.set("k", "v2", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = InMemoryKeyValueStore::new();
        store.set("k", "v", Duration::ZERO).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_build_without_database_url_is_in_memory() {
        let store = build_key_value_store(None);
        store.set("a", "b", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entries_are_swept_on_write() {
        let store = InMemoryKeyValueStore::new();
        for i in 0..SWEEP_EVERY_WRITES - 1 {
            store
                .set(&format!("conv-{}", i), "v", Duration::ZERO)
                .await
                .unwrap();
        }
        assert_eq!(store.stored_len().await, (SWEEP_EVERY_WRITES - 1) as usize);

        store.set("live", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.stored_len().await, 1);
        assert_eq!(store.get("live").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_purge_expired_removes_entries() {
        let store = InMemoryKeyValueStore::new();
        store.set("old", "v", Duration::ZERO).await.unwrap();
        store.set("new", "v", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.stored_len().await, 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let store = InMemoryKeyValueStore::new();
        store.set("forever", "v", Duration::MAX).await.unwrap();
        assert_eq!(store.get("forever").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.purge_expired().await, 0);
    }
}
