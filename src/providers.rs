//! Injected capability seams
//!
//! Embedding generation, long-term storage and entity-relationship lookup
//! are external collaborators. Each is an injected trait object; every code
//! path in the core behaves correctly when a provider is absent, slow
//! (deadline exceeded) or failing.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::warn;

use crate::errors::MemoryError;
use crate::types::MemoryItem;

/// Text-to-vector capability, injected and replaceable
///
/// Implementations should return a fixed-length unit vector. The core never
/// assumes a specific model or dimensionality.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Save/fetch contract with the long-term store
///
/// The core hands over evicted-but-valuable items and fetches on working-set
/// misses; it defines no durable format beyond the serde shape of
/// `MemoryItem`.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    async fn save(&self, item: &MemoryItem) -> anyhow::Result<()>;
    async fn fetch(&self, id: &str) -> anyhow::Result<Option<MemoryItem>>;
}

/// Pairwise entity-relationship strength lookup
///
/// Backed by the knowledge graph outside this crate; the relationship factor
/// reads strengths, never edges or traversals.
pub trait EntityGraph: Send + Sync {
    /// Relationship strength in [0, 1] between two entity ids, if any
    fn relationship_strength(&self, source_id: &str, target_id: &str) -> Option<f32>;
}

/// Run a provider future under a deadline
///
/// Timeouts map to `ProviderTimeout`, provider errors to `ProviderFailure`;
/// both are logged here so call sites only decide the fallback.
pub async fn with_deadline<T, F>(
    provider: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, MemoryError>
where
    F: std::future::Future<Output = anyhow::Result<T>> + Send,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(provider, error = %err, "provider call failed");
            Err(MemoryError::ProviderFailure {
                provider: provider.to_string(),
                details: err.to_string(),
            })
        }
        Err(_) => {
            warn!(provider, timeout_ms = timeout.as_millis() as u64, "provider call timed out");
            Err(MemoryError::ProviderTimeout {
                provider: provider.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Reference long-term store keeping serialized records in memory
///
/// Ships as the test double and as a working default for single-process
/// deployments without a durable backend. Records are stored as JSON so the
/// serialization contract is exercised; a malformed record is skipped with a
/// log line, it never fails the fetch path as a whole.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Insert a raw record, bypassing serialization (test hook for the
    /// malformed-record path)
    pub fn insert_raw(&self, id: impl Into<String>, raw: impl Into<String>) {
        self.records.insert(id.into(), raw.into());
    }
}

#[async_trait]
impl LongTermStore for InMemoryStore {
    async fn save(&self, item: &MemoryItem) -> anyhow::Result<()> {
        let json = serde_json::to_string(item)?;
        self.records.insert(item.id.as_str().to_string(), json);
        Ok(())
    }

    async fn fetch(&self, id: &str) -> anyhow::Result<Option<MemoryItem>> {
        let Some(raw) = self.records.get(id) else {
            return Ok(None);
        };

        match serde_json::from_str::<MemoryItem>(raw.value()) {
            Ok(item) => Ok(Some(item)),
            Err(err) => {
                warn!(id, error = %err, "skipping malformed long-term record");
                Ok(None)
            }
        }
    }
}
