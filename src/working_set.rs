//! Activation-decay working set
//!
//! A capacity-bounded set of "hot" memory items modeled on human working
//! memory:
//! - New and accessed items start at full activation (1.0)
//! - Activation decays linearly with idle time
//! - Every decay pass forgets items below the retention threshold; a full
//!   set evicts the lowest-activation item
//! - Frequently touched, highly active items are queued for consolidation
//!   into long-term storage
//!
//! All state lives behind a single `parking_lot::Mutex` that is never held
//! across an await point. Provider calls (embedding, long-term store, event
//! sink) run outside the lock under a deadline.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkingSetConfig;
use crate::constants::{DECAY_DEBOUNCE_MS, TICK_ERROR_BACKOFF_MS};
use crate::errors::Result;
use crate::events::{MemoryEvent, NoopSink, NotificationSink};
use crate::providers::{with_deadline, EmbeddingProvider, LongTermStore};
use crate::similarity::top_k_similar;
use crate::types::{MemoryId, MemoryItem, MemoryRecord};

/// Resident item plus its admission sequence number
///
/// The sequence number breaks activation ties during eviction: oldest
/// admission loses.
#[derive(Debug, Clone)]
struct Slot {
    item: MemoryItem,
    admitted_seq: u64,
}

/// Consolidation candidate, snapshotted at flag time
///
/// The snapshot decouples the published event from later mutation or
/// eviction of the live item.
#[derive(Debug, Clone)]
struct ConsolidationCandidate {
    id: MemoryId,
    content: Arc<String>,
    source_tag: String,
    metadata: serde_json::Value,
    item: MemoryItem,
}

/// An item leaving the set involuntarily, with its persistence verdict
///
/// Forgotten items are handed to the long-term store only if they were at
/// or above the retention threshold before the decay pass that removed
/// them; capacity evictions persist when still above threshold.
#[derive(Debug)]
struct Departed {
    item: MemoryItem,
    persist: bool,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    next_seq: u64,
    last_decay: Option<DateTime<Utc>>,
    pending_consolidation: Vec<ConsolidationCandidate>,
    /// Ids consolidated during their current residency; cleared on departure
    consolidated: HashSet<String>,
    forgotten_total: u64,
    consolidated_total: u64,
}

/// Point-in-time summary of working-set state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingSetStats {
    pub item_count: usize,
    pub capacity: usize,
    pub mean_activation: f32,
    pub min_activation: f32,
    pub max_activation: f32,
    pub pending_consolidation: usize,
    pub last_decay: Option<DateTime<Utc>>,
    pub forgotten_total: u64,
    pub consolidated_total: u64,
}

/// The working set itself; cheap to share behind an `Arc`
pub struct WorkingSet {
    config: WorkingSetConfig,
    inner: Mutex<Inner>,
    store: Option<Arc<dyn LongTermStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    sink: Arc<dyn NotificationSink>,
    history: Option<Arc<crate::access_history::AccessHistory>>,
}

impl WorkingSet {
    pub fn new(config: WorkingSetConfig) -> Self {
        info!(
            capacity = config.capacity,
            decay_rate = config.decay_rate,
            retention_threshold = config.retention_threshold,
            "working set initialized"
        );
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            store: None,
            embedder: None,
            sink: Arc::new(NoopSink),
            history: None,
        }
    }

    /// Attach the long-term store used for forgotten-item persistence,
    /// consolidation and recall fallback
    pub fn with_store(mut self, store: Arc<dyn LongTermStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the embedding provider used to vectorize new items and search
    /// queries
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Attach the lifecycle event sink
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share an access history so reads here feed the frequency and
    /// attention scoring factors
    pub fn with_access_history(
        mut self,
        history: Arc<crate::access_history::AccessHistory>,
    ) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &WorkingSetConfig {
        &self.config
    }

    // -------------------------------------------------------------------
    // Core operations
    // -------------------------------------------------------------------

    /// Admit a new item at full activation
    ///
    /// Content is embedded if a provider is attached; an embedding failure
    /// degrades to an unembedded item, never to an error. If the set is over
    /// capacity afterwards, the lowest-activation item (oldest admission on
    /// ties) is evicted: persisted to the long-term store when one is
    /// attached and still above the retention threshold, then announced as
    /// forgotten.
    pub async fn add(&self, record: MemoryRecord) -> Result<MemoryId> {
        self.add_at(record, Utc::now()).await
    }

    pub async fn add_at(&self, mut record: MemoryRecord, now: DateTime<Utc>) -> Result<MemoryId> {
        if record.embedding.is_none() {
            if let Some(embedder) = &self.embedder {
                let content = Arc::clone(&record.content);
                match with_deadline(
                    "embedding",
                    self.config.provider_timeout(),
                    embedder.embed(&content),
                )
                .await
                {
                    Ok(vector) => record.embedding = Some(vector),
                    Err(err) => {
                        debug!(error = %err, "admitting item without embedding");
                    }
                }
            }
        }

        let item = MemoryItem::from_record(record, now);
        let id = item.id.clone();
        let source_tag = item.source_tag.clone();

        let departed = {
            let mut inner = self.inner.lock();
            let mut departed = self.apply_decay(&mut inner, now);

            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.slots.insert(
                id.as_str().to_string(),
                Slot {
                    item,
                    admitted_seq: seq,
                },
            );
            departed.extend(self.enforce_capacity(&mut inner));
            departed
        };

        self.retire(departed).await;
        self.publish(MemoryEvent::ItemAdded {
            id: id.clone(),
            source_tag,
        })
        .await;

        debug!(id = %id, "item admitted to working set");
        Ok(id)
    }

    /// Fetch an item, boosting its activation
    ///
    /// A resident hit bumps activation and access count and may flag the
    /// item for consolidation. A miss falls back to the long-term store when
    /// one is attached; a recalled item is re-admitted at full activation.
    pub async fn get(&self, id: &str) -> Result<Option<MemoryItem>> {
        self.get_at(id, Utc::now()).await
    }

    pub async fn get_at(&self, id: &str, now: DateTime<Utc>) -> Result<Option<MemoryItem>> {
        let (resident, departed) = {
            let mut inner = self.inner.lock();
            let departed = self.apply_decay(&mut inner, now);

            let mut resident = None;
            if let Some(slot) = inner.slots.get_mut(id) {
                slot.item.boost_activation(self.config.activation_boost, now);
                resident = Some(slot.item.clone());
            }
            if resident.is_some() {
                self.maybe_flag_consolidation(&mut inner, id);
            }
            (resident, departed)
        };

        self.retire(departed).await;

        if let Some(item) = resident {
            if let Some(history) = &self.history {
                history.record_access(id, now);
            }
            return Ok(Some(item));
        }

        let Some(store) = &self.store else {
            return Ok(None);
        };

        let fetched =
            match with_deadline("long_term_store", self.config.provider_timeout(), store.fetch(id))
                .await
            {
                Ok(found) => found,
                Err(err) => {
                    warn!(id, error = %err, "long-term recall failed, treating as miss");
                    None
                }
            };

        let Some(mut item) = fetched else {
            return Ok(None);
        };

        // Recall brings the item back into working memory at full strength
        item.activation = 1.0;
        item.last_accessed = now;
        let id = item.id.clone();
        let source_tag = item.source_tag.clone();
        let snapshot = item.clone();

        let evicted = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.slots.insert(
                id.as_str().to_string(),
                Slot {
                    item,
                    admitted_seq: seq,
                },
            );
            self.enforce_capacity(&mut inner)
        };

        self.retire(evicted).await;
        self.publish(MemoryEvent::ItemAdded {
            id: id.clone(),
            source_tag,
        })
        .await;

        if let Some(history) = &self.history {
            history.record_access(id.as_str(), now);
        }
        debug!(id = %id, "item recalled from long-term store");
        Ok(Some(snapshot))
    }

    /// Snapshot of resident items, most active first
    ///
    /// Runs a decay pass first, so the returned sequence never contains
    /// sub-threshold items. `limit` truncates after sorting; `source_tag`
    /// filters before it. Listing is a passive read: no activation boost,
    /// no access record.
    pub async fn list(&self, limit: Option<usize>, source_tag: Option<&str>) -> Vec<MemoryItem> {
        self.list_at(limit, source_tag, Utc::now()).await
    }

    pub async fn list_at(
        &self,
        limit: Option<usize>,
        source_tag: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<MemoryItem> {
        let (mut items, departed) = {
            let mut inner = self.inner.lock();
            let departed = self.apply_decay(&mut inner, now);
            let items: Vec<(u64, MemoryItem)> = inner
                .slots
                .values()
                .filter(|slot| source_tag.is_none_or(|tag| slot.item.source_tag == tag))
                .map(|slot| (slot.admitted_seq, slot.item.clone()))
                .collect();
            (items, departed)
        };

        self.retire(departed).await;

        items.sort_by(|a, b| {
            b.1.activation
                .partial_cmp(&a.1.activation)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        items.into_iter().map(|(_, item)| item).collect()
    }

    /// Search resident items by content
    ///
    /// With an embedding provider attached the query is vectorized and
    /// resident items ranked by cosine similarity; items without embeddings
    /// are skipped. Without one (or when embedding fails) the search
    /// degrades to case-insensitive substring matching ordered by
    /// activation. Returned items are boosted: a search hit counts as an
    /// access.
    pub async fn search_by_content(&self, query: &str, limit: usize) -> Vec<MemoryItem> {
        self.search_by_content_at(query, limit, Utc::now()).await
    }

    pub async fn search_by_content_at(
        &self,
        query: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<MemoryItem> {
        let query_vec = match &self.embedder {
            Some(embedder) => {
                match with_deadline(
                    "embedding",
                    self.config.provider_timeout(),
                    embedder.embed(query),
                )
                .await
                {
                    Ok(vector) => Some(vector),
                    Err(err) => {
                        debug!(error = %err, "query embedding failed, using substring search");
                        None
                    }
                }
            }
            None => None,
        };

        let (hits, departed) = {
            let mut inner = self.inner.lock();
            let departed = self.apply_decay(&mut inner, now);

            let ranked_ids = match &query_vec {
                Some(vector) => Self::rank_by_vector(&inner, vector, limit),
                None => Self::rank_by_substring(&inner, query, limit),
            };

            let mut hits = Vec::with_capacity(ranked_ids.len());
            for id in ranked_ids {
                if let Some(slot) = inner.slots.get_mut(&id) {
                    slot.item.boost_activation(self.config.activation_boost, now);
                    hits.push(slot.item.clone());
                }
                self.maybe_flag_consolidation(&mut inner, &id);
            }
            (hits, departed)
        };

        self.retire(departed).await;

        if let Some(history) = &self.history {
            for item in &hits {
                history.record_access(item.id.as_str(), now);
            }
        }
        hits
    }

    /// Top ids by cosine similarity; residents without embeddings and
    /// non-positive matches are excluded
    fn rank_by_vector(inner: &Inner, query: &[f32], limit: usize) -> Vec<String> {
        let candidates: Vec<(Vec<f32>, String)> = inner
            .slots
            .iter()
            .filter_map(|(id, slot)| {
                slot.item.embedding.clone().map(|vec| (vec, id.clone()))
            })
            .collect();

        top_k_similar(query, &candidates, limit)
            .into_iter()
            .filter(|(similarity, _)| *similarity > 0.0)
            .map(|(_, id)| id)
            .collect()
    }

    /// Substring-matching ids ordered by activation (pre-boost), ties by
    /// admission order
    fn rank_by_substring(inner: &Inner, query: &str, limit: usize) -> Vec<String> {
        let needle = query.to_lowercase();
        let mut matches: Vec<(f32, u64, String)> = inner
            .slots
            .iter()
            .filter(|(_, slot)| slot.item.content.to_lowercase().contains(&needle))
            .map(|(id, slot)| (slot.item.activation, slot.admitted_seq, id.clone()))
            .collect();

        matches.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        matches.truncate(limit);
        matches.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Explicit eviction
    ///
    /// An item removed while still above the retention threshold is handed
    /// to the long-term store first; a sub-threshold item is dropped
    /// silently. Pending consolidation for the id is cancelled either way.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.slots.remove(id);
            if removed.is_some() {
                inner.consolidated.remove(id);
                inner.pending_consolidation.retain(|c| c.id.as_str() != id);
            }
            removed
        };

        let Some(slot) = removed else {
            return false;
        };

        if slot.item.activation > self.config.retention_threshold {
            if let Some(store) = &self.store {
                if let Err(err) = with_deadline(
                    "long_term_store",
                    self.config.provider_timeout(),
                    store.save(&slot.item),
                )
                .await
                {
                    warn!(id, error = %err, "failed to persist removed item");
                }
            }
        }

        self.publish(MemoryEvent::ItemRemoved {
            id: slot.item.id.clone(),
        })
        .await;
        true
    }

    /// Drop every resident item and pending consolidation
    pub async fn clear(&self) {
        let mut inner = self.inner.lock();
        let count = inner.slots.len();
        inner.slots.clear();
        inner.pending_consolidation.clear();
        inner.consolidated.clear();
        inner.last_decay = None;
        drop(inner);
        info!(count, "working set cleared");
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    pub fn stats(&self) -> WorkingSetStats {
        let inner = self.inner.lock();
        let activations: Vec<f32> = inner.slots.values().map(|s| s.item.activation).collect();
        let count = activations.len();
        let sum: f32 = activations.iter().sum();

        WorkingSetStats {
            item_count: count,
            capacity: self.config.capacity,
            mean_activation: if count > 0 { sum / count as f32 } else { 0.0 },
            min_activation: if count > 0 {
                activations.iter().copied().fold(f32::INFINITY, f32::min)
            } else {
                0.0
            },
            max_activation: activations.iter().copied().fold(0.0, f32::max),
            pending_consolidation: inner.pending_consolidation.len(),
            last_decay: inner.last_decay,
            forgotten_total: inner.forgotten_total,
            consolidated_total: inner.consolidated_total,
        }
    }

    // -------------------------------------------------------------------
    // Decay, eviction, consolidation
    // -------------------------------------------------------------------

    /// Linear decay pass, debounced to once per 100ms
    ///
    /// Items falling below the retention threshold are removed in the same
    /// pass; the persistence verdict is taken from the pre-decay value, so
    /// an item that was still above threshold before this pass is handed to
    /// the long-term store by `retire`.
    fn apply_decay(&self, inner: &mut Inner, now: DateTime<Utc>) -> Vec<Departed> {
        if let Some(last) = inner.last_decay {
            let elapsed_ms = now.signed_duration_since(last).num_milliseconds();
            if elapsed_ms < DECAY_DEBOUNCE_MS as i64 {
                return Vec::new();
            }
        }
        let last = inner.last_decay.replace(now);

        let Some(last) = last else {
            // First pass only establishes the baseline timestamp
            return Vec::new();
        };

        let elapsed_secs = now.signed_duration_since(last).num_milliseconds() as f32 / 1000.0;
        if elapsed_secs <= 0.0 || self.config.decay_rate <= 0.0 {
            return Vec::new();
        }

        let loss = self.config.decay_rate * elapsed_secs;
        let threshold = self.config.retention_threshold;
        let mut doomed: Vec<(String, bool)> = Vec::new();
        for (id, slot) in inner.slots.iter_mut() {
            let before = slot.item.activation;
            slot.item.activation = (before - loss).max(0.0);
            if slot.item.activation < threshold {
                doomed.push((id.clone(), before >= threshold));
            }
        }

        let mut departed = Vec::with_capacity(doomed.len());
        for (id, persist) in doomed {
            if let Some(slot) = inner.slots.remove(&id) {
                inner.consolidated.remove(&id);
                inner.forgotten_total += 1;
                departed.push(Departed {
                    item: slot.item,
                    persist,
                });
            }
        }
        departed
    }

    /// Evict lowest-activation items until within capacity
    ///
    /// Ties go to the oldest admission. Evicted items are persisted when
    /// still above the retention threshold.
    fn enforce_capacity(&self, inner: &mut Inner) -> Vec<Departed> {
        let mut evicted = Vec::new();
        while inner.slots.len() > self.config.capacity {
            let victim = inner
                .slots
                .iter()
                .min_by(|(_, a), (_, b)| {
                    a.item
                        .activation
                        .partial_cmp(&b.item.activation)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.admitted_seq.cmp(&b.admitted_seq))
                })
                .map(|(id, _)| id.clone());

            let Some(id) = victim else { break };
            if let Some(slot) = inner.slots.remove(&id) {
                inner.consolidated.remove(&id);
                inner.forgotten_total += 1;
                let persist = slot.item.activation >= self.config.retention_threshold;
                evicted.push(Departed {
                    item: slot.item,
                    persist,
                });
            }
        }
        evicted
    }

    /// Queue the item for consolidation if it crossed both thresholds and
    /// has not already been queued this residency
    fn maybe_flag_consolidation(&self, inner: &mut Inner, id: &str) {
        let Some(slot) = inner.slots.get(id) else {
            return;
        };
        let item = &slot.item;

        let eligible = item.access_count > self.config.consolidation_access_count_threshold
            && item.activation > self.config.consolidation_activation_threshold;
        if !eligible || inner.consolidated.contains(id) {
            return;
        }

        let metadata = serde_json::json!({
            "access_count": item.access_count,
            "activation": item.activation,
            "created_at": item.created_at,
        });
        let candidate = ConsolidationCandidate {
            id: item.id.clone(),
            content: Arc::clone(&item.content),
            source_tag: item.source_tag.clone(),
            metadata,
            item: item.clone(),
        };

        inner.consolidated.insert(id.to_string());
        inner.pending_consolidation.push(candidate);
        debug!(id, "item flagged for consolidation");
    }

    /// Persist and announce items that left the set involuntarily
    async fn retire(&self, departed: Vec<Departed>) {
        for entry in departed {
            let item = entry.item;
            if entry.persist {
                if let Some(store) = &self.store {
                    if let Err(err) = with_deadline(
                        "long_term_store",
                        self.config.provider_timeout(),
                        store.save(&item),
                    )
                    .await
                    {
                        warn!(id = %item.id, error = %err, "failed to persist forgotten item");
                    }
                }
            }
            self.publish(MemoryEvent::ItemForgotten {
                id: item.id.clone(),
            })
            .await;
            debug!(id = %item.id, activation = item.activation, "item forgotten");
        }
    }

    async fn publish(&self, event: MemoryEvent) {
        if let Err(err) = self.sink.publish(event.clone()).await {
            warn!(topic = event.topic(), error = %err, "event publish failed");
        }
    }

    // -------------------------------------------------------------------
    // Background maintenance
    // -------------------------------------------------------------------

    /// One maintenance tick: decay pass, then consolidation sweep
    pub async fn tick(&self) -> Result<()> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<()> {
        let (departed, candidates) = {
            let mut inner = self.inner.lock();
            let departed = self.apply_decay(&mut inner, now);
            let candidates = std::mem::take(&mut inner.pending_consolidation);
            inner.consolidated_total += candidates.len() as u64;
            (departed, candidates)
        };

        self.retire(departed).await;

        for candidate in candidates {
            if let Some(store) = &self.store {
                if let Err(err) = with_deadline(
                    "long_term_store",
                    self.config.provider_timeout(),
                    store.save(&candidate.item),
                )
                .await
                {
                    warn!(id = %candidate.id, error = %err, "consolidation save failed");
                }
            }
            self.publish(MemoryEvent::ConsolidateItem {
                id: candidate.id.clone(),
                content: candidate.content,
                source_tag: candidate.source_tag,
                metadata: candidate.metadata,
            })
            .await;
            debug!(id = %candidate.id, "item consolidated");
        }

        Ok(())
    }

    /// Spawn the periodic maintenance worker
    ///
    /// Returns the join handle and a stop signal. Tick errors are logged and
    /// followed by a backoff; they never terminate the worker.
    pub fn spawn_maintenance(self: Arc<Self>) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = self.config.tick_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_ms = interval.as_millis() as u64, "maintenance worker started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.tick().await {
                            warn!(error = %err, "maintenance tick failed, backing off");
                            tokio::time::sleep(std::time::Duration::from_millis(
                                TICK_ERROR_BACKOFF_MS,
                            ))
                            .await;
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("maintenance worker stopped");
        });

        (handle, stop_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemoryStore;

    fn record(id: &str, content: &str) -> MemoryRecord {
        MemoryRecord::new(content, "episodic").with_id(id)
    }

    fn config(capacity: usize, decay_rate: f32) -> WorkingSetConfig {
        WorkingSetConfig {
            capacity,
            decay_rate,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let set = WorkingSet::new(config(7, 0.0));
        let id = set.add(record("a", "first")).await.unwrap();

        let item = set.get(id.as_str()).await.unwrap().unwrap();
        assert_eq!(item.content.as_str(), "first");
        assert_eq!(item.access_count, 1);
        assert!(set.contains("a"));
        assert_eq!(set.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_on_ties() {
        let set = WorkingSet::new(config(3, 0.0));
        for (id, content) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")] {
            set.add(record(id, content)).await.unwrap();
        }

        assert_eq!(set.len(), 3);
        assert!(!set.contains("a"));
        assert!(set.contains("b") && set.contains("c") && set.contains("d"));
    }

    #[tokio::test]
    async fn test_eviction_prefers_lowest_activation() {
        let set = WorkingSet::new(config(3, 0.1));
        let base = Utc::now();

        set.add_at(record("a", "1"), base).await.unwrap();
        set.add_at(record("b", "2"), base).await.unwrap();
        set.add_at(record("c", "3"), base).await.unwrap();

        // Boost a and c so b carries the lowest activation after decay
        let later = base + chrono::Duration::seconds(3);
        set.get_at("a", later).await.unwrap();
        set.get_at("c", later).await.unwrap();

        set.add_at(record("d", "4"), later).await.unwrap();
        assert!(!set.contains("b"));
        assert!(set.contains("a") && set.contains("c") && set.contains("d"));
    }

    #[tokio::test]
    async fn test_decay_forgets_below_threshold() {
        let store = Arc::new(InMemoryStore::new());
        let set = WorkingSet::new(config(7, 0.05)).with_store(store.clone() as Arc<dyn LongTermStore>);
        let base = Utc::now();

        set.add_at(record("fading", "soon gone"), base).await.unwrap();

        // 0.05/s for 20s erases the full activation
        set.tick_at(base + chrono::Duration::seconds(20)).await.unwrap();

        assert!(!set.contains("fading"));
        assert!(store.contains("fading"));
        assert_eq!(set.stats().forgotten_total, 1);
    }

    #[tokio::test]
    async fn test_decay_is_debounced() {
        let set = WorkingSet::new(config(7, 1.0));
        let base = Utc::now();

        set.add_at(record("a", "x"), base).await.unwrap();

        // 50ms later is inside the debounce window; no decay applied
        let soon = base + chrono::Duration::milliseconds(50);
        let item = set.get_at("a", soon).await.unwrap().unwrap();
        assert!(item.activation >= 1.0 - f32::EPSILON);
    }

    #[tokio::test]
    async fn test_activation_boost_caps_at_one() {
        let set = WorkingSet::new(config(7, 0.0));
        set.add(record("a", "x")).await.unwrap();

        for _ in 0..5 {
            set.get("a").await.unwrap();
        }
        let item = set.get("a").await.unwrap().unwrap();
        assert!(item.activation <= 1.0);
        assert_eq!(item.access_count, 6);
    }

    #[tokio::test]
    async fn test_consolidation_flags_after_thresholds() {
        let set = WorkingSet::new(config(7, 0.0));
        set.add(record("hot", "repeatedly used")).await.unwrap();

        // access_count must exceed 3 and activation 0.7
        for _ in 0..4 {
            set.get("hot").await.unwrap();
        }
        assert_eq!(set.stats().pending_consolidation, 1);

        // Repeated access does not re-queue within the same residency
        set.get("hot").await.unwrap();
        assert_eq!(set.stats().pending_consolidation, 1);
    }

    #[tokio::test]
    async fn test_tick_drains_consolidation_queue() {
        let store = Arc::new(InMemoryStore::new());
        let set = WorkingSet::new(config(7, 0.0)).with_store(store.clone() as Arc<dyn LongTermStore>);

        set.add(record("hot", "kept")).await.unwrap();
        for _ in 0..4 {
            set.get("hot").await.unwrap();
        }

        set.tick().await.unwrap();
        assert_eq!(set.stats().pending_consolidation, 0);
        assert_eq!(set.stats().consolidated_total, 1);
        assert!(store.contains("hot"));
        // Consolidation is a copy, not an eviction
        assert!(set.contains("hot"));
    }

    #[tokio::test]
    async fn test_get_falls_back_to_long_term_store() {
        let store = Arc::new(InMemoryStore::new());
        let set = WorkingSet::new(config(3, 0.0)).with_store(store.clone() as Arc<dyn LongTermStore>);

        // Fill past capacity so "a" is evicted into the store
        for (id, content) in [("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")] {
            set.add(record(id, content)).await.unwrap();
        }
        assert!(!set.contains("a"));
        assert!(store.contains("a"));

        // Recall re-admits at full activation, evicting another resident
        let item = set.get("a").await.unwrap().unwrap();
        assert_eq!(item.content.as_str(), "1");
        assert!((item.activation - 1.0).abs() < f32::EPSILON);
        assert!(set.contains("a"));
        assert_eq!(set.len(), 3);
    }

    #[tokio::test]
    async fn test_get_miss_without_store() {
        let set = WorkingSet::new(config(7, 0.0));
        assert!(set.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_persists_active_items() {
        let store = Arc::new(InMemoryStore::new());
        let set = WorkingSet::new(config(7, 0.0)).with_store(store.clone() as Arc<dyn LongTermStore>);
        set.add(record("kept", "worth saving")).await.unwrap();

        assert!(set.remove("kept").await);
        assert!(!set.contains("kept"));
        assert!(store.contains("kept"));
        assert!(!set.remove("kept").await);
    }

    #[tokio::test]
    async fn test_remove_drops_subthreshold_items_silently() {
        // Threshold 0.0 lets activation drain without the decay pass
        // forgetting the item first
        let store = Arc::new(InMemoryStore::new());
        let set = WorkingSet::new(WorkingSetConfig {
            capacity: 7,
            decay_rate: 0.05,
            retention_threshold: 0.0,
            ..Default::default()
        })
        .with_store(store.clone() as Arc<dyn LongTermStore>);
        let base = Utc::now();

        set.add_at(record("drained", "x"), base).await.unwrap();
        set.list_at(None, None, base + chrono::Duration::seconds(30)).await;

        assert!(set.remove("drained").await);
        assert!(!store.contains("drained"));
    }

    #[tokio::test]
    async fn test_clear() {
        let set = WorkingSet::new(config(7, 0.0));
        set.add(record("a", "x")).await.unwrap();
        set.add(record("b", "y")).await.unwrap();

        set.clear().await;
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_by_activation() {
        let set = WorkingSet::new(config(7, 0.1));
        let base = Utc::now();

        set.add_at(record("cold", "idle"), base).await.unwrap();
        set.add_at(record("warm", "touched"), base).await.unwrap();

        let later = base + chrono::Duration::seconds(2);
        set.get_at("warm", later).await.unwrap();

        let listed = set.list_at(None, None, later + chrono::Duration::seconds(1)).await;
        assert_eq!(listed[0].id.as_str(), "warm");
        assert_eq!(listed[1].id.as_str(), "cold");
    }

    #[tokio::test]
    async fn test_list_limit_and_source_tag_filter() {
        let set = WorkingSet::new(config(7, 0.0));
        set.add(record("e1", "x")).await.unwrap();
        set.add(record("e2", "y")).await.unwrap();
        set.add(MemoryRecord::new("z", "sensory").with_id("s1"))
            .await
            .unwrap();

        let episodic = set.list(None, Some("episodic")).await;
        assert_eq!(episodic.len(), 2);
        assert!(episodic.iter().all(|i| i.source_tag == "episodic"));

        let limited = set.list(Some(1), None).await;
        assert_eq!(limited.len(), 1);

        let none = set.list(None, Some("semantic")).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_list_never_shows_subthreshold_items() {
        let store = Arc::new(InMemoryStore::new());
        let set = WorkingSet::new(config(7, 0.05)).with_store(store.clone() as Arc<dyn LongTermStore>);
        let base = Utc::now();

        set.add_at(record("fading", "x"), base).await.unwrap();

        // 18s at 0.05/s leaves 0.1, below the 0.2 threshold; the decay pass
        // inside list must forget it before the snapshot is taken
        let listed = set.list_at(None, None, base + chrono::Duration::seconds(18)).await;
        assert!(listed.is_empty());
        assert!(!set.contains("fading"));
        // Pre-decay activation was above threshold, so it was persisted
        assert!(store.contains("fading"));
    }

    #[tokio::test]
    async fn test_substring_search() {
        let set = WorkingSet::new(config(7, 0.0));
        set.add(record("a", "Deploy notes for the api")).await.unwrap();
        set.add(record("b", "grocery list")).await.unwrap();

        let hits = set.search_by_content("deploy", 10).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "a");

        let none = set.search_by_content("absent", 10).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_counts_as_access() {
        let set = WorkingSet::new(config(7, 0.1));
        let base = Utc::now();
        set.add_at(record("a", "deploy notes"), base).await.unwrap();
        set.add_at(record("b", "grocery list"), base).await.unwrap();

        let later = base + chrono::Duration::seconds(2);
        let hits = set.search_by_content_at("deploy", 10, later).await;
        assert_eq!(hits[0].access_count, 1);
        // 0.8 after decay, boosted back to full
        assert!((hits[0].activation - 1.0).abs() < 1e-6);

        // The non-matching item was decayed, not boosted
        let listed = set.list_at(None, None, later).await;
        let untouched = listed.iter().find(|i| i.id.as_str() == "b").unwrap();
        assert_eq!(untouched.access_count, 0);
        assert!(untouched.activation < 1.0);
    }

    #[tokio::test]
    async fn test_repeated_search_flags_consolidation() {
        let set = WorkingSet::new(config(7, 0.0));
        set.add(record("hot", "deploy runbook")).await.unwrap();

        for _ in 0..4 {
            set.search_by_content("deploy", 10).await;
        }
        assert_eq!(set.stats().pending_consolidation, 1);
    }

    #[tokio::test]
    async fn test_stats_shape() {
        let set = WorkingSet::new(config(7, 0.0));
        set.add(record("a", "x")).await.unwrap();
        set.add(record("b", "y")).await.unwrap();

        let stats = set.stats();
        assert_eq!(stats.item_count, 2);
        assert_eq!(stats.capacity, 7);
        assert!((stats.mean_activation - 1.0).abs() < f32::EPSILON);
        assert_eq!(stats.forgotten_total, 0);
    }

    #[tokio::test]
    async fn test_maintenance_worker_stops_on_signal() {
        let set = Arc::new(WorkingSet::new(config(7, 0.0)));
        let (handle, stop) = set.spawn_maintenance();

        stop.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("worker should stop promptly")
            .unwrap();
    }
}
