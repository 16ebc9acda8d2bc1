//! Working-set notifications
//!
//! The core publishes lifecycle events to an injected sink and never depends
//! on subscribers. Delivery is fire-and-forget with at most one attempt per
//! event; a failing sink degrades to a log line, never to an error surfaced
//! to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::MemoryId;

/// Lifecycle events published by the working set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryEvent {
    /// A new item entered the working set
    ItemAdded { id: MemoryId, source_tag: String },

    /// Activation fell below the retention threshold, or capacity eviction
    /// selected the item
    ItemForgotten { id: MemoryId },

    /// The item was explicitly removed by a caller
    ItemRemoved { id: MemoryId },

    /// The item crossed the consolidation thresholds and should be promoted
    /// to long-term storage by whoever listens
    ConsolidateItem {
        id: MemoryId,
        content: Arc<String>,
        source_tag: String,
        metadata: serde_json::Value,
    },
}

impl MemoryEvent {
    /// Topic string for bus-style routing
    pub fn topic(&self) -> &'static str {
        match self {
            Self::ItemAdded { .. } => "memory.working.item_added",
            Self::ItemForgotten { .. } => "memory.working.item_forgotten",
            Self::ItemRemoved { .. } => "memory.working.item_removed",
            Self::ConsolidateItem { .. } => "memory.working.consolidate_item",
        }
    }

    pub fn id(&self) -> &MemoryId {
        match self {
            Self::ItemAdded { id, .. }
            | Self::ItemForgotten { id }
            | Self::ItemRemoved { id }
            | Self::ConsolidateItem { id, .. } => id,
        }
    }
}

/// Publish-only notification seam
///
/// The core must compile and run with a no-op sink; anything bus-shaped
/// lives on the other side of this trait.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: MemoryEvent) -> anyhow::Result<()>;
}

/// Sink that drops every event
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn publish(&self, _event: MemoryEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
