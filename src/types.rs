//! Type definitions for the memory-relevance core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Unique identifier for memory items
///
/// Stable caller-visible string. Callers may supply their own ids; items
/// added without one get a generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)] // Serialize as plain string, not a struct
pub struct MemoryId(pub String);

impl MemoryId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A memory item resident in (or passing through) the working set
///
/// The working set exclusively owns `activation`, `last_accessed` and
/// `access_count`; everything else is caller-supplied. `content` is shared,
/// not copied: snapshots returned by list/search clone the `Arc`, never the
/// payload itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: MemoryId,

    /// Opaque text payload, owned by the caller and shared by reference
    pub content: Arc<String>,

    /// Origin of the item, e.g. "episodic", "sensory", "semantic"
    pub source_tag: String,

    pub created_at: DateTime<Utc>,

    pub last_accessed: DateTime<Utc>,

    /// Number of explicit accesses since the item entered the working set
    pub access_count: u32,

    /// Current working-set relevance in [0, 1]; decays with time, boosted
    /// on access
    pub activation: f32,

    /// Optional fixed-length unit vector for semantic similarity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Optional emotion tag -> intensity map; intensities may be negative
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_weights: Option<HashMap<String, f32>>,

    /// Optional explicit importance override in [0, 1]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,

    /// Caller-defined attributes (location, participants, ...) used by the
    /// contextual relevance factor
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl MemoryItem {
    /// Build a resident item from an input record, stamping working-set
    /// ownership fields (activation forced to 1.0)
    pub fn from_record(record: MemoryRecord, now: DateTime<Utc>) -> Self {
        Self {
            id: record
                .id
                .map(MemoryId::from)
                .unwrap_or_else(MemoryId::generate),
            content: record.content,
            source_tag: record.source_tag,
            created_at: record.created_at.unwrap_or(now),
            last_accessed: now,
            access_count: 0,
            activation: 1.0,
            embedding: record.embedding,
            emotion_weights: record.emotion_weights,
            importance: record.importance,
            attributes: record.attributes,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    pub fn has_emotion_weights(&self) -> bool {
        self.emotion_weights
            .as_ref()
            .map(|w| !w.is_empty())
            .unwrap_or(false)
    }

    /// Explicit importance if present, else the neutral default
    pub fn importance_or_neutral(&self) -> f32 {
        self.importance
            .unwrap_or(crate::constants::NEUTRAL_SCORE)
    }

    /// Boost activation on access, capped at 1.0
    pub fn boost_activation(&mut self, amount: f32, now: DateTime<Utc>) {
        self.activation = (self.activation + amount).min(1.0);
        self.last_accessed = now;
        self.access_count = self.access_count.saturating_add(1);
    }
}

/// Caller-facing input shape for new memory items
///
/// Mirrors `MemoryItem` minus the working-set-owned fields. Serialization of
/// this record is the boundary contract with the long-term store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub content: Arc<String>,

    pub source_tag: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_weights: Option<HashMap<String, f32>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl MemoryRecord {
    pub fn new(content: impl Into<String>, source_tag: impl Into<String>) -> Self {
        Self {
            id: None,
            content: Arc::new(content.into()),
            source_tag: source_tag.into(),
            created_at: None,
            importance: None,
            emotion_weights: None,
            embedding: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance.clamp(0.0, 1.0));
        self
    }

    pub fn with_emotion_weights(mut self, weights: HashMap<String, f32>) -> Self {
        self.emotion_weights = Some(weights);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
