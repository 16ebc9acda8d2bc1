//! Engram Library
//!
//! Memory-relevance core for cognitive agents: decides what stays "in mind"
//! and how important each remembered item is right now.
//!
//! # Key Features
//! - Activation-decay working set modeled on human working memory
//!   (capacity-bounded, linear decay, boost on access)
//! - Multi-factor priority scoring (recency, frequency, emotional salience,
//!   contextual relevance, semantic similarity and more)
//! - Consolidation pipeline promoting hot items to long-term storage
//! - Feedback-driven factor weight adaptation
//!
//! # Integration Seams
//! - Embedding provider, long-term store and entity graph are injected
//!   traits; the core runs fully without them
//! - Lifecycle events published through a pluggable notification sink

pub mod access_history;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod events;
pub mod providers;
pub mod scoring;
pub mod similarity;
pub mod types;
pub mod working_set;

pub use access_history::AccessHistory;
pub use config::{ScoringConfig, WorkingSetConfig};
pub use context::Context;
pub use errors::{MemoryError, Result};
pub use events::{MemoryEvent, NoopSink, NotificationSink};
pub use providers::{EmbeddingProvider, EntityGraph, InMemoryStore, LongTermStore};
pub use scoring::{FactorWeights, PriorityEngine, ScoreBreakdown, UserGoal};
pub use types::{MemoryId, MemoryItem, MemoryRecord};
pub use working_set::{WorkingSet, WorkingSetStats};

// Re-export dependencies to ensure tests/benchmarks use the same version
pub use chrono;
pub use parking_lot;
pub use uuid;
