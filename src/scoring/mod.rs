//! Priority Scoring Engine
//!
//! Computes a normalized relevance score in [0, 1] for any memory item from
//! weighted factor sub-scores, with:
//! - Seven base factors (recency, frequency, emotional, explicit, relevance,
//!   attention, semantic)
//! - Optional advanced factors (temporal pattern, relationship, goal
//!   relevance, narrative, novelty, predictive) blended in with the base
//!   weights rescaled so the grand total stays 1.0
//! - Feedback-driven weight adaptation with renormalization on every write
//! - A TTL-bounded score cache keyed by (item id, context hash)

pub mod advanced;
pub mod factors;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::access_history::AccessHistory;
use crate::config::ScoringConfig;
use crate::constants::{DEFAULT_WEIGHT_LEARNING_RATE, WEIGHT_SUM_TOLERANCE};
use crate::context::Context;
use crate::errors::{MemoryError, Result};
use crate::providers::EntityGraph;
use crate::types::{MemoryId, MemoryItem};

pub use advanced::{GoalRegistry, Narrative, NarrativeRegistry, UserGoal};

/// Base factors contributing to a priority score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityFactor {
    Recency,
    Frequency,
    Emotional,
    Explicit,
    Relevance,
    Attention,
    Semantic,
}

impl PriorityFactor {
    pub const ALL: [PriorityFactor; 7] = [
        Self::Recency,
        Self::Frequency,
        Self::Emotional,
        Self::Explicit,
        Self::Relevance,
        Self::Attention,
        Self::Semantic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Recency => "recency",
            Self::Frequency => "frequency",
            Self::Emotional => "emotional",
            Self::Explicit => "explicit",
            Self::Relevance => "relevance",
            Self::Attention => "attention",
            Self::Semantic => "semantic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Default weight share when only base factors are active
    fn default_weight(&self) -> f32 {
        match self {
            Self::Recency => 0.25,
            Self::Frequency => 0.15,
            Self::Emotional => 0.15,
            Self::Explicit => 0.15,
            Self::Relevance => 0.10,
            Self::Attention => 0.05,
            Self::Semantic => 0.15,
        }
    }
}

/// Advanced factors, enabled as a block alongside the base set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancedFactor {
    TemporalPattern,
    Relationship,
    GoalRelevance,
    Narrative,
    Novelty,
    Predictive,
}

impl AdvancedFactor {
    pub const ALL: [AdvancedFactor; 6] = [
        Self::TemporalPattern,
        Self::Relationship,
        Self::GoalRelevance,
        Self::Narrative,
        Self::Novelty,
        Self::Predictive,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TemporalPattern => "temporal_pattern",
            Self::Relationship => "relationship",
            Self::GoalRelevance => "goal_relevance",
            Self::Narrative => "narrative",
            Self::Novelty => "novelty",
            Self::Predictive => "predictive",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    fn default_weight(&self) -> f32 {
        match self {
            Self::TemporalPattern => 0.10,
            Self::Relationship => 0.15,
            Self::GoalRelevance => 0.10,
            Self::Narrative => 0.05,
            Self::Novelty => 0.05,
            Self::Predictive => 0.05,
        }
    }
}

/// Named-factor weight sets with a sum-to-one grand invariant
///
/// The invariant is enforced by renormalization on every external write,
/// never assumed to hold by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorWeights {
    base: HashMap<PriorityFactor, f32>,
    advanced: Option<HashMap<AdvancedFactor, f32>>,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            base: PriorityFactor::ALL
                .iter()
                .map(|f| (*f, f.default_weight()))
                .collect(),
            advanced: None,
        }
    }
}

impl FactorWeights {
    /// Base-only weights summing to 1.0
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable advanced factors with their default shares; base weights are
    /// rescaled so the grand total remains 1.0
    pub fn with_default_advanced() -> Self {
        let mut weights = Self::default();
        weights.advanced = Some(
            AdvancedFactor::ALL
                .iter()
                .map(|f| (*f, f.default_weight()))
                .collect(),
        );
        weights.normalize_with_advanced_share();
        weights
    }

    /// Build from optional name->weight maps (config surface); unknown names
    /// are ignored with a warning, and the result is normalized
    pub fn from_config(
        base: Option<&HashMap<String, f32>>,
        advanced: Option<&HashMap<String, f32>>,
    ) -> Self {
        let mut weights = match advanced {
            Some(_) => Self::with_default_advanced(),
            None => Self::default(),
        };

        if let Some(map) = base {
            for (name, value) in map {
                match PriorityFactor::from_name(name) {
                    Some(factor) => {
                        weights.base.insert(factor, value.max(0.0));
                    }
                    None => warn!(factor = %name, "ignoring unknown base factor in config"),
                }
            }
        }

        if let (Some(map), Some(adv)) = (advanced, weights.advanced.as_mut()) {
            for (name, value) in map {
                match AdvancedFactor::from_name(name) {
                    Some(factor) => {
                        adv.insert(factor, value.max(0.0));
                    }
                    None => warn!(factor = %name, "ignoring unknown advanced factor in config"),
                }
            }
        }

        weights.normalize();
        weights
    }

    pub fn advanced_enabled(&self) -> bool {
        self.advanced.is_some()
    }

    pub fn base_weight(&self, factor: PriorityFactor) -> f32 {
        self.base.get(&factor).copied().unwrap_or(0.0)
    }

    pub fn advanced_weight(&self, factor: AdvancedFactor) -> f32 {
        self.advanced
            .as_ref()
            .and_then(|m| m.get(&factor).copied())
            .unwrap_or(0.0)
    }

    /// Grand total across both sets; 1.0 after any external write
    pub fn total(&self) -> f32 {
        let base: f32 = self.base.values().sum();
        let advanced: f32 = self
            .advanced
            .as_ref()
            .map(|m| m.values().sum())
            .unwrap_or(0.0);
        base + advanced
    }

    /// Scale both sets proportionally so the grand total is 1.0
    pub fn normalize(&mut self) {
        let total = self.total();
        if total <= 0.0 {
            // Degenerate weights cannot be rescued proportionally; fall back
            // to defaults rather than divide by zero
            warn!("factor weights sum to zero, resetting to defaults");
            *self = if self.advanced.is_some() {
                Self::with_default_advanced()
            } else {
                Self::default()
            };
            return;
        }

        for value in self.base.values_mut() {
            *value /= total;
        }
        if let Some(advanced) = self.advanced.as_mut() {
            for value in advanced.values_mut() {
                *value /= total;
            }
        }
    }

    /// Rescale base weights to the share left over by the advanced set,
    /// keeping each set's internal ratios
    fn normalize_with_advanced_share(&mut self) {
        let Some(advanced) = &self.advanced else {
            self.normalize();
            return;
        };

        let advanced_total: f32 = advanced.values().sum();
        let base_total: f32 = self.base.values().sum();
        if base_total <= 0.0 || advanced_total >= 1.0 {
            self.normalize();
            return;
        }

        let scale = (1.0 - advanced_total) / base_total;
        for value in self.base.values_mut() {
            *value *= scale;
        }
    }

    /// Replace named weights, renormalizing to restore the invariant
    ///
    /// Supplied values whose sum deviates from 1.0 beyond tolerance are
    /// renormalized before application. Unknown factor names are ignored
    /// with a warning; a map naming no known factor is an error.
    pub fn adjust(&mut self, new_weights: &HashMap<String, f32>) -> Result<()> {
        let mut known: Vec<(&str, f32)> = Vec::new();
        for (name, value) in new_weights {
            let recognized = PriorityFactor::from_name(name).is_some()
                || (self.advanced.is_some() && AdvancedFactor::from_name(name).is_some());
            if recognized {
                known.push((name.as_str(), *value));
            } else {
                warn!(factor = %name, "ignoring unknown factor name in weight adjustment");
            }
        }

        if known.is_empty() {
            return Err(MemoryError::InvalidWeights {
                reason: "no recognized factor names supplied".to_string(),
            });
        }

        let sum: f32 = known.iter().map(|(_, v)| v).sum();
        if sum <= 0.0 {
            return Err(MemoryError::InvalidWeights {
                reason: format!("supplied weights sum to {sum}"),
            });
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            warn!(sum, "supplied weights do not sum to 1.0, renormalizing");
            for (_, value) in known.iter_mut() {
                *value /= sum;
            }
        }

        for (name, value) in known {
            if let Some(factor) = PriorityFactor::from_name(name) {
                self.base.insert(factor, value);
            } else if let (Some(factor), Some(advanced)) =
                (AdvancedFactor::from_name(name), self.advanced.as_mut())
            {
                advanced.insert(factor, value);
            }
        }

        self.normalize();
        Ok(())
    }

    /// Nudge weights by signed feedback in [-1, 1] per factor, then
    /// renormalize across both sets
    pub fn apply_feedback(&mut self, feedback: &HashMap<String, f32>, learning_rate: f32) {
        for (name, signal) in feedback {
            let delta = learning_rate * signal.clamp(-1.0, 1.0);
            if let Some(factor) = PriorityFactor::from_name(name) {
                let entry = self.base.entry(factor).or_insert(0.0);
                *entry = (*entry + delta).max(0.0);
            } else if let Some(factor) = AdvancedFactor::from_name(name) {
                if let Some(advanced) = self.advanced.as_mut() {
                    let entry = advanced.entry(factor).or_insert(0.0);
                    *entry = (*entry + delta).max(0.0);
                }
            } else {
                warn!(factor = %name, "ignoring unknown factor name in feedback");
            }
        }
        self.normalize();
    }

    /// Flattened name -> weight view for introspection
    pub fn snapshot(&self) -> HashMap<String, f32> {
        let mut out: HashMap<String, f32> = self
            .base
            .iter()
            .map(|(f, w)| (f.name().to_string(), *w))
            .collect();
        if let Some(advanced) = &self.advanced {
            out.extend(advanced.iter().map(|(f, w)| (f.name().to_string(), *w)));
        }
        out
    }
}

/// Per-factor breakdown of one score computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Final weighted score in [0, 1]
    pub total: f32,

    /// Unweighted sub-score per factor name
    pub factors: HashMap<String, f32>,
}

type CacheKey = (String, [u8; 32]);

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    score: f32,
    computed_at: DateTime<Utc>,
}

/// Fingerprint used for "no context" cache entries
const NO_CONTEXT_FINGERPRINT: [u8; 32] = [0u8; 32];

/// Multi-factor priority scoring engine
///
/// Read-mostly and safe to call from any task; the only synchronized state
/// is the weight set, the access history and the score cache.
pub struct PriorityEngine {
    config: ScoringConfig,
    weights: RwLock<FactorWeights>,
    history: Arc<AccessHistory>,
    cache: DashMap<CacheKey, CacheEntry>,
    goals: GoalRegistry,
    narratives: NarrativeRegistry,
    graph: Option<Arc<dyn EntityGraph>>,
}

impl PriorityEngine {
    pub fn new(config: ScoringConfig) -> Self {
        let weights = FactorWeights::from_config(
            config.factor_weights.as_ref(),
            config.advanced_factor_weights.as_ref(),
        );
        let history = Arc::new(AccessHistory::new(config.access_history_max_length));
        info!(
            advanced = weights.advanced_enabled(),
            cache_ttl_secs = config.cache_ttl_seconds,
            "priority scoring engine initialized"
        );

        Self {
            config,
            weights: RwLock::new(weights),
            history,
            cache: DashMap::new(),
            goals: GoalRegistry::new(),
            narratives: NarrativeRegistry::new(),
            graph: None,
        }
    }

    /// Attach the entity-relationship lookup used by the relationship factor
    pub fn with_entity_graph(mut self, graph: Arc<dyn EntityGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Shared access history, for wiring into the working set
    pub fn history(&self) -> Arc<AccessHistory> {
        Arc::clone(&self.history)
    }

    /// Score an item against an optional context
    ///
    /// Results are cached per (item id, context hash) for the configured
    /// TTL; within that window the cached score is returned unchanged even
    /// if the item's mutable fields have moved (explicit staleness
    /// contract). A cache miss records a passive access for the frequency
    /// factor before computing.
    pub fn score(&self, item: &MemoryItem, context: Option<&Context>, now: DateTime<Utc>) -> f32 {
        let key = (
            item.id.as_str().to_string(),
            context.map(Context::fingerprint).unwrap_or(NO_CONTEXT_FINGERPRINT),
        );

        if let Some(entry) = self.cache.get(&key) {
            if now.signed_duration_since(entry.computed_at) < self.config.cache_ttl() {
                return entry.score;
            }
        }

        self.history.record_access(item.id.as_str(), now);
        let breakdown = self.compute(item, context, now);

        self.cache.insert(
            key,
            CacheEntry {
                score: breakdown.total,
                computed_at: now,
            },
        );
        breakdown.total
    }

    /// Full per-factor breakdown; bypasses the cache and records no access
    pub fn explain(
        &self,
        item: &MemoryItem,
        context: Option<&Context>,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        self.compute(item, context, now)
    }

    fn compute(
        &self,
        item: &MemoryItem,
        context: Option<&Context>,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let weights = self.weights.read().clone();
        let id = item.id.as_str();
        let mut factor_scores: HashMap<String, f32> = HashMap::new();

        let base_pairs = [
            (PriorityFactor::Recency, factors::recency_score(item, now)),
            (
                PriorityFactor::Frequency,
                factors::frequency_score(&self.history, id, now),
            ),
            (PriorityFactor::Emotional, factors::emotional_score(item)),
            (PriorityFactor::Explicit, factors::explicit_score(item)),
            (
                PriorityFactor::Relevance,
                context.map_or(0.0, |ctx| factors::relevance_score(item, ctx)),
            ),
            (
                PriorityFactor::Attention,
                factors::attention_score(&self.history, id, now),
            ),
            (
                PriorityFactor::Semantic,
                context.map_or(0.0, |ctx| factors::semantic_score(item, ctx)),
            ),
        ];

        let mut total = 0.0f32;
        for (factor, sub_score) in base_pairs {
            total += sub_score * weights.base_weight(factor);
            factor_scores.insert(factor.name().to_string(), sub_score);
        }

        if weights.advanced_enabled() {
            let empty_context = Context::default();
            let ctx = context.unwrap_or(&empty_context);
            let advanced_pairs = [
                (
                    AdvancedFactor::TemporalPattern,
                    advanced::temporal_pattern_score(&self.history, id),
                ),
                (
                    AdvancedFactor::Relationship,
                    advanced::relationship_score(item, ctx, self.graph.as_deref()),
                ),
                (
                    AdvancedFactor::GoalRelevance,
                    advanced::goal_relevance_score(item, &self.goals),
                ),
                (
                    AdvancedFactor::Narrative,
                    advanced::narrative_score(item, &self.narratives),
                ),
                (
                    AdvancedFactor::Novelty,
                    advanced::novelty_score(item, &self.history, now),
                ),
                (
                    AdvancedFactor::Predictive,
                    advanced::predictive_score(item, ctx),
                ),
            ];

            for (factor, sub_score) in advanced_pairs {
                total += sub_score * weights.advanced_weight(factor);
                factor_scores.insert(factor.name().to_string(), sub_score);
            }
        }

        ScoreBreakdown {
            total: total.clamp(0.0, 1.0),
            factors: factor_scores,
        }
    }

    /// Rank a batch of candidate items, descending by score
    ///
    /// The sort is stable: equal scores keep the input (insertion) order.
    pub fn rank(
        &self,
        items: &[MemoryItem],
        context: Option<&Context>,
        limit: Option<usize>,
    ) -> Vec<(MemoryId, f32)> {
        let now = Utc::now();
        let mut scored: Vec<(MemoryId, f32)> = items
            .iter()
            .map(|item| (item.id.clone(), self.score(item, context, now)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(limit) = limit {
            scored.truncate(limit);
        }
        scored
    }

    /// Record an explicit user-attention signal for an item
    pub fn record_user_attention(&self, id: &str, attention_level: f32) {
        self.history
            .record_attention(id, attention_level, Utc::now());
    }

    /// Replace factor weights; renormalized on application
    pub fn adjust_weights(&self, new_weights: &HashMap<String, f32>) -> Result<()> {
        let mut weights = self.weights.write();
        weights.adjust(new_weights)?;
        debug!(weights = ?weights.snapshot(), "factor weights adjusted");
        Ok(())
    }

    /// Nudge weights from feedback signals in [-1, 1] per factor name
    pub fn apply_weight_feedback(
        &self,
        feedback: &HashMap<String, f32>,
        learning_rate: Option<f32>,
    ) {
        let rate = learning_rate.unwrap_or(DEFAULT_WEIGHT_LEARNING_RATE);
        self.weights.write().apply_feedback(feedback, rate);
    }

    /// Current name -> weight view
    pub fn weights_snapshot(&self) -> HashMap<String, f32> {
        self.weights.read().snapshot()
    }

    // -------------------------------------------------------------------
    // Goal / narrative registries
    // -------------------------------------------------------------------

    pub fn update_user_goal(&self, description: impl Into<String>, importance: f32) {
        self.goals.update(description, importance);
    }

    pub fn remove_user_goal(&self, description: &str) -> bool {
        self.goals.remove(description)
    }

    pub fn user_goals(&self) -> Vec<UserGoal> {
        self.goals.snapshot()
    }

    pub fn add_memory_to_narrative(&self, narrative_id: &str, memory_id: &str, importance: f32) {
        self.narratives.add_memory(narrative_id, memory_id, importance);
    }

    pub fn remove_memory_from_narrative(&self, narrative_id: &str, memory_id: &str) -> bool {
        self.narratives.remove_memory(narrative_id, memory_id)
    }

    /// Number of cached score entries (introspection/tests)
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}
