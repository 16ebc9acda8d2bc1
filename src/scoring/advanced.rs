//! Advanced factor sub-scores and their registries
//!
//! These extend the base factors without replacing them: temporal access
//! patterns, entity-relationship significance, user goals, narratives,
//! novelty, and a reserved predictive slot. Goal and narrative registries
//! are process-wide mutable state with explicit add/remove/update ops.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::access_history::AccessHistory;
use crate::constants::{
    GOAL_IMPORTANCE_FLOOR, NOVELTY_ACCESS_SCALE, NOVELTY_AGE_SCALE_DAYS, PREDICTIVE_PLACEHOLDER,
    TEMPORAL_PATTERN_MIN_ACCESSES,
};
use crate::context::Context;
use crate::providers::EntityGraph;
use crate::types::MemoryItem;

/// A registered user goal, matched against item content by keyword overlap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGoal {
    pub description: String,
    pub importance: f32,
}

/// A named grouping of memory ids sharing elevated importance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Narrative {
    pub memory_ids: HashSet<String>,
    pub importance: f32,
}

/// User goal registry, ordered by importance descending
///
/// Entries whose importance drops below the floor are pruned on the next
/// update, never eagerly.
#[derive(Debug, Default)]
pub struct GoalRegistry {
    goals: RwLock<Vec<UserGoal>>,
}

impl GoalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a goal, keeping the list sorted and pruned
    pub fn update(&self, description: impl Into<String>, importance: f32) {
        let description = description.into();
        let importance = importance.clamp(0.0, 1.0);
        let mut goals = self.goals.write();

        // Prune before applying the incoming goal: an entry below the floor
        // survives its own update and is swept by the next one
        goals.retain(|g| g.importance >= GOAL_IMPORTANCE_FLOOR);

        if let Some(existing) = goals.iter_mut().find(|g| g.description == description) {
            existing.importance = importance;
        } else {
            goals.push(UserGoal {
                description,
                importance,
            });
        }

        goals.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    pub fn remove(&self, description: &str) -> bool {
        let mut goals = self.goals.write();
        let before = goals.len();
        goals.retain(|g| g.description != description);
        goals.len() < before
    }

    pub fn snapshot(&self) -> Vec<UserGoal> {
        self.goals.read().clone()
    }
}

/// Narrative registry, many-to-many with memory ids
#[derive(Debug, Default)]
pub struct NarrativeRegistry {
    narratives: RwLock<HashMap<String, Narrative>>,
}

impl NarrativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a memory to a narrative; narrative importance is the max of its
    /// members' importances
    pub fn add_memory(&self, narrative_id: &str, memory_id: &str, importance: f32) {
        let mut narratives = self.narratives.write();
        let narrative = narratives.entry(narrative_id.to_string()).or_default();
        narrative.memory_ids.insert(memory_id.to_string());
        narrative.importance = narrative.importance.max(importance.clamp(0.0, 1.0));
    }

    /// Remove a memory from a narrative; an emptied narrative is dropped
    pub fn remove_memory(&self, narrative_id: &str, memory_id: &str) -> bool {
        let mut narratives = self.narratives.write();
        let Some(narrative) = narratives.get_mut(narrative_id) else {
            return false;
        };

        if !narrative.memory_ids.remove(memory_id) {
            return false;
        }
        if narrative.memory_ids.is_empty() {
            narratives.remove(narrative_id);
            debug!(narrative_id, "dropped emptied narrative");
        }
        true
    }

    /// Maximum importance among narratives containing this memory id
    pub fn max_importance_for(&self, memory_id: &str) -> Option<f32> {
        let narratives = self.narratives.read();
        narratives
            .values()
            .filter(|n| n.memory_ids.contains(memory_id))
            .map(|n| n.importance)
            .fold(None, |acc, imp| Some(acc.map_or(imp, |a: f32| a.max(imp))))
    }

    pub fn len(&self) -> usize {
        self.narratives.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.narratives.read().is_empty()
    }
}

/// Periodicity of access timestamps at daily and weekly candidate periods
///
/// For each adjacent access pair, `interval / period` is compared against
/// the nearest integer multiple; closeness is averaged over all intervals
/// and the stronger of the two periods wins. Requires at least 3 accesses.
pub fn temporal_pattern_score(history: &AccessHistory, id: &str) -> f32 {
    let timestamps = history.timestamps(id);
    if timestamps.len() < TEMPORAL_PATTERN_MIN_ACCESSES {
        return 0.0;
    }

    let daily = periodic_pattern_strength(&timestamps, Duration::days(1));
    let weekly = periodic_pattern_strength(&timestamps, Duration::days(7));
    daily.max(weekly)
}

fn periodic_pattern_strength(timestamps: &[DateTime<Utc>], period: Duration) -> f32 {
    let period_seconds = period.num_seconds() as f64;
    if period_seconds <= 0.0 || timestamps.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0f64;
    let mut count = 0usize;
    for pair in timestamps.windows(2) {
        let interval = pair[1].signed_duration_since(pair[0]).num_seconds() as f64;
        let periods = interval / period_seconds;
        let closest = periods.round();
        total += 1.0 - (periods - closest).abs().min(1.0);
        count += 1;
    }

    if count == 0 {
        0.0
    } else {
        (total / count as f64) as f32
    }
}

/// Maximum pairwise relationship strength between entities referenced by the
/// item and by the context; 0.0 without a graph or without entities
pub fn relationship_score(
    item: &MemoryItem,
    context: &Context,
    graph: Option<&dyn EntityGraph>,
) -> f32 {
    let Some(graph) = graph else {
        return 0.0;
    };

    let item_entities = item_entity_ids(item);
    let context_entities = context_entity_ids(context);
    if item_entities.is_empty() || context_entities.is_empty() {
        return 0.0;
    }

    let mut best = 0.0f32;
    for source in &item_entities {
        for target in &context_entities {
            if source == target {
                continue;
            }
            if let Some(strength) = graph.relationship_strength(source, target) {
                best = best.max(strength);
            }
        }
    }
    best
}

fn item_entity_ids(item: &MemoryItem) -> Vec<String> {
    let mut ids = Vec::new();
    for key in ["entities", "participants"] {
        if let Some(values) = item.attributes.get(key).and_then(|v| v.as_array()) {
            ids.extend(values.iter().filter_map(|v| v.as_str().map(str::to_string)));
        }
    }
    ids
}

fn context_entity_ids(context: &Context) -> Vec<String> {
    let mut ids = context.entities.clone();
    ids.extend(context.participants.iter().cloned());
    ids
}

/// Keyword-overlap relevance to the strongest matching user goal
///
/// Fraction of goal keywords found in the content, scaled by the goal's
/// importance; maximum across goals.
pub fn goal_relevance_score(item: &MemoryItem, goals: &GoalRegistry) -> f32 {
    let goals = goals.snapshot();
    if goals.is_empty() || item.content.is_empty() {
        return 0.0;
    }

    let content_lower = item.content.to_lowercase();
    let mut best = 0.0f32;

    for goal in &goals {
        let keywords: Vec<&str> = goal.description.split_whitespace().collect();
        if keywords.is_empty() {
            continue;
        }
        let matches = keywords
            .iter()
            .filter(|kw| content_lower.contains(&kw.to_lowercase()))
            .count();
        let relevance = (matches as f32 / keywords.len() as f32).min(1.0) * goal.importance;
        best = best.max(relevance);
    }

    best
}

/// Maximum importance among narratives containing this item
pub fn narrative_score(item: &MemoryItem, narratives: &NarrativeRegistry) -> f32 {
    narratives
        .max_importance_for(item.id.as_str())
        .unwrap_or(0.0)
}

/// Novelty: decays slowly with age, faster with repeated access
///
/// `exp(-days_since_creation / 365) * exp(-access_count / 10)`
pub fn novelty_score(item: &MemoryItem, history: &AccessHistory, now: DateTime<Utc>) -> f32 {
    let age = now.signed_duration_since(item.created_at);
    let days = (age.num_seconds().max(0) as f64) / 86_400.0;
    let age_factor = (-days / NOVELTY_AGE_SCALE_DAYS).exp();

    let access_count = history.access_count(item.id.as_str()) as f64;
    let frequency_factor = (-access_count / NOVELTY_ACCESS_SCALE).exp();

    (age_factor * frequency_factor) as f32
}

/// Reserved extension point; stable placeholder until a model is supplied
pub fn predictive_score(_item: &MemoryItem, _context: &Context) -> f32 {
    PREDICTIVE_PLACEHOLDER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryRecord;

    fn item(content: &str) -> MemoryItem {
        MemoryItem::from_record(MemoryRecord::new(content, "episodic"), Utc::now())
    }

    struct FixedGraph(f32);

    impl EntityGraph for FixedGraph {
        fn relationship_strength(&self, source: &str, target: &str) -> Option<f32> {
            (source == "alice" && target == "bob").then_some(self.0)
        }
    }

    #[test]
    fn test_temporal_pattern_needs_three_accesses() {
        let history = AccessHistory::default();
        let now = Utc::now();
        history.record_access("m", now - Duration::days(2));
        history.record_access("m", now - Duration::days(1));
        assert_eq!(temporal_pattern_score(&history, "m"), 0.0);
    }

    #[test]
    fn test_daily_pattern_detected() {
        let history = AccessHistory::default();
        let now = Utc::now();
        for days_ago in (0..5).rev() {
            history.record_access("daily", now - Duration::days(days_ago));
        }

        let score = temporal_pattern_score(&history, "daily");
        assert!(score > 0.95, "exact daily intervals, got {score}");
    }

    #[test]
    fn test_irregular_accesses_score_low() {
        let history = AccessHistory::default();
        let now = Utc::now();
        history.record_access("noisy", now - Duration::hours(100));
        history.record_access("noisy", now - Duration::hours(63));
        history.record_access("noisy", now - Duration::hours(11));
        history.record_access("noisy", now);

        let regular = {
            let h = AccessHistory::default();
            for d in (0..4).rev() {
                h.record_access("r", now - Duration::days(d));
            }
            temporal_pattern_score(&h, "r")
        };
        assert!(temporal_pattern_score(&history, "noisy") < regular);
    }

    #[test]
    fn test_relationship_score_max_pairwise() {
        let graph = FixedGraph(0.8);
        let m = item("lunch").with_entities(&["alice", "carol"]);
        let context = Context::new().with_entities(["bob", "dora"]);

        assert!((relationship_score(&m, &context, Some(&graph)) - 0.8).abs() < 1e-6);
        assert_eq!(relationship_score(&m, &context, None), 0.0);
    }

    #[test]
    fn test_relationship_score_ignores_self_pairs() {
        let graph = FixedGraph(0.8);
        let m = item("x").with_entities(&["alice"]);
        let context = Context::new().with_entities(["alice"]);
        assert_eq!(relationship_score(&m, &context, Some(&graph)), 0.0);
    }

    #[test]
    fn test_goal_relevance_scaled_by_importance() {
        let goals = GoalRegistry::new();
        goals.update("learn rust async", 0.8);

        let m = item("Spent the evening trying to learn rust lifetimes");
        // 2 of 3 goal keywords present, scaled by 0.8
        let score = goal_relevance_score(&m, &goals);
        assert!((score - (2.0 / 3.0) * 0.8).abs() < 1e-5);

        assert_eq!(goal_relevance_score(&item("unrelated"), &goals), 0.0);
    }

    #[test]
    fn test_goal_registry_prunes_below_floor_on_next_update() {
        let goals = GoalRegistry::new();
        goals.update("ship release", 0.9);
        goals.update("stale goal", 0.05);

        // The sub-floor goal survives its own update call
        assert_eq!(goals.snapshot().len(), 2);

        // and is pruned by the next one
        goals.update("ship release", 0.9);
        let remaining = goals.snapshot();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].description, "ship release");
    }

    #[test]
    fn test_goal_registry_sorted_descending() {
        let goals = GoalRegistry::new();
        goals.update("minor", 0.3);
        goals.update("major", 0.9);

        let snapshot = goals.snapshot();
        assert_eq!(snapshot[0].description, "major");

        // Update re-sorts
        goals.update("minor", 0.95);
        assert_eq!(goals.snapshot()[0].description, "minor");
    }

    #[test]
    fn test_narrative_score_is_max_membership() {
        let narratives = NarrativeRegistry::new();
        narratives.add_memory("trip", "m1", 0.4);
        narratives.add_memory("career", "m1", 0.9);
        narratives.add_memory("trip", "m2", 0.4);

        let m1 = {
            let mut i = item("x");
            i.id = "m1".into();
            i
        };
        assert!((narrative_score(&m1, &narratives) - 0.9).abs() < 1e-6);

        let unknown = item("y");
        assert_eq!(narrative_score(&unknown, &narratives), 0.0);
    }

    #[test]
    fn test_narrative_dropped_when_emptied() {
        let narratives = NarrativeRegistry::new();
        narratives.add_memory("trip", "m1", 0.5);
        assert!(narratives.remove_memory("trip", "m1"));
        assert!(narratives.is_empty());
        assert!(!narratives.remove_memory("trip", "m1"));
    }

    #[test]
    fn test_novelty_decays_with_access() {
        let history = AccessHistory::default();
        let now = Utc::now();
        let m = item("fresh");

        let untouched = novelty_score(&m, &history, now);
        assert!(untouched > 0.99, "fresh unaccessed item is maximally novel");

        for _ in 0..10 {
            history.record_access(m.id.as_str(), now);
        }
        let worn = novelty_score(&m, &history, now);
        assert!(worn < untouched);
        assert!((worn - (-1.0f64).exp() as f32).abs() < 1e-4);
    }

    #[test]
    fn test_predictive_placeholder() {
        assert_eq!(predictive_score(&item("x"), &Context::new()), 0.5);
    }

    // Test helper: attach entity ids as the attribute the factor reads
    impl MemoryItem {
        fn with_entities(mut self, entities: &[&str]) -> Self {
            self.attributes
                .insert("entities".to_string(), serde_json::json!(entities));
            self
        }
    }
}
