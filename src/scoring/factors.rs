//! Base factor sub-scores
//!
//! Each factor maps an item (plus optional context) to [0, 1]. The formulas
//! are part of the compatibility contract with downstream consumers; change
//! the weights, not the curves.

use chrono::{DateTime, Duration, Utc};

use crate::access_history::AccessHistory;
use crate::constants::{
    ATTENTION_WINDOW_DAYS, FREQUENCY_SATURATION, FREQUENCY_WINDOW_DAYS, NEUTRAL_SCORE,
    RECENCY_HALF_LIFE_DAYS,
};
use crate::context::Context;
use crate::similarity::cosine_similarity;
use crate::types::MemoryItem;

/// Exponential half-life decay over time since last access
///
/// `0.5 ^ (elapsed / half_life)`: exactly 0.5 one half-life after the last
/// access, 1.0 at the moment of access.
pub fn recency_score(item: &MemoryItem, now: DateTime<Utc>) -> f32 {
    let elapsed = now.signed_duration_since(item.last_accessed);
    if elapsed <= Duration::zero() {
        return 1.0;
    }

    let half_lives = elapsed.num_milliseconds() as f64
        / (RECENCY_HALF_LIFE_DAYS * 24.0 * 3600.0 * 1000.0);
    0.5f64.powf(half_lives) as f32
}

/// Accesses in the trailing window, linearly scaled to saturation
pub fn frequency_score(history: &AccessHistory, id: &str, now: DateTime<Utc>) -> f32 {
    let cutoff = now - Duration::days(FREQUENCY_WINDOW_DAYS);
    let count = history.count_since(id, cutoff);
    (count as f32 / FREQUENCY_SATURATION).min(1.0)
}

/// Mean absolute emotion intensity, falling back to explicit importance,
/// falling back to neutral
pub fn emotional_score(item: &MemoryItem) -> f32 {
    if let Some(weights) = &item.emotion_weights {
        if !weights.is_empty() {
            let sum: f32 = weights.values().map(|v| v.abs()).sum();
            return (sum / weights.len() as f32).min(1.0);
        }
    }

    item.importance.unwrap_or(NEUTRAL_SCORE)
}

/// Explicit importance if present, else neutral
pub fn explicit_score(item: &MemoryItem) -> f32 {
    item.importance.unwrap_or(NEUTRAL_SCORE)
}

/// Additive keyword/entity/attribute overlap with the current context
///
/// +0.2 per matching keyword, +0.3 for an entity mention, +0.2 for a
/// location match, participant and category overlap scaled by the fraction
/// of the item's list that overlaps; capped at 1.0. Returns 0.0 with no
/// context signal.
pub fn relevance_score(item: &MemoryItem, context: &Context) -> f32 {
    let mut relevance = 0.0f32;
    let content_lower = item.content.to_lowercase();

    // Keyword overlap against content, one bonus per distinct keyword
    for keyword in &context.keywords {
        if content_lower.contains(&keyword.to_lowercase()) {
            relevance += 0.2;
        }
    }

    // Entity mention in content
    if context
        .entities
        .iter()
        .any(|e| content_lower.contains(&e.to_lowercase()))
    {
        relevance += 0.3;
    }

    // Location attribute equality
    if let (Some(ctx_location), Some(item_location)) = (
        context.location.as_deref(),
        item.attributes.get("location").and_then(|v| v.as_str()),
    ) {
        if ctx_location == item_location {
            relevance += 0.2;
        }
    }

    // Participant overlap, scaled by fraction of the item's participants
    if !context.participants.is_empty() {
        if let Some(item_participants) = string_list_attribute(item, "participants") {
            if !item_participants.is_empty() {
                let overlap = item_participants
                    .iter()
                    .filter(|p| context.participants.iter().any(|c| c == *p))
                    .count();
                if overlap > 0 {
                    relevance += 0.3 * (overlap as f32 / item_participants.len() as f32);
                }
            }
        }
    }

    // Category overlap, scaled by fraction of the item's categories
    if !context.categories.is_empty() {
        if let Some(item_categories) = string_list_attribute(item, "categories") {
            if !item_categories.is_empty() {
                let overlap = item_categories
                    .iter()
                    .filter(|c| context.categories.iter().any(|x| x == *c))
                    .count();
                if overlap > 0 {
                    relevance += 0.2 * (overlap as f32 / item_categories.len() as f32);
                }
            }
        }
    }

    relevance.min(1.0)
}

/// Mean recorded attention over the trailing window; 0.0 with no signal
pub fn attention_score(history: &AccessHistory, id: &str, now: DateTime<Utc>) -> f32 {
    let cutoff = now - Duration::days(ATTENTION_WINDOW_DAYS);
    history.mean_attention_since(id, cutoff).unwrap_or(0.0)
}

/// Cosine similarity between item and context embeddings, re-curved to
/// spread the useful high end
///
/// Similarities above 0.5 are pushed toward 1 (`0.5 + (sim-0.5)^0.7`),
/// those at or below 0.5 compressed toward 0 (`0.5 * (sim/0.5)^1.3`).
/// Returns 0.0 when either embedding is missing.
pub fn semantic_score(item: &MemoryItem, context: &Context) -> f32 {
    let (Some(item_emb), Some(ctx_emb)) = (&item.embedding, &context.embedding) else {
        return 0.0;
    };

    // Negative similarity carries no retrieval signal; clamp before the
    // fractional exponents below, which are undefined for negative bases
    let sim = cosine_similarity(item_emb, ctx_emb).max(0.0);

    let scaled = if sim > 0.5 {
        0.5 + (sim as f64 - 0.5).powf(0.7)
    } else {
        0.5 * (sim as f64 / 0.5).powf(1.3)
    };

    (scaled as f32).clamp(0.0, 1.0)
}

/// Read a string-array attribute from the item, if shaped as one
fn string_list_attribute(item: &MemoryItem, key: &str) -> Option<Vec<String>> {
    item.attributes.get(key)?.as_array().map(|values| {
        values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryRecord;
    use std::collections::HashMap;

    fn item(record: MemoryRecord) -> MemoryItem {
        MemoryItem::from_record(record, Utc::now())
    }

    #[test]
    fn test_recency_half_life_is_exact() {
        let mut m = item(MemoryRecord::new("x", "episodic"));
        let now = Utc::now();
        m.last_accessed = now - Duration::days(7);

        let score = recency_score(&m, now);
        assert!((score - 0.5).abs() < 1e-4, "got {score}");
    }

    #[test]
    fn test_recency_just_accessed_is_full() {
        let m = item(MemoryRecord::new("x", "episodic"));
        assert!((recency_score(&m, m.last_accessed) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_frequency_saturates_at_ten() {
        let history = AccessHistory::default();
        let now = Utc::now();
        for i in 0..15 {
            history.record_access("hot", now - Duration::hours(i));
        }
        history.record_access("cold", now - Duration::days(30));

        assert!((frequency_score(&history, "hot", now) - 1.0).abs() < 1e-6);
        assert_eq!(frequency_score(&history, "cold", now), 0.0);
        assert_eq!(frequency_score(&history, "unknown", now), 0.0);
    }

    #[test]
    fn test_emotional_mean_of_absolute_intensities() {
        let mut weights = HashMap::new();
        weights.insert("joy".to_string(), 0.8);
        weights.insert("fear".to_string(), -0.6);
        let m = item(MemoryRecord::new("x", "episodic").with_emotion_weights(weights));

        assert!((emotional_score(&m) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_emotional_fallback_chain() {
        // No emotions, explicit importance present
        let m = item(MemoryRecord::new("x", "episodic").with_importance(0.9));
        assert!((emotional_score(&m) - 0.9).abs() < 1e-6);

        // Neither -> neutral
        let m = item(MemoryRecord::new("x", "episodic"));
        assert!((emotional_score(&m) - 0.5).abs() < 1e-6);

        // Empty map falls through, not zero
        let m = item(MemoryRecord::new("x", "episodic").with_emotion_weights(HashMap::new()));
        assert!((emotional_score(&m) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_additive_and_capped() {
        let m = item(
            MemoryRecord::new("Met Priya at the deploy review", "episodic")
                .with_attribute("location", serde_json::json!("office"))
                .with_attribute("participants", serde_json::json!(["priya", "sam"])),
        );

        let context = Context::new()
            .with_keywords(["deploy"])
            .with_entities(["Priya"])
            .with_location("office")
            .with_participants(["priya", "sam"]);

        // 0.2 keyword + 0.3 entity + 0.2 location + 0.3 * (2/2) participants
        let score = relevance_score(&m, &context);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_keyword_bonus_stacks_per_keyword() {
        // Two distinct matching keywords, repeats of one keyword do not count twice
        let m = item(MemoryRecord::new("deploy deploy rollback", "episodic"));
        let context = Context::new().with_keywords(["deploy", "rollback"]);
        assert!((relevance_score(&m, &context) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_caps_at_one() {
        let m = item(MemoryRecord::new("alpha beta gamma delta epsilon zeta", "episodic"));
        let context =
            Context::new().with_keywords(["alpha", "beta", "gamma", "delta", "epsilon", "zeta"]);
        assert!((relevance_score(&m, &context) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_partial_participant_overlap() {
        let m = item(
            MemoryRecord::new("standup", "episodic")
                .with_attribute("participants", serde_json::json!(["a", "b", "c", "d"])),
        );
        let context = Context::new().with_participants(["a"]);
        assert!((relevance_score(&m, &context) - 0.3 * 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_semantic_requires_both_embeddings() {
        let with_emb = item(MemoryRecord::new("x", "episodic").with_embedding(vec![1.0, 0.0]));
        let without = item(MemoryRecord::new("x", "episodic"));

        let ctx_with = Context::new().with_embedding(vec![1.0, 0.0]);
        let ctx_without = Context::new();

        assert_eq!(semantic_score(&without, &ctx_with), 0.0);
        assert_eq!(semantic_score(&with_emb, &ctx_without), 0.0);
        assert!(semantic_score(&with_emb, &ctx_with) > 0.9);
    }

    #[test]
    fn test_semantic_recurve_spreads_high_end() {
        let m = item(MemoryRecord::new("x", "episodic").with_embedding(vec![1.0, 0.0]));

        // sim = cos(~25.8deg) = 0.9
        let ctx = Context::new().with_embedding(vec![0.9, 0.43589]);
        let high = semantic_score(&m, &ctx);
        assert!(high > 0.9, "high similarities pushed up, got {high}");

        // orthogonal-ish: sim = ~0.3 compressed below 0.3
        let ctx = Context::new().with_embedding(vec![0.3, 0.9539]);
        let low = semantic_score(&m, &ctx);
        assert!(low < 0.3, "low similarities compressed, got {low}");
    }

    #[test]
    fn test_attention_window() {
        let history = AccessHistory::default();
        let now = Utc::now();
        history.record_attention("m", 0.9, now - Duration::days(40)); // outside window
        assert_eq!(attention_score(&history, "m", now), 0.0);

        history.record_attention("m", 0.6, now - Duration::days(2));
        assert!((attention_score(&history, "m", now) - 0.6).abs() < 1e-6);
    }
}
