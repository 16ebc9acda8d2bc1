//! Retrieval context passed to the scoring engine
//!
//! A context describes "what the agent is attending to right now" and drives
//! the context-dependent factors (relevance, semantic, relationship). The
//! context hash keys the score cache; SHA-256 over the canonical JSON form
//! gives a hash that is stable across runs, unlike `DefaultHasher`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Current-situation context for relevance scoring
///
/// All fields are optional signals; an empty context scores the
/// context-dependent factors at 0.0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// Keywords the agent is currently processing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    /// Entity ids referenced by the current situation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,

    /// Current location, matched against item attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Participant ids present in the current situation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,

    /// Embedding of the current situation, for the semantic factor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Category labels for concept-style matching
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Unrecognized key/value pairs, carried through untouched
    ///
    /// BTreeMap keeps serialization (and therefore the context hash) stable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = entities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// True when no signal is present in any field
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.entities.is_empty()
            && self.location.is_none()
            && self.participants.is_empty()
            && self.embedding.is_none()
            && self.categories.is_empty()
            && self.extra.is_empty()
    }

    /// Stable fingerprint of this context for score-cache keying
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        // serde_json maps are sorted (BTreeMap-backed), so the canonical
        // JSON form is deterministic for equal contexts
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hasher.update(&bytes);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        assert!(Context::new().is_empty());
        assert!(!Context::new().with_keywords(["rust"]).is_empty());
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = Context::new()
            .with_keywords(["deploy", "rollback"])
            .with_location("office");
        let b = Context::new()
            .with_keywords(["deploy", "rollback"])
            .with_location("office");

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_by_content() {
        let a = Context::new().with_keywords(["deploy"]);
        let b = Context::new().with_keywords(["rollback"]);
        assert_ne!(a.fingerprint(), b.fingerprint());

        let empty = Context::new();
        assert_ne!(a.fingerprint(), empty.fingerprint());
    }
}
