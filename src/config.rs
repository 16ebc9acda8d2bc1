//! Configuration for the memory-relevance core
//!
//! Sensible defaults, serde-overridable, with environment variable overrides
//! for deployment tuning (`ENGRAM_*`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::warn;

use crate::constants::{
    DEFAULT_ACCESS_HISTORY_MAX, DEFAULT_ACTIVATION_BOOST, DEFAULT_CACHE_TTL_SECS,
    DEFAULT_CAPACITY, DEFAULT_CONSOLIDATION_ACCESS_COUNT, DEFAULT_CONSOLIDATION_ACTIVATION,
    DEFAULT_DECAY_RATE, DEFAULT_PROVIDER_TIMEOUT_MS, DEFAULT_RETENTION_THRESHOLD,
    DEFAULT_TICK_INTERVAL_MS,
};

/// Working-set behavior knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingSetConfig {
    /// Hard cap on resident items
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Activation lost per second of inactivity
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f32,

    /// Activation gained per access, capped at 1.0
    #[serde(default = "default_activation_boost")]
    pub activation_boost: f32,

    /// Items decaying below this are forgotten
    #[serde(default = "default_retention_threshold")]
    pub retention_threshold: f32,

    /// Accesses required (strictly more) before consolidation candidacy
    #[serde(default = "default_consolidation_access_count")]
    pub consolidation_access_count_threshold: u32,

    /// Activation required (strictly more) for consolidation candidacy
    #[serde(default = "default_consolidation_activation")]
    pub consolidation_activation_threshold: f32,

    /// Background decay/consolidation tick interval
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Deadline for embedding and long-term-store calls
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_decay_rate() -> f32 {
    DEFAULT_DECAY_RATE
}

fn default_activation_boost() -> f32 {
    DEFAULT_ACTIVATION_BOOST
}

fn default_retention_threshold() -> f32 {
    DEFAULT_RETENTION_THRESHOLD
}

fn default_consolidation_access_count() -> u32 {
    DEFAULT_CONSOLIDATION_ACCESS_COUNT
}

fn default_consolidation_activation() -> f32 {
    DEFAULT_CONSOLIDATION_ACTIVATION
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_provider_timeout_ms() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_MS
}

impl Default for WorkingSetConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            decay_rate: default_decay_rate(),
            activation_boost: default_activation_boost(),
            retention_threshold: default_retention_threshold(),
            consolidation_access_count_threshold: default_consolidation_access_count(),
            consolidation_activation_threshold: default_consolidation_activation(),
            tick_interval_ms: default_tick_interval_ms(),
            provider_timeout_ms: default_provider_timeout_ms(),
        }
    }
}

impl WorkingSetConfig {
    /// Load defaults, then apply `ENGRAM_*` environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = parse_env("ENGRAM_CAPACITY") {
            config.capacity = v;
        }
        if let Some(v) = parse_env("ENGRAM_DECAY_RATE") {
            config.decay_rate = v;
        }
        if let Some(v) = parse_env("ENGRAM_ACTIVATION_BOOST") {
            config.activation_boost = v;
        }
        if let Some(v) = parse_env("ENGRAM_RETENTION_THRESHOLD") {
            config.retention_threshold = v;
        }
        if let Some(v) = parse_env("ENGRAM_TICK_INTERVAL_MS") {
            config.tick_interval_ms = v;
        }
        if let Some(v) = parse_env("ENGRAM_PROVIDER_TIMEOUT_MS") {
            config.provider_timeout_ms = v;
        }

        config
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Scoring engine knobs
///
/// Weight maps are optional: absent maps use the built-in factor defaults.
/// Supplied maps are normalized on load, so serialized configs need not sum
/// to exactly 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Base factor name -> weight overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor_weights: Option<HashMap<String, f32>>,

    /// Advanced factor name -> weight overrides; enables advanced scoring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_factor_weights: Option<HashMap<String, f32>>,

    /// Score cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Maximum retained access records per item
    #[serde(default = "default_history_max")]
    pub access_history_max_length: usize,
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_history_max() -> usize {
    DEFAULT_ACCESS_HISTORY_MAX
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            factor_weights: None,
            advanced_factor_weights: None,
            cache_ttl_seconds: default_cache_ttl(),
            access_history_max_length: default_history_max(),
        }
    }
}

impl ScoringConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_seconds as i64)
    }
}

/// Parse an environment variable, warning (not failing) on bad values
fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, raw, "ignoring unparseable environment override");
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_set_defaults() {
        let config = WorkingSetConfig::default();
        assert_eq!(config.capacity, 7);
        assert!((config.decay_rate - 0.05).abs() < f32::EPSILON);
        assert!((config.activation_boost - 0.5).abs() < f32::EPSILON);
        assert!((config.retention_threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.consolidation_access_count_threshold, 3);
        assert!((config.consolidation_activation_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.tick_interval_ms, 1_000);
    }

    #[test]
    fn test_scoring_defaults() {
        let config = ScoringConfig::default();
        assert_eq!(config.cache_ttl_seconds, 300);
        assert_eq!(config.access_history_max_length, 100);
        assert!(config.factor_weights.is_none());
        assert!(config.advanced_factor_weights.is_none());
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: WorkingSetConfig = serde_json::from_str(r#"{"capacity": 3}"#).unwrap();
        assert_eq!(config.capacity, 3);
        assert!((config.decay_rate - 0.05).abs() < f32::EPSILON);

        let config: ScoringConfig = serde_json::from_str(r#"{"cache_ttl_seconds": 60}"#).unwrap();
        assert_eq!(config.cache_ttl_seconds, 60);
        assert_eq!(config.access_history_max_length, 100);
    }
}
