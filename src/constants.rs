//! Documented constants for the memory-relevance core
//!
//! All tunable parameters in one place with justification for their values.
//! Centralizing constants prevents magic numbers and makes tuning easier.

// =============================================================================
// WORKING SET CONSTANTS
// The working set models human working memory: a small number of highly
// activated items that decay unless refreshed.
// =============================================================================

/// Default working-set capacity
///
/// Justification:
/// - Miller's Law: human working memory holds 7 +/- 2 items
/// - Small enough that a full decay pass is O(capacity) and effectively free
/// - Capacity is a hard cap: eviction keeps the set at or below this size
pub const DEFAULT_CAPACITY: usize = 7;

/// Default activation decay rate (activation units per second)
///
/// Activation decays linearly: `activation -= decay_rate * elapsed_seconds`.
///
/// Justification:
/// - At 0.05/sec an untouched item at full activation survives ~16 seconds
///   above the retention threshold, matching the short horizon of attention
/// - Linear decay keeps the eviction ordering stable between ticks
pub const DEFAULT_DECAY_RATE: f32 = 0.05;

/// Default activation boost applied on access
///
/// Justification:
/// - 0.5 means a single access restores half the activation range, so two
///   quick accesses saturate an item back to 1.0
/// - Large relative to the per-second decay so that any access dominates
///   recent decay
pub const DEFAULT_ACTIVATION_BOOST: f32 = 0.5;

/// Default retention threshold below which items are forgotten
///
/// Justification:
/// - 0.2 leaves a deliberate gap to zero: items linger briefly in a
///   low-activation band where one access can still rescue them
/// - Soft cap only; capacity eviction may remove items above this value
pub const DEFAULT_RETENTION_THRESHOLD: f32 = 0.2;

/// Minimum elapsed time between decay passes (milliseconds)
///
/// Calls that trigger a decay pass (list, background tick) are debounced so
/// that bursts of reads do not recompute decay for sub-perceptual intervals.
pub const DECAY_DEBOUNCE_MS: u64 = 100;

/// Background worker tick interval (milliseconds)
///
/// One decay pass plus one consolidation sweep per tick. 1s keeps forgotten
/// items from lingering visibly while staying negligible in CPU terms.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Backoff after a failed background tick (milliseconds)
///
/// Tick errors are logged and the loop continues after this pause; a single
/// failure must never terminate the worker.
pub const TICK_ERROR_BACKOFF_MS: u64 = 5_000;

// =============================================================================
// CONSOLIDATION CONSTANTS
// Items accessed often enough while strongly activated are flagged for
// promotion to long-term storage.
// =============================================================================

/// Access count above which an item becomes a consolidation candidate
///
/// Strictly greater-than: the 4th access is the first that can flag.
pub const DEFAULT_CONSOLIDATION_ACCESS_COUNT: u32 = 3;

/// Activation floor for consolidation candidacy
///
/// Repeated access of a nearly forgotten item should not promote it; the
/// item must be both frequently accessed and currently strong.
pub const DEFAULT_CONSOLIDATION_ACTIVATION: f32 = 0.7;

// =============================================================================
// SCORING CONSTANTS
// Multi-factor priority scoring over recency, frequency, emotion, importance,
// context relevance, attention and semantic similarity.
// =============================================================================

/// Half-life for the recency factor (days)
///
/// Recency decays as `0.5 ^ (elapsed / half_life)`: an item last touched
/// exactly one half-life ago scores 0.5.
pub const RECENCY_HALF_LIFE_DAYS: f64 = 7.0;

/// Trailing window for the frequency factor (days)
pub const FREQUENCY_WINDOW_DAYS: i64 = 7;

/// Access count that saturates the frequency factor
///
/// `min(1.0, count / 10)`: ten accesses in the window scores 1.0.
pub const FREQUENCY_SATURATION: f32 = 10.0;

/// Trailing window for the user-attention factor (days)
pub const ATTENTION_WINDOW_DAYS: i64 = 30;

/// Neutral fallback sub-score when a factor has no signal for an item
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Score cache TTL (seconds)
///
/// Cached scores are served unchanged within this window even if the item's
/// mutable fields move underneath; 5 minutes is the accepted staleness
/// contract for ranking purposes.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Maximum retained access records per item
///
/// Bounded history keeps frequency/attention/periodicity computations O(100)
/// per item regardless of lifetime access volume.
pub const DEFAULT_ACCESS_HISTORY_MAX: usize = 100;

/// Tolerance when validating that factor weights sum to 1.0
pub const WEIGHT_SUM_TOLERANCE: f32 = 0.01;

/// Default learning rate for feedback-driven weight updates
pub const DEFAULT_WEIGHT_LEARNING_RATE: f32 = 0.05;

/// Goal registry entries below this importance are pruned on the next update
pub const GOAL_IMPORTANCE_FLOOR: f32 = 0.1;

// =============================================================================
// ADVANCED FACTOR CONSTANTS
// =============================================================================

/// Minimum accesses before the temporal-pattern factor reports a signal
pub const TEMPORAL_PATTERN_MIN_ACCESSES: usize = 3;

/// Novelty age scale (days): `exp(-days_since_creation / 365)`
pub const NOVELTY_AGE_SCALE_DAYS: f64 = 365.0;

/// Novelty access scale: `exp(-access_count / 10)`
pub const NOVELTY_ACCESS_SCALE: f64 = 10.0;

/// Placeholder value for the predictive factor until a model is supplied
pub const PREDICTIVE_PLACEHOLDER: f32 = 0.5;

// =============================================================================
// PROVIDER CONSTANTS
// =============================================================================

/// Default deadline for external provider calls (milliseconds)
///
/// Embedding generation and long-term-store round trips are bounded; on
/// timeout the caller falls back (substring search, NotFound) rather than
/// blocking.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 2_000;
