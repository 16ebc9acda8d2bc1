//! Structured error types for the memory-relevance core
//!
//! Errors are categorized so callers can distinguish recoverable lookup
//! misses from degraded-capability conditions. The core absorbs provider
//! failures into fallback behavior; only `NotFound` and `InvalidWeights`
//! surface as explicit results on caller-facing paths.

use std::fmt;

/// Error types for working-set and scoring operations
#[derive(Debug)]
pub enum MemoryError {
    /// Lookup miss - recoverable, caller decides fallback
    NotFound(String),

    /// Weight adjustment violated the sum-to-one invariant or named only
    /// unknown factors. Recovered by renormalization where possible.
    InvalidWeights { reason: String },

    /// External provider call exceeded its deadline
    ProviderTimeout { provider: String, timeout_ms: u64 },

    /// External provider errored; treated as if the capability were absent
    ProviderFailure { provider: String, details: String },

    /// Malformed persisted record; skipped and logged on load
    Serialization(String),

    /// Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl MemoryError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidWeights { .. } => "INVALID_WEIGHTS",
            Self::ProviderTimeout { .. } => "PROVIDER_TIMEOUT",
            Self::ProviderFailure { .. } => "PROVIDER_FAILURE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(id) => format!("Memory item not found: {id}"),
            Self::InvalidWeights { reason } => format!("Invalid factor weights: {reason}"),
            Self::ProviderTimeout {
                provider,
                timeout_ms,
            } => format!("Provider '{provider}' exceeded {timeout_ms}ms deadline"),
            Self::ProviderFailure { provider, details } => {
                format!("Provider '{provider}' failed: {details}")
            }
            Self::Serialization(msg) => format!("Serialization error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Whether the caller can continue on a degraded path after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for MemoryError {}

impl From<anyhow::Error> for MemoryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Type alias for Results using MemoryError
pub type Result<T> = std::result::Result<T, MemoryError>;
