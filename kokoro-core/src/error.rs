//! Error types for the Kokoro core library.

use thiserror::Error;

/// Top-level error type for all Kokoro operations.
///
/// The first four variants form the failure taxonomy the orchestrator acts
/// on: connectivity and computation failures degrade a single tier, validation
/// failures reject input before scoring, and data-integrity failures are always
/// surfaced to the caller.
#[derive(Error, Debug)]
pub enum KokoroError {
    /// Malformed input rejected before any scoring took place.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A storage tier could not be reached.
    #[error("Tier unreachable: {tier} ({reason})")]
    Connectivity {
        /// Which tier failed.
        tier: String,
        /// Underlying cause.
        reason: String,
    },

    /// An embedding or similarity computation failed.
    #[error("Computation failed: {0}")]
    Computation(String),

    /// The authoritative store rejected a write. Never swallowed.
    #[error("Durable write failed: {0}")]
    DataIntegrity(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KokoroError {
    /// Whether this failure must reach the caller rather than degrade a tier.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DataIntegrity(_) | Self::Validation(_))
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, KokoroError>;
