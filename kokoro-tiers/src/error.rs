//! Tier error types.

use thiserror::Error;

use kokoro_core::KokoroError;

use crate::tier::TierKind;

/// Errors raised by storage tiers and their collaborators.
#[derive(Debug, Error)]
pub enum TierError {
    /// SQLite failure in the durable tier.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request to the embedding service failed.
    #[error("Embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A tier branch exceeded its time budget.
    #[error("{tier} tier timed out after {ms}ms")]
    Timeout {
        /// Tier that timed out.
        tier: TierKind,
        /// Budget that was exceeded.
        ms: u64,
    },

    /// Every retry of an embedding call failed.
    #[error("All embedding attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// The tier is not configured or not reachable.
    #[error("Tier unavailable: {0}")]
    Unavailable(String),

    /// The embedding service answered with something unusable.
    #[error("Invalid embedding response: {0}")]
    Embedding(String),

    /// A stored row failed verification.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A blocking or background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for TierError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

impl TierError {
    /// Map into the engine-wide failure taxonomy.
    ///
    /// Any durable-tier failure is a data-integrity failure. Embedding
    /// failures in the semantic tier are computation failures. Everything else
    /// means the tier could not be reached.
    #[must_use]
    pub fn classify(self, tier: TierKind) -> KokoroError {
        match (tier, self) {
            (TierKind::Durable, err) => KokoroError::DataIntegrity(err.to_string()),
            (
                TierKind::Semantic,
                err @ (Self::Embedding(_) | Self::RetriesExhausted { .. } | Self::Request(_)),
            ) => KokoroError::Computation(err.to_string()),
            (tier, err) => KokoroError::Connectivity {
                tier: tier.to_string(),
                reason: err.to_string(),
            },
        }
    }
}
