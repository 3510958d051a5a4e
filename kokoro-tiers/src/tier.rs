//! The storage-tier abstraction.
//!
//! Every backing store implements [`Tier`]; the orchestrator selects tiers by
//! [`TierKind`] and treats their failures according to [`WritePolicy`], so a
//! fourth tier only needs a new kind and an implementation.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kokoro_core::{SessionId, UserId};

use crate::error::TierError;
use crate::message::ChatMessage;

/// Which backing store a tier is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    /// Low-latency recent turns.
    Cache,
    /// Authoritative append-only store.
    Durable,
    /// Embedding similarity index.
    Semantic,
}

impl TierKind {
    /// Every kind, fastest first.
    pub const ALL: [Self; 3] = [Self::Cache, Self::Durable, Self::Semantic];

    /// How the orchestrator treats writes to this tier.
    #[must_use]
    pub fn write_policy(self) -> WritePolicy {
        match self {
            Self::Cache => WritePolicy::BestEffort,
            Self::Durable => WritePolicy::Required,
            Self::Semantic => WritePolicy::Background,
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Durable => "durable",
            Self::Semantic => "semantic",
        })
    }
}

/// Write handling for a tier during `save_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Written on the request path; failure fails the save.
    Required,
    /// Written on the request path; failure is logged and ignored.
    BestEffort,
    /// Written by a detached task after the save returns.
    Background,
}

/// A read against one tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierQuery {
    /// Owner of the messages searched.
    pub user_id: UserId,
    /// Restrict to one session, where the tier supports it.
    pub session_id: Option<SessionId>,
    /// Search text.
    pub text: String,
    /// Result cap.
    pub max_results: usize,
    /// Minimum cosine similarity for semantic matches.
    pub similarity_threshold: f32,
}

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierHit {
    /// The matched message.
    pub message: ChatMessage,
    /// Similarity score, for tiers that rank by one.
    pub score: Option<f32>,
}

impl TierHit {
    /// A hit with no score.
    #[must_use]
    pub fn unscored(message: ChatMessage) -> Self {
        Self { message, score: None }
    }
}

/// Health snapshot of a single tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierHealth {
    /// Which tier.
    pub kind: TierKind,
    /// Whether the tier answered.
    pub reachable: bool,
    /// Number of stored entries, if known.
    pub entries: Option<usize>,
    /// Error or backend description.
    pub detail: Option<String>,
    /// Time taken by the probe.
    pub latency_ms: u64,
}

impl TierHealth {
    /// A reachable tier holding `entries` items.
    #[must_use]
    pub fn up(kind: TierKind, entries: usize) -> Self {
        Self {
            kind,
            reachable: true,
            entries: Some(entries),
            detail: None,
            latency_ms: 0,
        }
    }

    /// An unreachable tier.
    #[must_use]
    pub fn down(kind: TierKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            reachable: false,
            entries: None,
            detail: Some(detail.into()),
            latency_ms: 0,
        }
    }
}

/// One backing store consulted by the orchestrator.
#[async_trait]
pub trait Tier: Send + Sync {
    /// Which store this is.
    fn kind(&self) -> TierKind;

    /// Store a message.
    async fn write(&self, message: &ChatMessage) -> Result<(), TierError>;

    /// Messages relevant to `query`.
    async fn search(&self, query: &TierQuery) -> Result<Vec<TierHit>, TierError>;

    /// Every message this tier holds for `user_id`, oldest first.
    async fn messages(&self, user_id: UserId) -> Result<Vec<ChatMessage>, TierError>;

    /// Probe the tier. Never fails; problems are reported in the snapshot.
    async fn health(&self) -> TierHealth;

    /// Remove everything held for `user_id`, returning how many entries went.
    async fn cleanup(&self, user_id: UserId) -> Result<usize, TierError>;
}
