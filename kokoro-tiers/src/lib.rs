//! # Kokoro Tiers
//!
//! Storage tiers and the orchestrator that fans requests across them.
//!
//! | Tier | Backing | Write policy | Search |
//! |------|---------|--------------|--------|
//! | [`CacheTier`] | in-process LRU | best effort | latest turns |
//! | [`DurableTier`] | SQLite, append-only | required | substring, newest first |
//! | [`SemanticTier`] | embedding index | background | cosine similarity |
//!
//! [`MemoryOrchestrator`] is the entry point; the tiers are usable directly
//! through the [`Tier`] trait.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod durable;
pub mod embedding;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod semantic;
pub mod telemetry;
pub mod tier;

pub use cache::CacheTier;
pub use durable::DurableTier;
pub use embedding::{EmbeddingProvider, HashingEmbedder, HttpEmbeddingClient, build_provider};
pub use error::TierError;
pub use message::{ChatMessage, MessagePayload, MessageRole};
pub use orchestrator::{CleanupReport, MemoryOrchestrator, SearchOptions, SearchResponse, SystemStatus};
pub use semantic::SemanticTier;
pub use telemetry::init_tracing;
pub use tier::{Tier, TierHealth, TierHit, TierKind, TierQuery, WritePolicy};
