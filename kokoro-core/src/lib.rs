//! # Kokoro Core Library
//!
//! Scoring and classification engine behind the companion chat. Everything in
//! this crate is pure and synchronous; storage tiers live in `kokoro-tiers`.
//!
//! - **Memory Factory** — message text → classified, scored [`Memory`]
//! - **Weight Engine** — lazily re-derived importance with time decay
//! - **Relationship Engine** — five-dimension [`RelationshipState`] derived
//!   from a rolling [`Interaction`] window, milestones and suggestions
//! - **Context Classifier** — reference / follow-up / general labelling
//!
//! Keyword tables are data, not code: see [`KeywordDictionary`].

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod dictionary;
pub mod error;
pub mod memory;
pub mod relationship;
pub mod types;
pub mod weight;

pub use config::KokoroConfig;
pub use context::{ContextAnalysis, ContextType, analyze_context};
pub use dictionary::KeywordDictionary;
pub use error::{KokoroError, Result};
pub use memory::{Memory, MemoryCategory, MemoryFactory};
pub use relationship::{Interaction, RelationshipEngine, RelationshipState};
pub use types::*;
pub use weight::WeightEngine;
