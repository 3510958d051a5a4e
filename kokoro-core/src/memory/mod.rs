//! Memory records and the factory that creates them.
//!
//! A [`Memory`] is created once, at message-ingestion time, by the
//! [`MemoryFactory`]. After that the only change it ever sees is a
//! `reference_count` increment when retrieval surfaces it. Its importance
//! weight is never stored; see [`crate::weight`].

pub mod factory;

pub use factory::MemoryFactory;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContextMeta, MemoryId};

/// What kind of significance a memory carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// A first-time experience.
    First,
    /// Emotionally intense but otherwise unclassified.
    Special,
    /// Insight or personal growth.
    Growth,
    /// Ordinary emotional content.
    Emotion,
    /// Achievement, anniversary, turning point.
    Milestone,
    /// Declaration of love or affection.
    Confession,
    /// Distress answered with support.
    Support,
}

impl MemoryCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::First,
        Self::Special,
        Self::Growth,
        Self::Emotion,
        Self::Milestone,
        Self::Confession,
        Self::Support,
    ];

    /// Weight bonus added on top of the emotion score.
    #[must_use]
    pub fn bonus(self) -> f64 {
        match self {
            Self::Confession => 3.0,
            Self::First | Self::Support | Self::Special => 2.0,
            Self::Milestone => 1.5,
            Self::Growth => 1.0,
            Self::Emotion => 0.0,
        }
    }

    /// Categories whose memories resist decay.
    #[must_use]
    pub fn is_enduring(self) -> bool {
        matches!(self, Self::Confession | Self::Milestone | Self::First)
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::First => "first",
            Self::Special => "special",
            Self::Growth => "growth",
            Self::Emotion => "emotion",
            Self::Milestone => "milestone",
            Self::Confession => "confession",
            Self::Support => "support",
        };
        f.write_str(name)
    }
}

/// A scored unit of conversational significance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier.
    pub id: MemoryId,
    /// Derived or summarized text.
    pub content: String,
    /// The verbatim message the memory came from.
    pub original_message: String,
    /// When the originating message was sent.
    pub timestamp: DateTime<Utc>,
    /// Emotional intensity, 1–10.
    pub emotion_score: u8,
    /// Significance category.
    pub category: MemoryCategory,
    /// Relationship level (0–100) when the memory formed.
    pub relationship_level_at_creation: f64,
    /// Times retrieval has surfaced this memory.
    pub reference_count: u32,
    /// Dictionary keywords and topic labels found in the content.
    pub keywords: BTreeSet<String>,
    /// Conversational context at creation.
    pub context_meta: ContextMeta,
    /// Fixed at creation: emotion score ≥ 8, or a confession / milestone.
    pub is_highlight: bool,
}

impl Memory {
    /// Whether a memory with these attributes counts as a highlight.
    #[must_use]
    pub fn qualifies_as_highlight(emotion_score: u8, category: MemoryCategory) -> bool {
        emotion_score >= 8 || matches!(category, MemoryCategory::Confession | MemoryCategory::Milestone)
    }

    /// Record that retrieval surfaced this memory.
    pub fn record_reference(&mut self) {
        self.reference_count = self.reference_count.saturating_add(1);
    }
}
