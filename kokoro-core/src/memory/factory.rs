//! Memory Factory — raw message text → classified, scored [`Memory`].
//!
//! Emotion score:
//!   sum(keyword weights) + 0.5·'!' + 1·emoji + 1 (>50 chars) + 1 (>100 chars)
//!
//! With nothing matched the score is treated as small talk and clamped to
//! [1, 3]; otherwise the accumulated score is divided by the number of
//! distinct keywords matched and clamped to [1, 10].
//!
//! Categorisation is strictly ordered; the first matching rule wins:
//! confession > first-time > support > milestone > growth > special (≥ 8) > emotion.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dictionary::{KeywordDictionary, contains_any};
use crate::error::{KokoroError, Result};
use crate::memory::{Memory, MemoryCategory};
use crate::types::{ContextMeta, MemoryId};

/// Builds [`Memory`] records from message text using an injected dictionary.
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    dictionary: Arc<KeywordDictionary>,
}

impl MemoryFactory {
    /// Create a factory over the given dictionary.
    #[must_use]
    pub fn new(dictionary: Arc<KeywordDictionary>) -> Self {
        Self { dictionary }
    }

    /// The dictionary this factory scores with.
    #[must_use]
    pub fn dictionary(&self) -> &KeywordDictionary {
        &self.dictionary
    }

    /// Create a memory stamped with the current time.
    ///
    /// # Errors
    /// See [`MemoryFactory::create_memory_at`].
    pub fn create_memory(
        &self,
        content: &str,
        original_message: &str,
        context_meta: ContextMeta,
        relationship_level: f64,
    ) -> Result<Memory> {
        self.create_memory_at(content, original_message, context_meta, relationship_level, Utc::now())
    }

    /// Create a memory for a message sent at `timestamp`.
    ///
    /// # Errors
    /// Returns `KokoroError::Validation` if `content` is blank or
    /// `relationship_level` lies outside [0, 100].
    pub fn create_memory_at(
        &self,
        content: &str,
        original_message: &str,
        context_meta: ContextMeta,
        relationship_level: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Memory> {
        if content.trim().is_empty() {
            return Err(KokoroError::Validation("memory content is empty".to_string()));
        }
        if !(0.0..=100.0).contains(&relationship_level) {
            return Err(KokoroError::Validation(format!(
                "relationship level {relationship_level} outside 0–100"
            )));
        }

        let emotion_score = self.calculate_emotion_score(content);
        let category = self.categorize_memory(content, emotion_score, context_meta.first_time);
        let keywords = self.extract_keywords(content);
        let is_highlight = Memory::qualifies_as_highlight(emotion_score, category);

        debug!(
            emotion_score,
            %category,
            keywords = keywords.len(),
            is_highlight,
            "memory created"
        );

        Ok(Memory {
            id: MemoryId::new(),
            content: content.to_string(),
            original_message: original_message.to_string(),
            timestamp,
            emotion_score,
            category,
            relationship_level_at_creation: relationship_level,
            reference_count: 0,
            keywords,
            context_meta,
            is_highlight,
        })
    }

    /// Score the emotional intensity of `content` on a 1–10 scale.
    #[must_use]
    pub fn calculate_emotion_score(&self, content: &str) -> u8 {
        let lowered = content.to_lowercase();
        let keywords = self.dictionary.matched_emotion_keywords(&lowered);
        let exclamations = content.chars().filter(|c| matches!(c, '!' | '！')).count();
        let emojis = self.dictionary.matched_emoji_count(content);

        let mut score: f64 = keywords.iter().map(|k| k.weight).sum();
        score += 0.5 * exclamations as f64;
        score += emojis as f64;

        let length = content.chars().count();
        if length > 50 {
            score += 1.0;
        }
        if length > 100 {
            score += 1.0;
        }

        let clamped = if keywords.is_empty() && exclamations == 0 && emojis == 0 {
            score.clamp(1.0, 3.0)
        } else {
            (score / keywords.len().max(1) as f64).clamp(1.0, 10.0)
        };
        // Clamped to [1, 10] above, so the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = clamped.round() as u8;
        rounded
    }

    /// Assign the first matching category in priority order.
    #[must_use]
    pub fn categorize_memory(&self, content: &str, emotion_score: u8, is_first_time: bool) -> MemoryCategory {
        let lowered = content.to_lowercase();
        let markers = &self.dictionary.categories;

        if contains_any(&lowered, &markers.confession) {
            MemoryCategory::Confession
        } else if is_first_time || contains_any(&lowered, &markers.first_time) {
            MemoryCategory::First
        } else if contains_any(&lowered, &markers.support) {
            MemoryCategory::Support
        } else if contains_any(&lowered, &markers.milestone) {
            MemoryCategory::Milestone
        } else if contains_any(&lowered, &markers.growth) {
            MemoryCategory::Growth
        } else if emotion_score >= 8 {
            MemoryCategory::Special
        } else {
            MemoryCategory::Emotion
        }
    }

    /// Dictionary keywords plus matched topic labels, deduplicated.
    #[must_use]
    pub fn extract_keywords(&self, content: &str) -> BTreeSet<String> {
        let lowered = content.to_lowercase();
        let mut keywords: BTreeSet<String> = self
            .dictionary
            .matched_emotion_keywords(&lowered)
            .into_iter()
            .map(|k| k.phrase.clone())
            .collect();
        keywords.extend(
            self.dictionary
                .matched_topics(&lowered)
                .into_iter()
                .map(str::to_string),
        );
        keywords
    }
}
