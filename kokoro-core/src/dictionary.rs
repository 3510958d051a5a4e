//! Keyword dictionary — the curated phrase tables behind every heuristic.
//!
//! The dictionary is injected into the Memory Factory, the Relationship Engine
//! and the Context Classifier rather than compiled into them, so a localised or
//! synthetic table changes behaviour without code changes. A bilingual default
//! ships in `data/dictionary.toml` and is available through
//! [`KeywordDictionary::builtin`].
//!
//! All phrases are lower-cased on load; callers match against lower-cased text.

use serde::{Deserialize, Serialize};

use crate::error::{KokoroError, Result};

const BUILTIN_DICTIONARY: &str = include_str!("../data/dictionary.toml");

/// A keyword and the emotional weight it contributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedKeyword {
    /// The phrase to look for.
    pub phrase: String,
    /// Emotional weight (1–10 scale).
    pub weight: f64,
}

/// A named topic and the phrases that signal it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPattern {
    /// Topic label, e.g. `"family"`.
    pub name: String,
    /// Phrases that indicate the topic.
    pub patterns: Vec<String>,
}

/// Marker phrases for memory categorisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMarkers {
    /// Declarations of love or affection.
    #[serde(default)]
    pub confession: Vec<String>,
    /// Explicit first-time experiences.
    #[serde(default)]
    pub first_time: Vec<String>,
    /// Distress, requests for support.
    #[serde(default)]
    pub support: Vec<String>,
    /// Achievements and anniversaries.
    #[serde(default)]
    pub milestone: Vec<String>,
    /// Insight and personal growth.
    #[serde(default)]
    pub growth: Vec<String>,
}

/// Marker phrases used when deriving relationship state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipMarkers {
    /// The user revealing something personal.
    #[serde(default)]
    pub self_disclosure: Vec<String>,
    /// The response acknowledging the user's feelings.
    #[serde(default)]
    pub empathy: Vec<String>,
    /// Topics that need careful handling.
    #[serde(default)]
    pub sensitive: Vec<String>,
    /// The response sharing in good news.
    #[serde(default)]
    pub positive_response: Vec<String>,
}

/// Marker phrases for the context classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMarkers {
    /// Demonstrative / anaphoric references to earlier turns.
    #[serde(default)]
    pub reference: Vec<String>,
    /// Requests to continue the current thread.
    #[serde(default)]
    pub follow_up: Vec<String>,
}

/// The full, read-only keyword configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordDictionary {
    /// Emotion keyword → weight table.
    #[serde(default)]
    pub emotion_keywords: Vec<WeightedKeyword>,
    /// Emojis that each add one point of affect.
    #[serde(default)]
    pub affect_emojis: Vec<String>,
    /// Topical patterns.
    #[serde(default)]
    pub topics: Vec<TopicPattern>,
    /// Category markers.
    #[serde(default)]
    pub categories: CategoryMarkers,
    /// Relationship markers.
    #[serde(default)]
    pub relationship: RelationshipMarkers,
    /// Context markers.
    #[serde(default)]
    pub context: ContextMarkers,
}

impl KeywordDictionary {
    /// The bundled bilingual dictionary.
    ///
    /// # Errors
    /// Returns `KokoroError::Config` if the bundled table fails validation.
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_DICTIONARY)
    }

    /// Parse and validate a dictionary from TOML.
    ///
    /// # Errors
    /// Returns `KokoroError::Config` on malformed TOML, empty phrases, or
    /// non-positive / non-finite weights.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let dictionary: Self =
            toml::from_str(toml_str).map_err(|e| KokoroError::Config(e.to_string()))?;
        dictionary.normalized()
    }

    /// Load a dictionary from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the table is invalid.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn normalized(mut self) -> Result<Self> {
        for keyword in &mut self.emotion_keywords {
            if !keyword.weight.is_finite() || keyword.weight <= 0.0 {
                return Err(KokoroError::Config(format!(
                    "keyword '{}' has invalid weight {}",
                    keyword.phrase, keyword.weight
                )));
            }
            keyword.phrase = normalize_phrase(&keyword.phrase)?;
        }
        for topic in &mut self.topics {
            lower_all(&mut topic.patterns)?;
        }
        for list in [
            &mut self.categories.confession,
            &mut self.categories.first_time,
            &mut self.categories.support,
            &mut self.categories.milestone,
            &mut self.categories.growth,
            &mut self.relationship.self_disclosure,
            &mut self.relationship.empathy,
            &mut self.relationship.sensitive,
            &mut self.relationship.positive_response,
            &mut self.context.reference,
            &mut self.context.follow_up,
        ] {
            lower_all(list)?;
        }
        Ok(self)
    }

    /// Emotion keywords contained in `lowered` (already lower-cased).
    #[must_use]
    pub fn matched_emotion_keywords(&self, lowered: &str) -> Vec<&WeightedKeyword> {
        self.emotion_keywords
            .iter()
            .filter(|k| lowered.contains(k.phrase.as_str()))
            .collect()
    }

    /// Number of distinct affect emojis present in `text`.
    #[must_use]
    pub fn matched_emoji_count(&self, text: &str) -> usize {
        self.affect_emojis
            .iter()
            .filter(|e| text.contains(e.as_str()))
            .count()
    }

    /// Names of topics with at least one pattern in `lowered`.
    #[must_use]
    pub fn matched_topics(&self, lowered: &str) -> Vec<&str> {
        self.topics
            .iter()
            .filter(|t| contains_any(lowered, &t.patterns))
            .map(|t| t.name.as_str())
            .collect()
    }
}

fn normalize_phrase(phrase: &str) -> Result<String> {
    let trimmed = phrase.trim();
    if trimmed.is_empty() {
        return Err(KokoroError::Config("empty phrase in dictionary".to_string()));
    }
    Ok(trimmed.to_lowercase())
}

fn lower_all(list: &mut [String]) -> Result<()> {
    for phrase in list.iter_mut() {
        *phrase = normalize_phrase(phrase)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Matching helpers
// ---------------------------------------------------------------------------

/// Whether any phrase occurs in `lowered` as a plain substring.
#[must_use]
pub fn contains_any(lowered: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| lowered.contains(p.as_str()))
}

/// First phrase found in `lowered`.
///
/// ASCII phrases must be delimited by non-alphanumeric characters (or the
/// string boundary); other phrases match as plain substrings, since
/// Japanese text has no word separators.
#[must_use]
pub fn find_marker<'a>(lowered: &str, phrases: &'a [String]) -> Option<&'a str> {
    phrases
        .iter()
        .find(|p| {
            if p.is_ascii() {
                contains_word(lowered, p)
            } else {
                lowered.contains(p.as_str())
            }
        })
        .map(String::as_str)
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
