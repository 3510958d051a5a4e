//! Relationship Engine — derived, never stored, relationship state.
//!
//! A [`RelationshipState`] is recomputed from the most recent interactions
//! every time it is requested. Five dimensions accumulate from fixed starting
//! values through per-turn contributions, then each is clamped to [0, 100]:
//!
//! | dimension            | start | per turn                                                  |
//! |----------------------|-------|-----------------------------------------------------------|
//! | intimacy             | 5     | +0.5 (>50 chars) +1 (>150 chars), +2 self-disclosure, +1.5·intensity (>0.6) |
//! | trust                | 10    | +0.5, +1.5 sensitive topic met with empathy, +(satisfaction−3), +consistency |
//! | understanding        | 5     | +0.3, +1.5·relevance                                      |
//! | shared experiences   | 0     | +0.5, +1 for turns ≥ 300 s                                |
//! | emotional connection | 8     | +2·intensity (positive), +1·intensity (negative + empathy), +emotion accuracy |
//!
//! Across the window, every distinct recognised topic adds +2 understanding
//! and +1.5 shared experiences.
//!
//! ```text
//! overall = 0.25·(intimacy + trust + understanding) + 0.125·(shared + emotional)
//! ```

pub mod assessment;
pub mod milestone;
pub mod suggestions;

pub use assessment::{AssessmentScorer, HeuristicAssessor};
pub use milestone::{Milestone, check_milestones};
pub use suggestions::{Priority, Suggestion, suggest_next_steps};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RelationshipConfig;
use crate::dictionary::{KeywordDictionary, contains_any};
use crate::error::{KokoroError, Result};
use crate::types::{EmotionReading, RelationshipType, Valence};

/// One conversational turn used as relationship input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// When the turn happened.
    pub timestamp: DateTime<Utc>,
    /// What the user wrote.
    pub user_message: String,
    /// What the companion answered.
    pub response: String,
    /// Emotion detected for the turn.
    pub emotion: EmotionReading,
    /// How long the turn took, in seconds.
    pub duration_secs: u32,
    /// Optional user rating, 1–5.
    pub satisfaction: Option<u8>,
    /// Relationship type the turn was conducted under.
    pub relationship_type: RelationshipType,
}

impl Interaction {
    /// Reject malformed interactions before they reach scoring.
    ///
    /// # Errors
    /// Returns `KokoroError::Validation` for a blank user message, an
    /// intensity outside [0, 1], or a satisfaction outside 1–5.
    pub fn validate(&self) -> Result<()> {
        if self.user_message.trim().is_empty() {
            return Err(KokoroError::Validation("interaction has empty user message".to_string()));
        }
        let intensity = self.emotion.intensity;
        if !intensity.is_finite() || !(0.0..=1.0).contains(&intensity) {
            return Err(KokoroError::Validation(format!(
                "emotion intensity {intensity} outside 0–1"
            )));
        }
        if let Some(rating) = self.satisfaction
            && !(1..=5).contains(&rating)
        {
            return Err(KokoroError::Validation(format!("satisfaction {rating} outside 1–5")));
        }
        Ok(())
    }
}

/// The five relationship dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Closeness and openness.
    Intimacy,
    /// Reliability and safety.
    Trust,
    /// How well the companion knows the user.
    Understanding,
    /// Breadth of things done and discussed together.
    SharedExperiences,
    /// Emotional resonance.
    EmotionalConnection,
}

impl Dimension {
    /// Every dimension, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Intimacy,
        Self::Trust,
        Self::Understanding,
        Self::SharedExperiences,
        Self::EmotionalConnection,
    ];
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Intimacy => "intimacy",
            Self::Trust => "trust",
            Self::Understanding => "understanding",
            Self::SharedExperiences => "shared_experiences",
            Self::EmotionalConnection => "emotional_connection",
        };
        f.write_str(name)
    }
}

/// Five clamped dimensions and their fixed weighted sum.
///
/// Only constructible through [`RelationshipState::new`], so `overall_level`
/// always equals the weighted sum of the dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelationshipState {
    intimacy: f64,
    trust: f64,
    understanding: f64,
    shared_experiences: f64,
    emotional_connection: f64,
    overall_level: f64,
}

impl RelationshipState {
    /// Build a state, clamping every dimension to [0, 100].
    ///
    /// Non-finite inputs count as zero.
    #[must_use]
    pub fn new(
        intimacy: f64,
        trust: f64,
        understanding: f64,
        shared_experiences: f64,
        emotional_connection: f64,
    ) -> Self {
        let intimacy = clamp_dimension(intimacy);
        let trust = clamp_dimension(trust);
        let understanding = clamp_dimension(understanding);
        let shared_experiences = clamp_dimension(shared_experiences);
        let emotional_connection = clamp_dimension(emotional_connection);
        let overall_level = clamp_dimension(
            0.25 * (intimacy + trust + understanding) + 0.125 * (shared_experiences + emotional_connection),
        );
        Self {
            intimacy,
            trust,
            understanding,
            shared_experiences,
            emotional_connection,
            overall_level,
        }
    }

    /// The state before any interaction.
    #[must_use]
    pub fn initial() -> Self {
        Self::new(5.0, 10.0, 5.0, 0.0, 8.0)
    }

    /// Intimacy, 0–100.
    #[must_use]
    pub fn intimacy(&self) -> f64 {
        self.intimacy
    }

    /// Trust, 0–100.
    #[must_use]
    pub fn trust(&self) -> f64 {
        self.trust
    }

    /// Understanding, 0–100.
    #[must_use]
    pub fn understanding(&self) -> f64 {
        self.understanding
    }

    /// Shared experiences, 0–100.
    #[must_use]
    pub fn shared_experiences(&self) -> f64 {
        self.shared_experiences
    }

    /// Emotional connection, 0–100.
    #[must_use]
    pub fn emotional_connection(&self) -> f64 {
        self.emotional_connection
    }

    /// Weighted overall level, 0–100.
    #[must_use]
    pub fn overall_level(&self) -> f64 {
        self.overall_level
    }

    /// Value of a single dimension.
    #[must_use]
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Intimacy => self.intimacy,
            Dimension::Trust => self.trust,
            Dimension::Understanding => self.understanding,
            Dimension::SharedExperiences => self.shared_experiences,
            Dimension::EmotionalConnection => self.emotional_connection,
        }
    }
}

impl Default for RelationshipState {
    fn default() -> Self {
        Self::initial()
    }
}

fn clamp_dimension(value: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 100.0) } else { 0.0 }
}

/// Per-type multipliers applied by [`optimize_for_relationship_type`], in
/// [`Dimension::ALL`] order.
#[must_use]
pub fn type_multipliers(kind: RelationshipType) -> [f64; 5] {
    match kind {
        RelationshipType::Romantic => [1.3, 1.1, 1.0, 1.0, 1.3],
        RelationshipType::Friend => [1.0, 1.1, 1.2, 1.3, 1.0],
        RelationshipType::Counselor => [0.8, 1.3, 1.3, 1.0, 1.0],
        RelationshipType::Mentor => [1.0, 1.2, 1.3, 1.1, 0.9],
        RelationshipType::Companion => [1.1, 1.0, 1.0, 1.2, 1.2],
    }
}

/// Scale each dimension by the relationship type's multiplier and re-clamp.
#[must_use]
pub fn optimize_for_relationship_type(state: &RelationshipState, kind: RelationshipType) -> RelationshipState {
    let m = type_multipliers(kind);
    RelationshipState::new(
        state.intimacy * m[0],
        state.trust * m[1],
        state.understanding * m[2],
        state.shared_experiences * m[3],
        state.emotional_connection * m[4],
    )
}

/// Derives relationship state from interaction history.
#[derive(Clone)]
pub struct RelationshipEngine {
    dictionary: Arc<KeywordDictionary>,
    assessor: Arc<dyn AssessmentScorer>,
    config: RelationshipConfig,
}

impl fmt::Debug for RelationshipEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RelationshipEngine {
    /// Engine using the [`HeuristicAssessor`] built from the same dictionary.
    #[must_use]
    pub fn new(dictionary: Arc<KeywordDictionary>, config: RelationshipConfig) -> Self {
        let assessor = Arc::new(HeuristicAssessor::new(&dictionary));
        Self {
            dictionary,
            assessor,
            config,
        }
    }

    /// Swap in a different assessment scorer.
    #[must_use]
    pub fn with_assessor(mut self, assessor: Arc<dyn AssessmentScorer>) -> Self {
        self.assessor = assessor;
        self
    }

    /// Derive the relationship state from the most recent interactions.
    ///
    /// The window is chosen by timestamp, so the order of `interactions` does
    /// not matter. An empty history yields [`RelationshipState::initial`].
    ///
    /// # Errors
    /// Returns `KokoroError::Validation` if any interaction is malformed.
    pub fn track_progress(&self, interactions: &[Interaction]) -> Result<RelationshipState> {
        for interaction in interactions {
            interaction.validate()?;
        }
        let window = recent_window(interactions, self.config.window);
        let markers = &self.dictionary.relationship;

        let mut intimacy = 5.0;
        let mut trust = 10.0;
        let mut understanding = 5.0;
        let mut shared = 0.0;
        let mut emotional = 8.0;
        let mut topics: BTreeSet<&str> = BTreeSet::new();

        let mut previous: Option<&Interaction> = None;
        for interaction in &window {
            let user = interaction.user_message.to_lowercase();
            let response = interaction.response.to_lowercase();
            let intensity = f64::from(interaction.emotion.intensity);
            let empathetic = contains_any(&response, &markers.empathy);

            let length = user.chars().count();
            if length > 50 {
                intimacy += 0.5;
            }
            if length > 150 {
                intimacy += 1.0;
            }
            if contains_any(&user, &markers.self_disclosure) {
                intimacy += 2.0;
            }
            if intensity > 0.6 {
                intimacy += 1.5 * intensity;
            }

            trust += 0.5;
            if empathetic && contains_any(&user, &markers.sensitive) {
                trust += 1.5;
            }
            if let Some(rating) = interaction.satisfaction {
                trust += f64::from(rating) - 3.0;
            }
            trust += self.assessor.response_consistency(interaction, previous);

            understanding += 0.3 + 1.5 * self.assessor.contextual_relevance(interaction);

            shared += 0.5;
            if interaction.duration_secs >= 300 {
                shared += 1.0;
            }

            match interaction.emotion.valence() {
                Valence::Positive => emotional += 2.0 * intensity,
                Valence::Negative if empathetic => emotional += intensity,
                _ => {}
            }
            emotional += self.assessor.emotion_accuracy(interaction);

            topics.extend(self.dictionary.matched_topics(&user));
            previous = Some(interaction);
        }

        let topic_variety = topics.len() as f64;
        understanding += 2.0 * topic_variety;
        shared += 1.5 * topic_variety;

        let state = RelationshipState::new(intimacy, trust, understanding, shared, emotional);
        debug!(
            window = window.len(),
            topics = topics.len(),
            overall = state.overall_level(),
            "relationship state derived"
        );
        Ok(state)
    }
}

/// The `size` most recent interactions, oldest first.
///
/// Ties on timestamp are broken by content so that the selection and the
/// iteration order never depend on the caller's ordering.
fn recent_window(interactions: &[Interaction], size: usize) -> Vec<&Interaction> {
    let mut sorted: Vec<&Interaction> = interactions.iter().collect();
    sorted.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.user_message.cmp(&b.user_message))
            .then_with(|| a.response.cmp(&b.response))
    });
    let skip = sorted.len().saturating_sub(size);
    sorted.split_off(skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Emotion;
    use chrono::Duration;

    fn engine() -> RelationshipEngine {
        RelationshipEngine::new(
            Arc::new(KeywordDictionary::builtin().expect("builtin")),
            RelationshipConfig::default(),
        )
    }

    fn turn(user: &str, response: &str, minutes: i64) -> Interaction {
        Interaction {
            timestamp: DateTime::<Utc>::UNIX_EPOCH + Duration::minutes(minutes),
            user_message: user.into(),
            response: response.into(),
            emotion: EmotionReading::new(Emotion::Neutral, 0.2),
            duration_secs: 60,
            satisfaction: None,
            relationship_type: RelationshipType::Friend,
        }
    }

    #[test]
    fn empty_history_is_initial_state() {
        let state = engine().track_progress(&[]).expect("state");
        assert_eq!(state, RelationshipState::initial());
        assert!((state.intimacy() - 5.0).abs() < 1e-12);
        assert!((state.trust() - 10.0).abs() < 1e-12);
        assert!((state.understanding() - 5.0).abs() < 1e-12);
        assert!(state.shared_experiences().abs() < 1e-12);
        assert!((state.emotional_connection() - 8.0).abs() < 1e-12);
        assert!((state.overall_level() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn single_neutral_turn() {
        // No markers, no topics, no bigram overlap.
        let state = engine().track_progress(&[turn("こんにちは", "やあ", 0)]).expect("state");
        assert!((state.intimacy() - 5.0).abs() < 1e-12);
        assert!((state.trust() - 11.5).abs() < 1e-12); // 10 + 0.5 + consistency 1.0
        assert!((state.understanding() - 5.3).abs() < 1e-12);
        assert!((state.shared_experiences() - 0.5).abs() < 1e-12);
        assert!((state.emotional_connection() - 8.5).abs() < 1e-12); // neutral accuracy 0.5
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let e = engine();
        let mut history = vec![
            turn("実は仕事で悩んでる", "大丈夫、わかるよ", 0),
            turn("家族と映画を見た", "楽しそう！", 5),
            turn("ありがとう", "どういたしまして", 10),
        ];
        let forward = e.track_progress(&history).expect("state");
        history.reverse();
        let backward = e.track_progress(&history).expect("state");
        assert_eq!(forward, backward);
    }

    #[test]
    fn window_keeps_most_recent() {
        let e = RelationshipEngine::new(
            Arc::new(KeywordDictionary::builtin().expect("builtin")),
            RelationshipConfig { window: 2 },
        );
        let history = vec![
            turn("家族の話", "うん", 0),
            turn("こんにちは", "やあ", 5),
            turn("こんばんは", "やあ", 10),
        ];
        let state = e.track_progress(&history).expect("state");
        // The family turn fell out of the window, so no topic bonus.
        assert!(state.shared_experiences() < 1.5);
    }

    #[test]
    fn malformed_interaction_rejected() {
        let mut bad = turn("hi", "hello", 0);
        bad.satisfaction = Some(9);
        assert!(matches!(engine().track_progress(&[bad]), Err(KokoroError::Validation(_))));
        assert!(engine().track_progress(&[turn("  ", "hello", 0)]).is_err());
    }

    #[test]
    fn dimensions_clamp_at_hundred() {
        let history: Vec<Interaction> = (0..50)
            .map(|i| {
                let mut t = turn("実は誰にも言ってない秘密があるんだ、家族と仕事と学校のこと", "わかるよ、大丈夫", i);
                t.emotion = EmotionReading::new(Emotion::Love, 1.0);
                t.satisfaction = Some(5);
                t.duration_secs = 600;
                t
            })
            .collect();
        let state = engine().track_progress(&history).expect("state");
        for dimension in Dimension::ALL {
            assert!(state.get(dimension) <= 100.0);
        }
        assert!((state.trust() - 100.0).abs() < 1e-12);
        assert!(state.overall_level() <= 100.0);
    }

    #[test]
    fn optimization_boosts_and_clamps() {
        let state = RelationshipState::new(80.0, 50.0, 50.0, 50.0, 90.0);
        let romantic = optimize_for_relationship_type(&state, RelationshipType::Romantic);
        assert!((romantic.intimacy() - 100.0).abs() < 1e-9);
        assert!((romantic.emotional_connection() - 100.0).abs() < 1e-9);
        assert!((romantic.trust() - 55.0).abs() < 1e-9);

        let counselor = optimize_for_relationship_type(&state, RelationshipType::Counselor);
        assert!((counselor.intimacy() - 64.0).abs() < 1e-9);
        assert!((counselor.trust() - 65.0).abs() < 1e-9);
    }
}
