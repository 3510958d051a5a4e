//! Per-turn assessment sub-scores feeding the relationship dimensions.
//!
//! Each sub-score lies in [0, 1] and is deterministic, so the same interaction
//! window always yields the same [`super::RelationshipState`]. Callers with a
//! better signal (a model-based judge, human ratings) plug in their own
//! [`AssessmentScorer`].

use std::collections::HashSet;

use crate::dictionary::{KeywordDictionary, contains_any};
use crate::relationship::Interaction;
use crate::types::Valence;

/// Scores the quality of individual conversation turns.
pub trait AssessmentScorer: Send + Sync {
    /// How consistent this turn is with the previous one.
    fn response_consistency(&self, current: &Interaction, previous: Option<&Interaction>) -> f64;

    /// How well the response matches the emotion the user expressed.
    fn emotion_accuracy(&self, interaction: &Interaction) -> f64;

    /// How relevant the response is to the user's message.
    fn contextual_relevance(&self, interaction: &Interaction) -> f64;
}

/// Marker- and overlap-based scorer.
///
/// - consistency: 1.0 when the turn keeps the previous turn's relationship
///   type (and for the first turn), 0.5 otherwise
/// - emotion accuracy: 1.0 when a negative reading meets empathy markers or a
///   positive reading meets positive-response markers, 0.5 for a neutral
///   reading, 0.0 otherwise
/// - relevance: Jaccard similarity of the character bigrams of user text and
///   response
#[derive(Debug, Clone)]
pub struct HeuristicAssessor {
    empathy: Vec<String>,
    positive_response: Vec<String>,
}

impl HeuristicAssessor {
    /// Build an assessor from the dictionary's relationship markers.
    #[must_use]
    pub fn new(dictionary: &KeywordDictionary) -> Self {
        Self {
            empathy: dictionary.relationship.empathy.clone(),
            positive_response: dictionary.relationship.positive_response.clone(),
        }
    }
}

impl AssessmentScorer for HeuristicAssessor {
    fn response_consistency(&self, current: &Interaction, previous: Option<&Interaction>) -> f64 {
        match previous {
            Some(prev) if prev.relationship_type != current.relationship_type => 0.5,
            _ => 1.0,
        }
    }

    fn emotion_accuracy(&self, interaction: &Interaction) -> f64 {
        let response = interaction.response.to_lowercase();
        match interaction.emotion.valence() {
            Valence::Neutral => 0.5,
            Valence::Negative if contains_any(&response, &self.empathy) => 1.0,
            Valence::Positive if contains_any(&response, &self.positive_response) => 1.0,
            _ => 0.0,
        }
    }

    fn contextual_relevance(&self, interaction: &Interaction) -> f64 {
        bigram_jaccard(&interaction.user_message, &interaction.response)
    }
}

/// Jaccard similarity of the lower-cased, whitespace-free character bigrams.
#[must_use]
pub fn bigram_jaccard(a: &str, b: &str) -> f64 {
    let left = bigrams(a);
    let right = bigrams(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

fn bigrams(text: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}
