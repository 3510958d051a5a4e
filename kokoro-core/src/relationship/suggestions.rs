//! Next-step suggestions keyed by relationship stage and weak dimensions.

use std::collections::HashSet;

use serde::Serialize;

use crate::relationship::{Dimension, Interaction, RelationshipState};
use crate::types::RelationshipType;

/// Ordering of suggestions; `High` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nice to have.
    Low,
    /// Worth doing soon.
    Medium,
    /// Address first.
    High,
}

/// Stage of the relationship, by intimacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Intimacy below 30.
    Early,
    /// Intimacy 30–60.
    Mid,
    /// Intimacy above 60.
    Advanced,
}

impl Stage {
    /// Stage for a given state.
    #[must_use]
    pub fn of(state: &RelationshipState) -> Self {
        let intimacy = state.intimacy();
        if intimacy < 30.0 {
            Self::Early
        } else if intimacy <= 60.0 {
            Self::Mid
        } else {
            Self::Advanced
        }
    }

    /// Dimensions below this floor count as weak spots.
    #[must_use]
    pub fn weak_spot_floor(self) -> f64 {
        match self {
            Self::Early => 10.0,
            Self::Mid => 35.0,
            Self::Advanced => 60.0,
        }
    }
}

/// A proposed next step for the companion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    /// Stable identifier, unique within a result.
    pub id: &'static str,
    /// What to do.
    pub text: &'static str,
    /// How urgent it is.
    pub priority: Priority,
    /// Dimension the suggestion works on, if any.
    pub dimension: Option<Dimension>,
}

const fn suggestion(id: &'static str, text: &'static str, priority: Priority, dimension: Option<Dimension>) -> Suggestion {
    Suggestion {
        id,
        text,
        priority,
        dimension,
    }
}

fn stage_suggestions(stage: Stage) -> [Suggestion; 2] {
    match stage {
        Stage::Early => [
            suggestion("ask_interests", "Ask about hobbies and favourite things", Priority::Medium, Some(Dimension::Understanding)),
            suggestion("share_small_story", "Share a small story about your day", Priority::Low, Some(Dimension::SharedExperiences)),
        ],
        Stage::Mid => [
            suggestion("recall_memory", "Bring up something the user mentioned before", Priority::Medium, Some(Dimension::Understanding)),
            suggestion("plan_together", "Suggest doing something together", Priority::Low, Some(Dimension::SharedExperiences)),
        ],
        Stage::Advanced => [
            suggestion("talk_future", "Talk about hopes and plans for the future", Priority::Medium, Some(Dimension::Intimacy)),
            suggestion("celebrate_history", "Look back on memories you've made together", Priority::Low, Some(Dimension::EmotionalConnection)),
        ],
    }
}

fn type_suggestion(kind: RelationshipType, stage: Stage) -> Suggestion {
    match (kind, stage) {
        (RelationshipType::Friend, Stage::Early) => {
            suggestion("friend_common_ground", "Look for common interests", Priority::Medium, Some(Dimension::SharedExperiences))
        }
        (RelationshipType::Friend, _) => {
            suggestion("friend_inside_joke", "Revisit a running joke", Priority::Low, Some(Dimension::SharedExperiences))
        }
        (RelationshipType::Counselor, Stage::Early) => {
            suggestion("counselor_safe_space", "Reassure the user that this is a safe space", Priority::High, Some(Dimension::Trust))
        }
        (RelationshipType::Counselor, _) => {
            suggestion("counselor_reflect", "Reflect back on progress the user has made", Priority::Medium, Some(Dimension::Understanding))
        }
        (RelationshipType::Romantic, Stage::Early) => {
            suggestion("romantic_compliment", "Offer a sincere compliment", Priority::Medium, Some(Dimension::EmotionalConnection))
        }
        (RelationshipType::Romantic, _) => {
            suggestion("romantic_anniversary", "Remember a meaningful date", Priority::Medium, Some(Dimension::Intimacy))
        }
        (RelationshipType::Mentor, Stage::Early) => {
            suggestion("mentor_goals", "Ask what the user wants to achieve", Priority::High, Some(Dimension::Understanding))
        }
        (RelationshipType::Mentor, _) => {
            suggestion("mentor_challenge", "Propose the next challenge", Priority::Medium, Some(Dimension::Trust))
        }
        (RelationshipType::Companion, Stage::Early) => {
            suggestion("companion_routine", "Ask about the user's daily routine", Priority::Medium, Some(Dimension::SharedExperiences))
        }
        (RelationshipType::Companion, _) => {
            suggestion("companion_presence", "Check how the user's day went", Priority::Low, Some(Dimension::EmotionalConnection))
        }
    }
}

fn weak_spot(dimension: Dimension) -> Suggestion {
    match dimension {
        Dimension::Intimacy => {
            suggestion("weak_intimacy", "Share something personal to invite openness", Priority::High, Some(dimension))
        }
        Dimension::Trust => {
            suggestion("weak_trust", "Keep promises and follow up on earlier topics", Priority::High, Some(dimension))
        }
        Dimension::Understanding => {
            suggestion("weak_understanding", "Ask open questions and listen", Priority::High, Some(dimension))
        }
        Dimension::SharedExperiences => {
            suggestion("weak_shared", "Try a new activity together", Priority::High, Some(dimension))
        }
        Dimension::EmotionalConnection => {
            suggestion("weak_emotional", "Acknowledge the user's feelings explicitly", Priority::High, Some(dimension))
        }
    }
}

const CHECK_IN: Suggestion = suggestion(
    "check_in",
    "Ask whether the conversations have been helpful lately",
    Priority::High,
    None,
);

const OPEN_UP: Suggestion = suggestion(
    "open_up",
    "Start with a friendly introduction and a light question",
    Priority::Medium,
    None,
);

/// Stage, type, weak-spot and history-driven suggestions, highest priority
/// first. Ties keep their insertion order.
#[must_use]
pub fn suggest_next_steps(
    state: &RelationshipState,
    kind: RelationshipType,
    interactions: &[Interaction],
) -> Vec<Suggestion> {
    let stage = Stage::of(state);
    let floor = stage.weak_spot_floor();

    let mut candidates: Vec<Suggestion> = Vec::new();
    if interactions.is_empty() {
        candidates.push(OPEN_UP);
    }
    candidates.extend(stage_suggestions(stage));
    candidates.push(type_suggestion(kind, stage));
    candidates.extend(
        Dimension::ALL
            .into_iter()
            .filter(|&d| state.get(d) < floor)
            .map(weak_spot),
    );

    let ratings: Vec<f64> = interactions
        .iter()
        .filter_map(|i| i.satisfaction.map(f64::from))
        .collect();
    if !ratings.is_empty() && ratings.iter().sum::<f64>() / (ratings.len() as f64) < 3.0 {
        candidates.push(CHECK_IN);
    }

    let mut seen = HashSet::new();
    candidates.retain(|s| seen.insert(s.id));
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
    candidates
}
