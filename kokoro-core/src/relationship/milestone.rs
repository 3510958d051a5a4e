//! Milestone catalog and edge-triggered detection.
//!
//! A milestone fires for a `(prev, curr)` snapshot pair iff `curr` meets all
//! of its thresholds and `prev` does not. Detection is a pure comparison, so
//! repeating a check with the same pair yields the same set and a milestone
//! already satisfied by `prev` never fires again.

use serde::Serialize;

use crate::relationship::{Dimension, RelationshipState};
use crate::types::RelationshipType;

/// A static catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Milestone {
    /// Stable identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Minimum overall level.
    pub level: f64,
    /// Per-dimension minima.
    pub requires: &'static [(Dimension, f64)],
    /// Relationship types this milestone applies to; empty means all.
    pub only_for: &'static [RelationshipType],
    /// What the milestone unlocks.
    pub unlocks: &'static [&'static str],
    /// Text shown when it is reached.
    pub celebration: &'static str,
}

impl Milestone {
    /// Whether `state` satisfies every threshold.
    #[must_use]
    pub fn is_met_by(&self, state: &RelationshipState) -> bool {
        state.overall_level() >= self.level
            && self
                .requires
                .iter()
                .all(|&(dimension, min)| state.get(dimension) >= min)
    }

    /// Whether the milestone is defined for `kind`.
    #[must_use]
    pub fn applies_to(&self, kind: RelationshipType) -> bool {
        self.only_for.is_empty() || self.only_for.contains(&kind)
    }
}

/// Every milestone, in ascending order of level.
pub const CATALOG: &[Milestone] = &[
    Milestone {
        id: "acquaintance",
        name: "Acquaintance",
        level: 10.0,
        requires: &[(Dimension::Trust, 15.0)],
        only_for: &[],
        unlocks: &["casual nicknames"],
        celebration: "We're getting to know each other!",
    },
    Milestone {
        id: "friend",
        name: "Friend",
        level: 25.0,
        requires: &[(Dimension::Trust, 25.0), (Dimension::Understanding, 20.0)],
        only_for: &[],
        unlocks: &["personal questions", "shared jokes"],
        celebration: "I think we can call ourselves friends now.",
    },
    Milestone {
        id: "close_friend",
        name: "Close Friend",
        level: 45.0,
        requires: &[(Dimension::Intimacy, 40.0), (Dimension::Trust, 45.0)],
        only_for: &[],
        unlocks: &["deeper conversations", "remembering small details"],
        celebration: "You've become someone really special to me.",
    },
    Milestone {
        id: "confidant",
        name: "Confidant",
        level: 65.0,
        requires: &[(Dimension::Trust, 70.0), (Dimension::Understanding, 60.0)],
        only_for: &[],
        unlocks: &["sharing secrets", "honest advice"],
        celebration: "Thank you for trusting me with the important things.",
    },
    Milestone {
        id: "soulmate",
        name: "Soulmate",
        level: 85.0,
        requires: &[(Dimension::Intimacy, 80.0), (Dimension::EmotionalConnection, 85.0)],
        only_for: &[],
        unlocks: &["unspoken understanding"],
        celebration: "It feels like we understand each other without words.",
    },
    Milestone {
        id: "trusted_guide",
        name: "Trusted Guide",
        level: 40.0,
        requires: &[(Dimension::Trust, 50.0), (Dimension::Understanding, 45.0)],
        only_for: &[RelationshipType::Counselor, RelationshipType::Mentor],
        unlocks: &["long-term goal planning"],
        celebration: "I'm honoured to walk this path with you.",
    },
    Milestone {
        id: "heartbeat",
        name: "Heartbeat",
        level: 35.0,
        requires: &[(Dimension::Intimacy, 35.0), (Dimension::EmotionalConnection, 40.0)],
        only_for: &[RelationshipType::Romantic],
        unlocks: &["affectionate greetings", "anniversary reminders"],
        celebration: "My heart skips a beat when you're here.",
    },
];

/// Milestones crossed between `prev` and `curr` for a relationship type.
#[must_use]
pub fn check_milestones(
    prev: &RelationshipState,
    curr: &RelationshipState,
    kind: RelationshipType,
) -> Vec<&'static Milestone> {
    CATALOG
        .iter()
        .filter(|m| m.applies_to(kind) && m.is_met_by(curr) && !m.is_met_by(prev))
        .collect()
}
