//! Core type definitions shared by the scoring engines and the storage tiers.
//!
//! All types are serializable so they can cross whatever transport the
//! caller adapts the engine to.

use chrono::{DateTime, Timelike, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a scored memory.
    MemoryId
);
uuid_id!(
    /// Unique identifier for a chat user.
    UserId
);
uuid_id!(
    /// Unique identifier for a chat session.
    SessionId
);
uuid_id!(
    /// Unique identifier for a persisted chat message.
    MessageId
);

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Fractional days elapsed from `then` to `now`, never negative.
///
/// Timestamps in the future (clock skew) count as zero elapsed time.
#[must_use]
pub fn days_since(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    let millis = (now - then).num_milliseconds().max(0);
    millis as f64 / 86_400_000.0
}

/// Absolute distance in fractional days between two instants.
#[must_use]
pub fn days_apart(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (a - b).num_milliseconds().unsigned_abs() as f64 / 86_400_000.0
}

/// Coarse time-of-day bucket recorded with every memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 05:00–10:59.
    Morning,
    /// 11:00–16:59.
    Afternoon,
    /// 17:00–20:59.
    Evening,
    /// 21:00–23:59.
    Night,
    /// 00:00–04:59.
    LateNight,
}

impl TimeOfDay {
    /// Bucket an hour of the day (0–23).
    #[must_use]
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=10 => Self::Morning,
            11..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            21..=23 => Self::Night,
            _ => Self::LateNight,
        }
    }

    /// Bucket a timestamp by its UTC hour.
    #[must_use]
    pub fn of(timestamp: DateTime<Utc>) -> Self {
        Self::from_hour(timestamp.hour())
    }
}

// ---------------------------------------------------------------------------
// Relationship & Emotion
// ---------------------------------------------------------------------------

/// The kind of relationship a conversation turn was conducted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Casual friendship.
    Friend,
    /// Supportive listener.
    Counselor,
    /// Romantic partner.
    Romantic,
    /// Guide or coach.
    Mentor,
    /// Everyday companion.
    Companion,
}

impl RelationshipType {
    /// Every relationship type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Friend,
        Self::Counselor,
        Self::Romantic,
        Self::Mentor,
        Self::Companion,
    ];
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Friend => "friend",
            Self::Counselor => "counselor",
            Self::Romantic => "romantic",
            Self::Mentor => "mentor",
            Self::Companion => "companion",
        };
        f.write_str(name)
    }
}

/// Dominant emotion detected for a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    /// Happiness, delight.
    Joy,
    /// Affection, fondness.
    Love,
    /// Gratitude.
    Gratitude,
    /// Surprise (treated as mildly positive).
    Surprise,
    /// Nothing in particular.
    Neutral,
    /// Sadness, grief.
    Sadness,
    /// Loneliness.
    Loneliness,
    /// Worry, fear.
    Anxiety,
    /// Anger, frustration.
    Anger,
}

/// Sign of an emotion's affect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Valence {
    /// Pleasant affect.
    Positive,
    /// No clear affect.
    Neutral,
    /// Unpleasant affect.
    Negative,
}

impl Emotion {
    /// The valence associated with this emotion.
    #[must_use]
    pub fn valence(self) -> Valence {
        match self {
            Self::Joy | Self::Love | Self::Gratitude | Self::Surprise => Valence::Positive,
            Self::Neutral => Valence::Neutral,
            Self::Sadness | Self::Loneliness | Self::Anxiety | Self::Anger => Valence::Negative,
        }
    }
}

/// An emotion reading attached to a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    /// The dominant emotion.
    pub dominant: Emotion,
    /// Intensity in [0, 1].
    pub intensity: f32,
}

impl EmotionReading {
    /// A neutral, zero-intensity reading.
    pub const NEUTRAL: Self = Self {
        dominant: Emotion::Neutral,
        intensity: 0.0,
    };

    /// Create a reading. Intensity is validated later, not clamped here.
    #[must_use]
    pub fn new(dominant: Emotion, intensity: f32) -> Self {
        Self {
            dominant,
            intensity,
        }
    }

    /// Valence of the dominant emotion.
    #[must_use]
    pub fn valence(&self) -> Valence {
        self.dominant.valence()
    }
}

impl Default for EmotionReading {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

// ---------------------------------------------------------------------------
// Context metadata
// ---------------------------------------------------------------------------

/// The pair of persona archetypes in play when a memory was formed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchetypePair {
    /// The user's archetype label.
    pub user: String,
    /// The companion's archetype label.
    pub companion: String,
}

impl ArchetypePair {
    /// Build an archetype pair.
    #[must_use]
    pub fn new(user: impl Into<String>, companion: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            companion: companion.into(),
        }
    }
}

/// Conversational context captured alongside a memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMeta {
    /// Archetype pair active for the conversation.
    pub archetypes: ArchetypePair,
    /// Time-of-day bucket of the originating message.
    pub time_of_day: TimeOfDay,
    /// Zero-based turn index within the session.
    pub turn_index: u32,
    /// Caller-asserted "first time this happened" flag.
    #[serde(default)]
    pub first_time: bool,
}

impl ContextMeta {
    /// Context metadata for a message sent at `timestamp`.
    #[must_use]
    pub fn at(archetypes: ArchetypePair, timestamp: DateTime<Utc>, turn_index: u32) -> Self {
        Self {
            archetypes,
            time_of_day: TimeOfDay::of(timestamp),
            turn_index,
            first_time: false,
        }
    }

    /// Mark the originating event as a first-time experience.
    #[must_use]
    pub fn with_first_time(mut self) -> Self {
        self.first_time = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity between two embeddings.
    /// Returns 0.0 if the dimensions differ or either vector is zero-length.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        if self.0.len() != other.0.len() || self.0.is_empty() {
            return 0.0;
        }
        let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom < f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

// ---------------------------------------------------------------------------
// Ranking score
// ---------------------------------------------------------------------------

/// Totally ordered float used to rank memories and matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankScore(pub OrderedFloat<f64>);

impl RankScore {
    /// Wrap a raw score.
    #[must_use]
    pub fn new(score: f64) -> Self {
        Self(OrderedFloat(score))
    }

    /// Get the raw score value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0.into_inner()
    }
}
