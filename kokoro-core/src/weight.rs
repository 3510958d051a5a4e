//! Weight Engine — lazily re-derived memory importance.
//!
//! A memory's weight is a pure function of its fields and "now":
//!
//! ```text
//! pre      = emotion_score + category_bonus
//! decayed  = max(pre · e^(-days · λ · resistance), pre · floor_ratio)
//! weight   = clamp(decayed + min(cap, refs · ρ) + level · ν, 0.1, 10)
//! ```
//!
//! `resistance` starts at 1 and compounds multiplicatively: ×0.3 for emotion
//! score ≥ 8 (×0.5 for ≥ 6), ×0.2 for confession / milestone / first, and
//! ×0.1 for highlights. Lower resistance means slower decay.
//!
//! Nothing here writes to a memory except [`WeightEngine::surface_memories`],
//! which only bumps `reference_count`.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::memory::{Memory, MemoryCategory};
use crate::types::{MemoryId, RankScore, days_apart, days_since};

/// Lowest weight any memory can have.
pub const MIN_WEIGHT: f64 = 0.1;
/// Highest weight any memory can have.
pub const MAX_WEIGHT: f64 = 10.0;

/// A memory paired with its weight at evaluation time.
#[derive(Debug, Clone, Copy)]
pub struct WeightedMemory<'a> {
    /// The memory.
    pub memory: &'a Memory,
    /// Weight computed for the requested instant.
    pub weight: f64,
}

/// Memories bucketed by their current weight.
#[derive(Debug, Clone, Default)]
pub struct IntensityBuckets<'a> {
    /// Weight ≥ 8.
    pub very_high: Vec<WeightedMemory<'a>>,
    /// Weight in [6, 8).
    pub high: Vec<WeightedMemory<'a>>,
    /// Weight in [3, 6).
    pub medium: Vec<WeightedMemory<'a>>,
    /// Weight < 3.
    pub low: Vec<WeightedMemory<'a>>,
}

/// Direction of emotional intensity over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Later memories are more intense by more than 0.5 on average.
    Increasing,
    /// Later memories are less intense by more than 0.5 on average.
    Decreasing,
    /// Neither.
    Stable,
}

/// Summary of how a memory set developed over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthPattern {
    /// Number of memories.
    pub total: usize,
    /// Mean emotion score (0 for an empty set).
    pub average_emotion_score: f64,
    /// Memories per category.
    pub category_counts: BTreeMap<MemoryCategory, usize>,
    /// Trend of emotion scores, first half vs second half.
    pub trend: Trend,
    /// Calendar month (year, month) with the most memories.
    pub peak_month: Option<(i32, u32)>,
}

/// Computes memory weights and the rankings built on them.
#[derive(Debug, Clone, Default)]
pub struct WeightEngine {
    config: ScoringConfig,
}

impl WeightEngine {
    /// Create an engine with the given scoring parameters.
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// The memory's importance at `now`, always in [`MIN_WEIGHT`, `MAX_WEIGHT`].
    ///
    /// A non-finite intermediate (e.g. from a hand-built config with a NaN
    /// rate) yields `MIN_WEIGHT`.
    #[must_use]
    pub fn recalculate_weight(&self, memory: &Memory, now: DateTime<Utc>) -> f64 {
        let cfg = &self.config;
        let pre_decay = f64::from(memory.emotion_score) + memory.category.bonus();

        let days = days_since(now, memory.timestamp);
        let decay_factor = (-days * cfg.base_decay_rate * decay_resistance(memory)).exp();
        let decayed = (pre_decay * decay_factor).max(pre_decay * cfg.decay_floor_ratio);

        let reinforcement =
            (f64::from(memory.reference_count) * cfg.reference_bonus_rate).min(cfg.reference_bonus_cap);
        let nudge = memory.relationship_level_at_creation * cfg.relationship_nudge;

        let weight = decayed + reinforcement + nudge;
        if weight.is_finite() {
            weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
        } else {
            MIN_WEIGHT
        }
    }

    /// Top `k` memories by current weight, heaviest first.
    #[must_use]
    pub fn select_important_memories<'a>(
        &self,
        memories: &'a [Memory],
        k: usize,
        now: DateTime<Utc>,
    ) -> Vec<WeightedMemory<'a>> {
        let mut weighted = self.weigh_all(memories, now);
        sort_by_weight(&mut weighted);
        weighted.truncate(k);
        weighted
    }

    /// Select the top `k` memories and record a reference on each.
    ///
    /// Returns the ids surfaced, heaviest first. Weights are ranked before any
    /// count is incremented, so the call is order-independent.
    pub fn surface_memories(&self, memories: &mut [Memory], k: usize, now: DateTime<Utc>) -> Vec<MemoryId> {
        let surfaced: Vec<MemoryId> = self
            .select_important_memories(memories, k, now)
            .iter()
            .map(|w| w.memory.id)
            .collect();
        for memory in memories.iter_mut() {
            if surfaced.contains(&memory.id) {
                memory.record_reference();
            }
        }
        surfaced
    }

    /// Memories created within `[start, end]` whose weight is at least
    /// `min_weight`, heaviest first.
    #[must_use]
    pub fn memories_in_period<'a>(
        &self,
        memories: &'a [Memory],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_weight: f64,
        now: DateTime<Utc>,
    ) -> Vec<WeightedMemory<'a>> {
        let mut selected: Vec<WeightedMemory<'a>> = memories
            .iter()
            .filter(|m| m.timestamp >= start && m.timestamp <= end)
            .map(|memory| WeightedMemory {
                memory,
                weight: self.recalculate_weight(memory, now),
            })
            .filter(|w| w.weight >= min_weight)
            .collect();
        sort_by_weight(&mut selected);
        selected
    }

    /// Bucket memories by current weight.
    #[must_use]
    pub fn categorize_by_intensity<'a>(&self, memories: &'a [Memory], now: DateTime<Utc>) -> IntensityBuckets<'a> {
        let mut buckets = IntensityBuckets::default();
        for weighted in self.weigh_all(memories, now) {
            let bucket = match weighted.weight {
                w if w >= 8.0 => &mut buckets.very_high,
                w if w >= 6.0 => &mut buckets.high,
                w if w >= 3.0 => &mut buckets.medium,
                _ => &mut buckets.low,
            };
            bucket.push(weighted);
        }
        buckets
    }

    fn weigh_all<'a>(&self, memories: &'a [Memory], now: DateTime<Utc>) -> Vec<WeightedMemory<'a>> {
        memories
            .iter()
            .map(|memory| WeightedMemory {
                memory,
                weight: self.recalculate_weight(memory, now),
            })
            .collect()
    }
}

/// Multiplier on the base decay rate; smaller means the memory fades slower.
#[must_use]
pub fn decay_resistance(memory: &Memory) -> f64 {
    let mut resistance = 1.0;
    if memory.emotion_score >= 8 {
        resistance *= 0.3;
    } else if memory.emotion_score >= 6 {
        resistance *= 0.5;
    }
    if memory.category.is_enduring() {
        resistance *= 0.2;
    }
    if memory.is_highlight {
        resistance *= 0.1;
    }
    resistance
}

fn sort_by_weight(weighted: &mut [WeightedMemory<'_>]) {
    weighted.sort_by_key(|w| std::cmp::Reverse(RankScore::new(w.weight)));
}

// ---------------------------------------------------------------------------
// Relatedness & clustering
// ---------------------------------------------------------------------------

/// Heuristic similarity between two memories.
///
/// +2 per shared keyword, +3 for the same category, +2 when formed within a
/// week of each other (+1 within 30 days), +1 when the relationship levels at
/// creation differ by at most one point.
#[must_use]
pub fn relatedness_score(a: &Memory, b: &Memory) -> u32 {
    let shared = a.keywords.intersection(&b.keywords).count();
    let mut score = u32::try_from(shared).unwrap_or(u32::MAX / 2).saturating_mul(2);

    if a.category == b.category {
        score += 3;
    }

    let apart = days_apart(a.timestamp, b.timestamp);
    if apart <= 7.0 {
        score += 2;
    } else if apart <= 30.0 {
        score += 1;
    }

    if (a.relationship_level_at_creation - b.relationship_level_at_creation).abs() <= 1.0 {
        score += 1;
    }
    score
}

/// Memories related to `target` by at least `min_relatedness`, most related
/// first, at most `max_size` of them. The target itself is excluded.
#[must_use]
pub fn related_cluster<'a>(
    target: &Memory,
    memories: &'a [Memory],
    min_relatedness: u32,
    max_size: usize,
) -> Vec<(&'a Memory, u32)> {
    let mut cluster: Vec<(&'a Memory, u32)> = memories
        .iter()
        .filter(|m| m.id != target.id)
        .map(|m| (m, relatedness_score(target, m)))
        .filter(|(_, score)| *score >= min_relatedness)
        .collect();
    cluster.sort_by(|a, b| b.1.cmp(&a.1));
    cluster.truncate(max_size);
    cluster
}

// ---------------------------------------------------------------------------
// Growth pattern
// ---------------------------------------------------------------------------

/// Summarise how a memory set developed over time.
#[must_use]
pub fn growth_pattern(memories: &[Memory]) -> GrowthPattern {
    let mut sorted: Vec<&Memory> = memories.iter().collect();
    sorted.sort_by_key(|m| m.timestamp);

    let mut category_counts = BTreeMap::new();
    let mut month_counts: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for memory in &sorted {
        *category_counts.entry(memory.category).or_insert(0) += 1;
        *month_counts
            .entry((memory.timestamp.year(), memory.timestamp.month()))
            .or_insert(0) += 1;
    }

    let mid = sorted.len() / 2;
    let (first_half, second_half) = sorted.split_at(mid);
    let trend = if first_half.is_empty() || second_half.is_empty() {
        Trend::Stable
    } else {
        let delta = mean_emotion(second_half) - mean_emotion(first_half);
        if delta > 0.5 {
            Trend::Increasing
        } else if delta < -0.5 {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    };

    // Ties resolve to the earliest month.
    let peak_month = month_counts
        .iter()
        .fold(None, |best: Option<((i32, u32), usize)>, (month, count)| match best {
            Some((_, best_count)) if best_count >= *count => best,
            _ => Some((*month, *count)),
        })
        .map(|(month, _)| month);

    GrowthPattern {
        total: sorted.len(),
        average_emotion_score: mean_emotion(&sorted),
        category_counts,
        trend,
        peak_month,
    }
}

fn mean_emotion(memories: &[&Memory]) -> f64 {
    if memories.is_empty() {
        return 0.0;
    }
    let total: f64 = memories.iter().map(|m| f64::from(m.emotion_score)).sum();
    total / memories.len() as f64
}
