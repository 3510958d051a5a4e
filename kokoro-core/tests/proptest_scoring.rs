//! Property-Based Tests for the scoring engines.
//!
//! Weight bounds and monotonicity, relationship-state consistency, milestone
//! idempotence and categorisation priority under random inputs.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use kokoro_core::config::RelationshipConfig;
use kokoro_core::relationship::check_milestones;
use kokoro_core::weight::decay_resistance;
use kokoro_core::{
    ArchetypePair, ContextMeta, Emotion, EmotionReading, Interaction, KeywordDictionary, Memory, MemoryCategory,
    MemoryFactory, MemoryId, RelationshipEngine, RelationshipState, RelationshipType, TimeOfDay, WeightEngine,
};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000)
}

fn arb_category() -> impl Strategy<Value = MemoryCategory> {
    prop::sample::select(MemoryCategory::ALL.to_vec())
}

fn arb_relationship_type() -> impl Strategy<Value = RelationshipType> {
    prop::sample::select(RelationshipType::ALL.to_vec())
}

fn memory(score: u8, category: MemoryCategory, refs: u32, level: f64) -> Memory {
    Memory {
        id: MemoryId::new(),
        content: "memory".into(),
        original_message: "memory".into(),
        timestamp: epoch(),
        emotion_score: score,
        category,
        relationship_level_at_creation: level,
        reference_count: refs,
        keywords: BTreeSet::new(),
        context_meta: ContextMeta {
            archetypes: ArchetypePair::default(),
            time_of_day: TimeOfDay::Evening,
            turn_index: 0,
            first_time: false,
        },
        is_highlight: Memory::qualifies_as_highlight(score, category),
    }
}

fn arb_memory() -> impl Strategy<Value = Memory> {
    (1u8..=10, arb_category(), 0u32..20, 0.0..=100.0f64)
        .prop_map(|(score, category, refs, level)| memory(score, category, refs, level))
}

fn arb_state() -> impl Strategy<Value = RelationshipState> {
    (0.0..=100.0f64, 0.0..=100.0f64, 0.0..=100.0f64, 0.0..=100.0f64, 0.0..=100.0f64)
        .prop_map(|(i, t, u, s, e)| RelationshipState::new(i, t, u, s, e))
}

fn arb_interaction() -> impl Strategy<Value = Interaction> {
    (
        0i64..100_000,
        "[a-zあ-ん実悩家族秘密わかる大丈夫 ]{1,80}",
        "[a-zあ-んわかる大丈夫おめでとう ]{0,40}",
        0.0..=1.0f32,
        0u32..900,
        prop::option::of(1u8..=5),
        arb_relationship_type(),
    )
        .prop_map(|(minutes, user, response, intensity, duration, satisfaction, kind)| Interaction {
            timestamp: epoch() + Duration::minutes(minutes),
            user_message: format!("x{user}"),
            response,
            emotion: EmotionReading::new(Emotion::Joy, intensity),
            duration_secs: duration,
            satisfaction,
            relationship_type: kind,
        })
}

fn relationship_engine() -> RelationshipEngine {
    RelationshipEngine::new(
        Arc::new(KeywordDictionary::builtin().expect("builtin")),
        RelationshipConfig::default(),
    )
}

// ---------------------------------------------------------------------------
// Property: weight always lies in [0.1, 10]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn weight_always_bounded(mem in arb_memory(), days in 0i64..20_000) {
        let engine = WeightEngine::default();
        let w = engine.recalculate_weight(&mem, epoch() + Duration::days(days));
        prop_assert!((0.1..=10.0).contains(&w), "weight {w} out of range");
    }
}

// ---------------------------------------------------------------------------
// Property: weight never increases with age
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn weight_monotone_in_time(mem in arb_memory(), d1 in 0i64..5_000, extra in 0i64..5_000) {
        let engine = WeightEngine::default();
        let earlier = engine.recalculate_weight(&mem, epoch() + Duration::days(d1));
        let later = engine.recalculate_weight(&mem, epoch() + Duration::days(d1 + extra));
        prop_assert!(later <= earlier + 1e-12, "{later} > {earlier}");
    }
}

// ---------------------------------------------------------------------------
// Property: stronger memories weigh at least as much
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn higher_score_weighs_more(low in 1u8..10, bump in 1u8..=9, cat in arb_category(), days in 0i64..3_000) {
        let high = (low + bump).min(10);
        let engine = WeightEngine::default();
        let now = epoch() + Duration::days(days);
        let mut weak = memory(low, cat, 0, 0.0);
        let mut strong = memory(high, cat, 0, 0.0);
        // Same highlight flag on both so only the score differs.
        weak.is_highlight = false;
        strong.is_highlight = false;
        prop_assert!(engine.recalculate_weight(&strong, now) >= engine.recalculate_weight(&weak, now));
    }

    #[test]
    fn confession_weighs_at_least_emotion(score in 1u8..=10, days in 0i64..3_000) {
        let engine = WeightEngine::default();
        let now = epoch() + Duration::days(days);
        let plain = memory(score, MemoryCategory::Emotion, 0, 0.0);
        let confession = memory(score, MemoryCategory::Confession, 0, 0.0);
        prop_assert!(engine.recalculate_weight(&confession, now) >= engine.recalculate_weight(&plain, now));
    }

    /// A larger category bonus only guarantees a heavier memory when that
    /// category also fades no faster; otherwise age can reverse the order.
    #[test]
    fn bonus_and_resistance_together_order_categories(
        score in 1u8..=10,
        a in arb_category(),
        b in arb_category(),
        days in 0i64..3_000,
    ) {
        let engine = WeightEngine::default();
        let now = epoch() + Duration::days(days);
        let strong = memory(score, a, 0, 0.0);
        let weak = memory(score, b, 0, 0.0);
        prop_assume!(a.bonus() >= b.bonus() && decay_resistance(&strong) <= decay_resistance(&weak));
        prop_assert!(engine.recalculate_weight(&strong, now) >= engine.recalculate_weight(&weak, now));
    }
}

// ---------------------------------------------------------------------------
// Property: overall level is the weighted sum, always in [0, 100]
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn overall_is_weighted_sum(history in prop::collection::vec(arb_interaction(), 0..80)) {
        let state = relationship_engine().track_progress(&history).expect("valid history");
        let expected = 0.25 * (state.intimacy() + state.trust() + state.understanding())
            + 0.125 * (state.shared_experiences() + state.emotional_connection());
        prop_assert!((state.overall_level() - expected).abs() < 1e-9);
        prop_assert!((0.0..=100.0).contains(&state.overall_level()));
    }

    #[test]
    fn track_progress_ignores_input_order(mut history in prop::collection::vec(arb_interaction(), 0..60)) {
        let engine = relationship_engine();
        let forward = engine.track_progress(&history).expect("valid history");
        history.reverse();
        let backward = engine.track_progress(&history).expect("valid history");
        prop_assert_eq!(forward, backward);
    }
}

// ---------------------------------------------------------------------------
// Property: milestone detection is idempotent and edge-triggered
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn milestones_idempotent(prev in arb_state(), curr in arb_state(), kind in arb_relationship_type()) {
        let first: Vec<&str> = check_milestones(&prev, &curr, kind).iter().map(|m| m.id).collect();
        let second: Vec<&str> = check_milestones(&prev, &curr, kind).iter().map(|m| m.id).collect();
        prop_assert_eq!(&first, &second);
        prop_assert!(check_milestones(&curr, &curr, kind).is_empty());
    }
}

// ---------------------------------------------------------------------------
// Property: confession markers always win categorisation
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn confession_has_priority(prefix in "[a-z ]{0,20}", score in 1u8..=10, first in any::<bool>()) {
        let factory = MemoryFactory::new(Arc::new(KeywordDictionary::builtin().expect("builtin")));
        let text = format!("{prefix}記念日に合格して不安だけど大好き");
        prop_assert_eq!(factory.categorize_memory(&text, score, first), MemoryCategory::Confession);
    }
}
