//! Integration Tests — message text through scoring, ranking and relationship
//! derivation.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use kokoro_core::config::RelationshipConfig;
use kokoro_core::relationship::{Dimension, check_milestones, optimize_for_relationship_type, suggest_next_steps};
use kokoro_core::weight::{Trend, growth_pattern, related_cluster};
use kokoro_core::{
    ArchetypePair, ContextMeta, ContextType, Emotion, EmotionReading, Interaction, KeywordDictionary, KokoroConfig,
    Memory, MemoryCategory, MemoryFactory, RelationshipEngine, RelationshipState, RelationshipType, WeightEngine,
    analyze_context,
};

fn dictionary() -> Arc<KeywordDictionary> {
    Arc::new(KeywordDictionary::builtin().expect("builtin dictionary"))
}

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 20, 0, 0).single().expect("valid date") + Duration::days(n)
}

fn memory_at(factory: &MemoryFactory, text: &str, when: DateTime<Utc>, level: f64) -> Memory {
    let meta = ContextMeta::at(ArchetypePair::new("dreamer", "guardian"), when, 1);
    factory
        .create_memory_at(text, text, meta, level, when)
        .expect("memory")
}

// ---------------------------------------------------------------------------
// Memory lifecycle: create → weigh → surface → cluster
// ---------------------------------------------------------------------------

#[test]
fn memories_rank_by_significance() {
    let factory = MemoryFactory::new(dictionary());
    let engine = WeightEngine::new(KokoroConfig::default().scoring);

    let mut memories = vec![
        memory_at(&factory, "今日はランチを食べた", day(0), 10.0),
        memory_at(&factory, "ずっと前から好きです、愛してる", day(1), 30.0),
        memory_at(&factory, "試験に合格した！嬉しい", day(2), 0.0),
    ];
    assert_eq!(memories[1].category, MemoryCategory::Confession);
    assert_eq!(memories[2].category, MemoryCategory::Milestone);

    let now = day(60);
    let top = engine.select_important_memories(&memories, 2, now);
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].memory.id, memories[1].id);
    assert!(top.iter().all(|w| (0.1..=10.0).contains(&w.weight)));

    let surfaced = engine.surface_memories(&mut memories, 1, now);
    assert_eq!(surfaced, vec![memories[1].id]);
    assert_eq!(memories[1].reference_count, 1);
    assert_eq!(memories[0].reference_count, 0);
}

#[test]
fn related_memories_cluster_around_target() {
    let factory = MemoryFactory::new(dictionary());
    let memories = vec![
        memory_at(&factory, "家族と映画を見て楽しい", day(0), 10.0),
        memory_at(&factory, "家族でゲームして楽しい", day(3), 10.5),
        memory_at(&factory, "仕事の会議", day(90), 50.0),
    ];
    let cluster = related_cluster(&memories[0], &memories, 4, 5);
    assert_eq!(cluster.len(), 1);
    assert_eq!(cluster[0].0.id, memories[1].id);
}

#[test]
fn growth_pattern_detects_rising_intensity() {
    let factory = MemoryFactory::new(dictionary());
    let memories = vec![
        memory_at(&factory, "こんにちは", day(0), 5.0),
        memory_at(&factory, "おはよう", day(1), 5.0),
        memory_at(&factory, "愛してる", day(40), 5.0),
        memory_at(&factory, "幸せ", day(41), 5.0),
    ];
    let pattern = growth_pattern(&memories);
    assert_eq!(pattern.total, 4);
    assert_eq!(pattern.trend, Trend::Increasing);
}

// ---------------------------------------------------------------------------
// Relationship: history → state → milestones → suggestions
// ---------------------------------------------------------------------------

fn turn(user: &str, response: &str, minutes: i64, emotion: Emotion, intensity: f32) -> Interaction {
    Interaction {
        timestamp: day(0) + Duration::minutes(minutes),
        user_message: user.into(),
        response: response.into(),
        emotion: EmotionReading::new(emotion, intensity),
        duration_secs: 400,
        satisfaction: Some(5),
        relationship_type: RelationshipType::Friend,
    }
}

#[test]
fn relationship_grows_and_crosses_milestones() {
    let engine = RelationshipEngine::new(dictionary(), RelationshipConfig::default());
    let before = engine.track_progress(&[]).expect("initial");

    let history: Vec<Interaction> = (0..20)
        .map(|i| {
            turn(
                "実は最近仕事で悩みがあって、家族にも言えなくて、ずっと一人で抱えていたんだ",
                "そうだったんだね、話してくれてありがとう。わかるよ、大丈夫",
                i * 10,
                Emotion::Sadness,
                0.8,
            )
        })
        .collect();
    let after = engine.track_progress(&history).expect("state");

    for dimension in Dimension::ALL {
        assert!(after.get(dimension) >= before.get(dimension));
    }
    let milestones = check_milestones(&before, &after, RelationshipType::Friend);
    assert!(milestones.iter().any(|m| m.id == "acquaintance"));
    // Checking the same snapshot against itself never re-fires.
    assert!(check_milestones(&after, &after, RelationshipType::Friend).is_empty());

    let suggestions = suggest_next_steps(&after, RelationshipType::Friend, &history);
    assert!(!suggestions.is_empty());
    assert!(!suggestions.iter().any(|s| s.id == "check_in"));
}

#[test]
fn optimization_keeps_overall_consistent() {
    let state = RelationshipState::new(70.0, 80.0, 60.0, 40.0, 90.0);
    for kind in RelationshipType::ALL {
        let tuned = optimize_for_relationship_type(&state, kind);
        let expected = 0.25 * (tuned.intimacy() + tuned.trust() + tuned.understanding())
            + 0.125 * (tuned.shared_experiences() + tuned.emotional_connection());
        assert!((tuned.overall_level() - expected).abs() < 1e-9);
    }
}

// ---------------------------------------------------------------------------
// Context classification
// ---------------------------------------------------------------------------

#[test]
fn context_labels() {
    let d = dictionary();
    let history = vec!["昨日は映画を見たよ".to_string()];
    let reference = analyze_context(&d, "それって何？", &history);
    assert_eq!(reference.context_type, ContextType::Reference);
    assert_eq!(reference.anchor.as_deref(), Some("昨日は映画を見たよ"));
    assert_eq!(analyze_context(&d, "もっと詳しく教えて", &history).context_type, ContextType::FollowUp);
    assert_eq!(analyze_context(&d, "新しい質問です", &history).context_type, ContextType::General);
}
