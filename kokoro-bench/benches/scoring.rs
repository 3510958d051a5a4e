//! Kokoro Benchmark Suite
//!
//! Hot paths on the request side:
//!   memory_creation_single ........... message → scored memory
//!   weight_top5_from_500 ............. rank a user's full history
//!   relationship_window_50 ........... derive state from a full window
//!   hashing_embed_sentence ........... offline embedding of one turn

use std::hint::black_box;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};

use kokoro_core::config::RelationshipConfig;
use kokoro_core::{
    ArchetypePair, ContextMeta, Emotion, EmotionReading, Interaction, KeywordDictionary, Memory, MemoryFactory,
    RelationshipEngine, RelationshipType, WeightEngine,
};
use kokoro_tiers::HashingEmbedder;

const SAMPLES: [&str; 6] = [
    "今日はランチを食べた",
    "試験に合格した！嬉しい",
    "ずっと前から好きです、愛してる",
    "家族と映画を見て楽しかった",
    "仕事で失敗して悲しい",
    "初めて一人で旅行に行った",
];

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn dictionary() -> Arc<KeywordDictionary> {
    Arc::new(KeywordDictionary::builtin().expect("builtin dictionary"))
}

fn history(factory: &MemoryFactory, n: usize) -> Vec<Memory> {
    (0..n)
        .map(|i| {
            let when = epoch() + Duration::hours(i as i64 * 7);
            let text = SAMPLES[i % SAMPLES.len()];
            let meta = ContextMeta::at(ArchetypePair::new("dreamer", "guardian"), when, i as u32);
            factory
                .create_memory_at(text, text, meta, (i % 100) as f64, when)
                .expect("memory")
        })
        .collect()
}

fn bench_memory_creation(c: &mut Criterion) {
    let factory = MemoryFactory::new(dictionary());
    let meta = ContextMeta::at(ArchetypePair::new("dreamer", "guardian"), epoch(), 1);
    c.bench_function("memory_creation_single", |b| {
        b.iter(|| {
            let memory = factory.create_memory_at(
                black_box(SAMPLES[2]),
                SAMPLES[2],
                meta.clone(),
                black_box(40.0),
                epoch(),
            );
            black_box(memory)
        });
    });
}

fn bench_weight_selection(c: &mut Criterion) {
    let factory = MemoryFactory::new(dictionary());
    let memories = history(&factory, 500);
    let engine = WeightEngine::default();
    let now = epoch() + Duration::days(200);
    c.bench_function("weight_top5_from_500", |b| {
        b.iter(|| black_box(engine.select_important_memories(black_box(&memories), 5, now).len()));
    });
}

fn bench_relationship_tracking(c: &mut Criterion) {
    let engine = RelationshipEngine::new(dictionary(), RelationshipConfig::default());
    let interactions: Vec<Interaction> = (0..50)
        .map(|i| Interaction {
            timestamp: epoch() + Duration::minutes(i * 30),
            user_message: SAMPLES[i as usize % SAMPLES.len()].to_string(),
            response: "そうなんだ、もっと聞かせて".to_string(),
            emotion: EmotionReading::new(Emotion::Joy, 0.6),
            duration_secs: 300,
            satisfaction: Some(4),
            relationship_type: RelationshipType::Friend,
        })
        .collect();
    c.bench_function("relationship_window_50", |b| {
        b.iter(|| black_box(engine.track_progress(black_box(&interactions))));
    });
}

fn bench_hashing_embed(c: &mut Criterion) {
    let embedder = HashingEmbedder::new(384);
    c.bench_function("hashing_embed_sentence", |b| {
        b.iter(|| black_box(embedder.embed_text(black_box(SAMPLES[3]))));
    });
}

criterion_group!(
    benches,
    bench_memory_creation,
    bench_weight_selection,
    bench_relationship_tracking,
    bench_hashing_embed,
);
criterion_main!(benches);
