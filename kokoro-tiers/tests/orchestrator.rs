//! End-to-end orchestrator behaviour across real and failing tiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use kokoro_core::{ContextType, Embedding, KeywordDictionary, KokoroConfig, KokoroError, MessageId, SessionId, UserId};
use kokoro_tiers::{
    CacheTier, ChatMessage, DurableTier, EmbeddingProvider, HashingEmbedder, MemoryOrchestrator, MessagePayload,
    MessageRole, SearchOptions, SemanticTier, Tier, TierError, TierHealth, TierHit, TierKind, TierQuery,
};

fn config() -> KokoroConfig {
    let mut config = KokoroConfig::default();
    config.embedding.provider = "hashing".into();
    config.embedding.dimensions = 256;
    config.embedding.batch_delay_ms = 0;
    config.orchestrator.tier_timeout_ms = 500;
    config
}

fn dictionary() -> Arc<KeywordDictionary> {
    Arc::new(KeywordDictionary::builtin().expect("builtin dictionary"))
}

/// A tier that fails or stalls every operation.
struct BrokenTier {
    kind: TierKind,
    stall: bool,
}

impl BrokenTier {
    fn failing(kind: TierKind) -> Arc<dyn Tier> {
        Arc::new(Self { kind, stall: false })
    }

    fn stalling(kind: TierKind) -> Arc<dyn Tier> {
        Arc::new(Self { kind, stall: true })
    }

    async fn fail<T>(&self) -> Result<T, TierError> {
        if self.stall {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Err(TierError::Unavailable(format!("{} is down", self.kind)))
    }
}

#[async_trait]
impl Tier for BrokenTier {
    fn kind(&self) -> TierKind {
        self.kind
    }

    async fn write(&self, _message: &ChatMessage) -> Result<(), TierError> {
        self.fail().await
    }

    async fn search(&self, _query: &TierQuery) -> Result<Vec<TierHit>, TierError> {
        self.fail().await
    }

    async fn messages(&self, _user_id: UserId) -> Result<Vec<ChatMessage>, TierError> {
        self.fail().await
    }

    async fn health(&self) -> TierHealth {
        TierHealth::down(self.kind, "down")
    }

    async fn cleanup(&self, _user_id: UserId) -> Result<usize, TierError> {
        self.fail().await
    }
}

/// Hashing embeddings delivered after a fixed delay.
struct SlowEmbedder {
    inner: HashingEmbedder,
    delay: Duration,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn name(&self) -> &str {
        "slow"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, TierError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.inner.embed_text(text))
    }
}

fn slow_semantic() -> Arc<SemanticTier> {
    Arc::new(SemanticTier::new(Arc::new(SlowEmbedder {
        inner: HashingEmbedder::new(32),
        delay: Duration::from_millis(200),
    })))
}

fn durable() -> Arc<dyn Tier> {
    Arc::new(DurableTier::open_in_memory(&config().durable).expect("open durable"))
}

fn cache() -> Arc<dyn Tier> {
    Arc::new(CacheTier::new(&config().cache))
}

// ---------------------------------------------------------------------------
// Save / search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resent_payload_is_stored_once() {
    let o = MemoryOrchestrator::open(&config(), dictionary(), None).expect("open");
    let (user, session, id) = (UserId::new(), SessionId::new(), MessageId::new());
    let payload = MessagePayload::user("再送しても一件").with_id(id);
    let first = o.save_message(user, session, payload.clone()).await.expect("save");
    let second = o.save_message(user, session, payload).await.expect("resave");
    assert_eq!((first.id, second.id), (id, id));
    o.wait_for_background().await;

    let response = o.search_memories(user, "一件", Some(session), &SearchOptions::default()).await;
    assert_eq!(response.short_term.len(), 1);
    assert_eq!(response.long_term.len(), 1);
    assert!(response.semantic.len() <= 1);
    let report = o.cleanup(user).await;
    assert_eq!(report.removed.get(&TierKind::Durable), Some(&1));
    assert_eq!(report.removed.get(&TierKind::Semantic), Some(&1));
}

#[tokio::test]
async fn short_term_search_returns_saved_turns_in_order() {
    let o = MemoryOrchestrator::open(&config(), dictionary(), None).expect("open");
    let (user, session) = (UserId::new(), SessionId::new());
    let texts = ["おはよう", "今日は雨だね", "傘を忘れた", "濡れちゃった", "温かいお茶を飲もう"];
    for (i, text) in texts.iter().enumerate() {
        let payload = if i % 2 == 0 {
            MessagePayload::user(*text)
        } else {
            MessagePayload::assistant(*text)
        };
        o.save_message(user, session, payload).await.expect("save");
    }

    let response = o
        .search_memories(user, "お茶", Some(session), &SearchOptions::short_term_only())
        .await;
    let got: Vec<&str> = response.short_term.iter().map(|h| h.message.content.as_str()).collect();
    assert_eq!(got, texts);
    assert_eq!(response.short_term[1].message.role, MessageRole::Assistant);
    assert!(response.long_term.is_empty());
    assert!(response.semantic.is_empty());
    assert!(response.unavailable.is_empty());
}

#[tokio::test]
async fn disabled_tiers_yield_empty_lists() {
    let o = MemoryOrchestrator::open(&config(), dictionary(), None).expect("open");
    let (user, session) = (UserId::new(), SessionId::new());
    o.save_message(user, session, MessagePayload::user("映画を見た"))
        .await
        .expect("save");
    o.wait_for_background().await;

    let response = o.search_memories(user, "映画", Some(session), &SearchOptions::none()).await;
    assert!(response.is_empty());
    assert_eq!(response.context.context_type, ContextType::General);
    assert!(response.unavailable.is_empty());
}

#[tokio::test]
async fn long_term_search_is_newest_first_and_user_scoped() {
    let o = MemoryOrchestrator::open(&config(), dictionary(), None).expect("open");
    let (alice, bob, session) = (UserId::new(), UserId::new(), SessionId::new());
    for text in ["猫が好き", "犬も好き", "猫を飼いたい"] {
        o.save_message(alice, session, MessagePayload::user(text)).await.expect("save");
    }
    o.save_message(bob, session, MessagePayload::user("猫アレルギー"))
        .await
        .expect("save");

    let options = SearchOptions {
        include_short_term: false,
        include_semantic: false,
        ..SearchOptions::default()
    };
    let response = o.search_memories(alice, "猫", None, &options).await;
    let got: Vec<&str> = response.long_term.iter().map(|h| h.message.content.as_str()).collect();
    assert_eq!(got, ["猫を飼いたい", "猫が好き"]);
}

#[tokio::test]
async fn reference_marker_is_anchored_to_latest_turn() {
    let o = MemoryOrchestrator::open(&config(), dictionary(), None).expect("open");
    let (user, session) = (UserId::new(), SessionId::new());
    o.save_message(user, session, MessagePayload::user("昨日は映画を見た"))
        .await
        .expect("save");

    let response = o
        .search_memories(user, "それってどんな映画?", Some(session), &SearchOptions::short_term_only())
        .await;
    assert_eq!(response.context.context_type, ContextType::Reference);
    assert_eq!(response.context.anchor.as_deref(), Some("昨日は映画を見た"));
    assert!(response.contextual_summary.contains("昨日は映画を見た"));
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn durable_failure_is_surfaced() {
    let o = MemoryOrchestrator::new(&config(), dictionary(), vec![cache(), BrokenTier::failing(TierKind::Durable)])
        .expect("orchestrator");
    let err = o
        .save_message(UserId::new(), SessionId::new(), MessagePayload::user("大事な話"))
        .await
        .expect_err("durable is down");
    assert!(matches!(err, KokoroError::DataIntegrity(_)));
}

#[tokio::test]
async fn cache_failure_does_not_fail_the_save() {
    let o = MemoryOrchestrator::new(&config(), dictionary(), vec![BrokenTier::failing(TierKind::Cache), durable()])
        .expect("orchestrator");
    let (user, session) = (UserId::new(), SessionId::new());
    let saved = o
        .save_message(user, session, MessagePayload::user("それでも保存される"))
        .await
        .expect("save");

    let response = o.search_memories(user, "保存", None, &SearchOptions::default()).await;
    assert_eq!(response.unavailable, vec![TierKind::Cache]);
    assert_eq!(response.long_term.len(), 1);
    assert_eq!(response.long_term[0].message.id, saved.id);
}

#[tokio::test]
async fn stalled_tier_times_out_to_empty() {
    let o = MemoryOrchestrator::new(
        &config(),
        dictionary(),
        vec![cache(), durable(), BrokenTier::stalling(TierKind::Semantic)],
    )
    .expect("orchestrator");
    let (user, session) = (UserId::new(), SessionId::new());
    o.save_message(user, session, MessagePayload::user("hello"))
        .await
        .expect("save");

    let response = o.search_memories(user, "hello", Some(session), &SearchOptions::default()).await;
    assert_eq!(response.short_term.len(), 1);
    assert_eq!(response.long_term.len(), 1);
    assert!(response.semantic.is_empty());
    assert_eq!(response.unavailable, vec![TierKind::Semantic]);
}

#[tokio::test]
async fn status_flags_unhealthy_durable() {
    let o = MemoryOrchestrator::new(&config(), dictionary(), vec![cache(), BrokenTier::failing(TierKind::Durable)])
        .expect("orchestrator");
    let status = o.get_system_status().await;
    assert!(!status.healthy);
    assert_eq!(status.tiers.len(), 2);
    assert!(status.tiers.iter().any(|h| h.kind == TierKind::Cache && h.reachable));
}

#[tokio::test]
async fn cleanup_continues_past_a_failing_tier() {
    let o = MemoryOrchestrator::new(&config(), dictionary(), vec![BrokenTier::failing(TierKind::Cache), durable()])
        .expect("orchestrator");
    let user = UserId::new();
    o.save_message(user, SessionId::new(), MessagePayload::user("消して"))
        .await
        .expect("save");

    let report = o.cleanup(user).await;
    assert_eq!(report.removed.get(&TierKind::Durable), Some(&1));
    assert!(report.failed.contains_key(&TierKind::Cache));
}

#[tokio::test]
async fn cleanup_cancels_inflight_embedding() {
    let semantic = slow_semantic();
    let tiers: Vec<Arc<dyn Tier>> = vec![cache(), durable(), Arc::clone(&semantic) as Arc<dyn Tier>];
    let o = MemoryOrchestrator::new(&config(), dictionary(), tiers).expect("orchestrator");
    let user = UserId::new();
    o.save_message(user, SessionId::new(), MessagePayload::user("忘れてほしい"))
        .await
        .expect("save");
    assert_eq!(o.get_system_status().await.pending_embeddings, 1);

    let report = o.cleanup(user).await;
    assert_eq!(report.cancelled_embeddings, 1);
    assert_eq!(report.removed.get(&TierKind::Durable), Some(&1));
    assert_eq!(o.get_system_status().await.pending_embeddings, 0);

    // Outlast the embedding delay; the purged user must stay purged.
    tokio::time::sleep(Duration::from_millis(400)).await;
    o.wait_for_background().await;
    assert_eq!(semantic.len(), 0);
    assert!(semantic.messages(user).await.expect("list").is_empty());
}

#[tokio::test]
async fn cleanup_leaves_other_users_jobs_running() {
    let semantic = slow_semantic();
    let tiers: Vec<Arc<dyn Tier>> = vec![cache(), durable(), Arc::clone(&semantic) as Arc<dyn Tier>];
    let o = MemoryOrchestrator::new(&config(), dictionary(), tiers).expect("orchestrator");
    let (alice, bob, session) = (UserId::new(), UserId::new(), SessionId::new());
    o.save_message(alice, session, MessagePayload::user("消す")).await.expect("save");
    o.save_message(bob, session, MessagePayload::user("残す")).await.expect("save");

    let report = o.cleanup(alice).await;
    assert_eq!(report.cancelled_embeddings, 1);
    o.wait_for_background().await;

    assert!(semantic.messages(alice).await.expect("list").is_empty());
    let kept = semantic.messages(bob).await.expect("list");
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].content, "残す");
}

// ---------------------------------------------------------------------------
// Semantic backlog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backlog_vectorization_indexes_durable_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kokoro.db");
    let (user, session) = (UserId::new(), SessionId::new());

    // History written while no semantic tier was configured.
    {
        let mut plain = config();
        plain.embedding.provider = "none".into();
        let o = MemoryOrchestrator::open(&plain, dictionary(), Some(path.as_path())).expect("open");
        for text in ["海に行った", "山に登った"] {
            o.save_message(user, session, MessagePayload::user(text)).await.expect("save");
        }
        assert_eq!(o.get_system_status().await.tiers.len(), 2);
    }

    let semantic = Arc::new(SemanticTier::new(Arc::new(HashingEmbedder::new(256))));
    let reopened: Arc<dyn Tier> = Arc::new(DurableTier::open(&path, &config().durable).expect("reopen"));
    let tiers: Vec<Arc<dyn Tier>> = vec![cache(), reopened, Arc::clone(&semantic) as Arc<dyn Tier>];
    let o = MemoryOrchestrator::new(&config(), dictionary(), tiers).expect("orchestrator");

    assert_eq!(o.vectorize_backlog(user).await.expect("backlog"), 2);
    assert_eq!(semantic.len(), 2);

    let options = SearchOptions {
        include_short_term: false,
        include_long_term: false,
        similarity_threshold: Some(0.3),
        ..SearchOptions::default()
    };
    let response = o.search_memories(user, "海に行った", None, &options).await;
    assert_eq!(response.semantic.first().map(|h| h.message.content.as_str()), Some("海に行った"));
}
