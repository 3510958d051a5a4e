//! Semantic tier — per-user cosine-similarity index over message embeddings.
//!
//! Membership in the index is the only record of whether a message has been
//! embedded. Writes of already-indexed messages are no-ops, so a backlog run
//! can replay the durable log through [`Tier::write`] safely.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use kokoro_core::{Embedding, MessageId, RankScore, UserId};

use crate::embedding::EmbeddingProvider;
use crate::error::TierError;
use crate::message::ChatMessage;
use crate::tier::{Tier, TierHealth, TierHit, TierKind, TierQuery};

#[derive(Debug, Clone)]
struct IndexedMessage {
    message: ChatMessage,
    embedding: Embedding,
}

/// In-memory embedding index partitioned by user.
pub struct SemanticTier {
    provider: Arc<dyn EmbeddingProvider>,
    index: DashMap<UserId, Vec<IndexedMessage>>,
    last_error: Mutex<Option<String>>,
}

impl std::fmt::Debug for SemanticTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticTier")
            .field("provider", &self.provider.name())
            .field("users", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl SemanticTier {
    /// Create an empty index over `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            index: DashMap::new(),
            last_error: Mutex::new(None),
        }
    }

    /// Whether `message_id` is already indexed for `user_id`.
    #[must_use]
    pub fn contains(&self, user_id: UserId, message_id: MessageId) -> bool {
        self.index
            .get(&user_id)
            .is_some_and(|entries| entries.iter().any(|e| e.message.id == message_id))
    }

    /// Total number of indexed messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embed `text` through the provider, remembering the outcome for health
    /// reports.
    ///
    /// # Errors
    /// Propagates the provider's error.
    pub async fn embed(&self, text: &str) -> Result<Embedding, TierError> {
        let result = self.provider.embed(text).await;
        *self.last_error.lock() = result.as_ref().err().map(ToString::to_string);
        result
    }

    /// Embed and index a message. Already-indexed messages are skipped.
    ///
    /// # Errors
    /// Returns the embedding failure; the index is left unchanged.
    pub async fn index_message(&self, message: &ChatMessage) -> Result<bool, TierError> {
        if self.contains(message.user_id, message.id) {
            return Ok(false);
        }
        let embedding = self.embed(&message.content).await?;
        let mut entries = self.index.entry(message.user_id).or_default();
        if entries.iter().any(|e| e.message.id == message.id) {
            return Ok(false);
        }
        entries.push(IndexedMessage {
            message: message.clone(),
            embedding,
        });
        Ok(true)
    }

    /// The `k` indexed messages of `user_id` most similar to `vector`, at or
    /// above `threshold`, most similar first.
    #[must_use]
    pub fn search_vector(&self, vector: &Embedding, user_id: UserId, k: usize, threshold: f32) -> Vec<TierHit> {
        let Some(entries) = self.index.get(&user_id) else {
            return Vec::new();
        };
        let mut scored: Vec<(f32, &IndexedMessage)> = entries
            .iter()
            .map(|e| (vector.cosine_similarity(&e.embedding), e))
            .filter(|(similarity, _)| *similarity >= threshold)
            .collect();
        scored.sort_by_key(|(similarity, _)| std::cmp::Reverse(RankScore::new(f64::from(*similarity))));
        scored
            .into_iter()
            .take(k)
            .map(|(similarity, e)| TierHit {
                message: e.message.clone(),
                score: Some(similarity),
            })
            .collect()
    }
}

#[async_trait]
impl Tier for SemanticTier {
    fn kind(&self) -> TierKind {
        TierKind::Semantic
    }

    async fn write(&self, message: &ChatMessage) -> Result<(), TierError> {
        self.index_message(message).await.map(|_| ())
    }

    async fn search(&self, query: &TierQuery) -> Result<Vec<TierHit>, TierError> {
        if query.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embed(&query.text).await?;
        let mut hits = self.search_vector(&vector, query.user_id, query.max_results, query.similarity_threshold);
        if let Some(session_id) = query.session_id {
            // Current session first among equal scores.
            hits.sort_by_key(|h| h.message.session_id != session_id);
            hits.sort_by_key(|h| std::cmp::Reverse(RankScore::new(f64::from(h.score.unwrap_or(0.0)))));
        }
        debug!(hits = hits.len(), "semantic tier searched");
        Ok(hits)
    }

    async fn messages(&self, user_id: UserId) -> Result<Vec<ChatMessage>, TierError> {
        let mut messages: Vec<ChatMessage> = self
            .index
            .get(&user_id)
            .map(|entries| entries.iter().map(|e| e.message.clone()).collect())
            .unwrap_or_default();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn health(&self) -> TierHealth {
        let mut health = TierHealth::up(TierKind::Semantic, self.len());
        let last_error = self.last_error.lock().clone();
        match last_error {
            Some(error) => {
                health.reachable = false;
                health.detail = Some(error);
            }
            None => health.detail = Some(self.provider.name().to_string()),
        }
        health
    }

    async fn cleanup(&self, user_id: UserId) -> Result<usize, TierError> {
        let removed = self.index.remove(&user_id).map_or(0, |(_, entries)| entries.len());
        debug!(%user_id, removed, "semantic tier cleaned");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::message::MessagePayload;
    use kokoro_core::SessionId;

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, TierError> {
            Err(TierError::Embedding("boom".into()))
        }
    }

    fn tier() -> SemanticTier {
        SemanticTier::new(Arc::new(HashingEmbedder::new(256)))
    }

    fn message(user: UserId, text: &str) -> ChatMessage {
        ChatMessage::from_payload(user, SessionId::new(), MessagePayload::user(text))
    }

    #[tokio::test]
    async fn indexes_once_and_finds_similar() {
        let t = tier();
        let user = UserId::new();
        let movie = message(user, "昨日は映画を見た");
        assert!(t.index_message(&movie).await.expect("index"));
        assert!(!t.index_message(&movie).await.expect("reindex"));
        t.index_message(&message(user, "仕事の締め切りが近い")).await.expect("index");

        let query = t.embed("映画を見た").await.expect("embed");
        let hits = t.search_vector(&query, user, 5, 0.3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message.id, movie.id);
        assert!(hits[0].score.is_some_and(|s| s >= 0.3));
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let t = tier();
        let (alice, bob) = (UserId::new(), UserId::new());
        t.index_message(&message(alice, "映画を見た")).await.expect("index");
        let query = t.embed("映画を見た").await.expect("embed");
        assert!(t.search_vector(&query, bob, 5, 0.0).is_empty());
    }

    #[tokio::test]
    async fn provider_failure_marks_tier_unhealthy() {
        let t = SemanticTier::new(Arc::new(FailingProvider));
        let user = UserId::new();
        assert!(t.index_message(&message(user, "hi")).await.is_err());
        assert!(t.is_empty());
        let health = t.health().await;
        assert!(!health.reachable);
    }
}
