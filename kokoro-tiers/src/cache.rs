//! Cache tier — recent turns per (user, session), LRU-evicted.
//!
//! Each session keeps a bounded ring of its latest messages. Whole sessions
//! are evicted least-recently-used first once `max_sessions` is exceeded, and
//! individual messages expire after `ttl_seconds`. Reads return messages in
//! the order they were pushed.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use kokoro_core::config::CacheConfig;
use kokoro_core::{SessionId, UserId};

use crate::error::TierError;
use crate::message::ChatMessage;
use crate::tier::{Tier, TierHealth, TierHit, TierKind, TierQuery};

type SessionKey = (UserId, SessionId);

#[derive(Debug, Clone)]
struct CachedMessage {
    message: ChatMessage,
    cached_at: Instant,
}

/// In-process LRU cache of recent session turns.
#[derive(Debug)]
pub struct CacheTier {
    sessions: Mutex<LruCache<SessionKey, VecDeque<CachedMessage>>>,
    per_session: usize,
    ttl: Duration,
}

impl CacheTier {
    /// Create an empty cache.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            per_session: config.max_messages_per_session.max(1),
            ttl: Duration::from_secs(config.ttl_seconds),
        }
    }

    /// Append a message to its session buffer. A message already buffered
    /// under the same id is left in place.
    pub fn push_recent(&self, message: &ChatMessage) {
        let key = (message.user_id, message.session_id);
        let mut sessions = self.sessions.lock();
        let buffer = sessions.get_or_insert_mut(key, VecDeque::new);
        if buffer.iter().any(|entry| entry.message.id == message.id) {
            return;
        }
        buffer.push_back(CachedMessage {
            message: message.clone(),
            cached_at: Instant::now(),
        });
        while buffer.len() > self.per_session {
            buffer.pop_front();
        }
    }

    /// Unexpired messages of one session, oldest first.
    #[must_use]
    pub fn get_recent(&self, user_id: UserId, session_id: SessionId) -> Vec<ChatMessage> {
        let mut sessions = self.sessions.lock();
        let Some(buffer) = sessions.get_mut(&(user_id, session_id)) else {
            return Vec::new();
        };
        let ttl = self.ttl;
        buffer.retain(|entry| entry.cached_at.elapsed() < ttl);
        buffer.iter().map(|entry| entry.message.clone()).collect()
    }

    /// Unexpired messages across all of a user's sessions, oldest first.
    fn user_messages(&self, user_id: UserId) -> Vec<ChatMessage> {
        let sessions = self.sessions.lock();
        let mut messages: Vec<ChatMessage> = sessions
            .iter()
            .filter(|(key, _)| key.0 == user_id)
            .flat_map(|(_, buffer)| buffer.iter())
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.message.clone())
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        messages
    }

    /// Number of cached sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl Tier for CacheTier {
    fn kind(&self) -> TierKind {
        TierKind::Cache
    }

    async fn write(&self, message: &ChatMessage) -> Result<(), TierError> {
        self.push_recent(message);
        Ok(())
    }

    async fn search(&self, query: &TierQuery) -> Result<Vec<TierHit>, TierError> {
        let mut recent = match query.session_id {
            Some(session_id) => self.get_recent(query.user_id, session_id),
            None => self.user_messages(query.user_id),
        };
        let skip = recent.len().saturating_sub(query.max_results);
        let hits: Vec<TierHit> = recent.drain(skip..).map(TierHit::unscored).collect();
        debug!(hits = hits.len(), "cache tier searched");
        Ok(hits)
    }

    async fn messages(&self, user_id: UserId) -> Result<Vec<ChatMessage>, TierError> {
        Ok(self.user_messages(user_id))
    }

    async fn health(&self) -> TierHealth {
        TierHealth::up(TierKind::Cache, self.session_count())
    }

    async fn cleanup(&self, user_id: UserId) -> Result<usize, TierError> {
        let mut sessions = self.sessions.lock();
        let keys: Vec<SessionKey> = sessions
            .iter()
            .filter(|(key, _)| key.0 == user_id)
            .map(|(key, _)| *key)
            .collect();
        let removed = keys
            .iter()
            .filter_map(|key| sessions.pop(key))
            .map(|buffer| buffer.len())
            .sum();
        debug!(%user_id, sessions = keys.len(), removed, "cache tier cleaned");
        Ok(removed)
    }
}
