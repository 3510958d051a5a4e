//! Tiered Memory Orchestrator — fan-out writes and reads across the tiers.
//!
//! Per request: `idle → fan-out(tiers) → merge → respond`.
//!
//! - `save_message` writes the cache and durable tiers concurrently. Only a
//!   durable failure fails the call; a cache failure is logged. Embedding for
//!   the semantic tier runs as a detached task after the save returns.
//! - `search_memories` queries every enabled tier concurrently, each bounded
//!   by `tier_timeout_ms`. A disabled, failed or timed-out tier contributes
//!   an empty list and is named in `unavailable`.
//! - `get_system_status` and `cleanup` never fail as a whole; problems are
//!   reported per tier. `cleanup` cancels the user's pending embedding jobs
//!   before purging, so a late job cannot re-index purged messages.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kokoro_core::config::OrchestratorConfig;
use kokoro_core::{
    ContextAnalysis, ContextType, KeywordDictionary, KokoroConfig, KokoroError, MessageId, Result, SessionId, UserId,
    analyze_context,
};

use crate::cache::CacheTier;
use crate::durable::DurableTier;
use crate::embedding::build_provider;
use crate::error::TierError;
use crate::message::{ChatMessage, MessagePayload};
use crate::semantic::SemanticTier;
use crate::tier::{Tier, TierHealth, TierHit, TierKind, TierQuery, WritePolicy};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Which tiers a search consults, and how.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Query the cache tier.
    pub include_short_term: bool,
    /// Query the durable tier.
    pub include_long_term: bool,
    /// Query the semantic tier.
    pub include_semantic: bool,
    /// Per-tier result cap; the configured default when `None`.
    pub max_results: Option<usize>,
    /// Semantic similarity floor; the configured default when `None`.
    pub similarity_threshold: Option<f32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            include_short_term: true,
            include_long_term: true,
            include_semantic: true,
            max_results: None,
            similarity_threshold: None,
        }
    }
}

impl SearchOptions {
    /// Only the cache tier.
    #[must_use]
    pub fn short_term_only() -> Self {
        Self {
            include_long_term: false,
            include_semantic: false,
            ..Self::default()
        }
    }

    /// No tier at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            include_short_term: false,
            include_long_term: false,
            include_semantic: false,
            ..Self::default()
        }
    }

    /// Whether `kind` is enabled.
    #[must_use]
    pub fn includes(&self, kind: TierKind) -> bool {
        match kind {
            TierKind::Cache => self.include_short_term,
            TierKind::Durable => self.include_long_term,
            TierKind::Semantic => self.include_semantic,
        }
    }
}

/// Merged result of a search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Cache tier hits, oldest first.
    pub short_term: Vec<TierHit>,
    /// Durable tier hits, newest first.
    pub long_term: Vec<TierHit>,
    /// Semantic tier hits, most similar first.
    pub semantic: Vec<TierHit>,
    /// How the query relates to the recent conversation.
    pub context: ContextAnalysis,
    /// Text summary for whatever consumes the context next.
    pub contextual_summary: String,
    /// Enabled tiers that failed or timed out.
    pub unavailable: Vec<TierKind>,
}

impl SearchResponse {
    /// Whether no tier returned anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty() && self.semantic.is_empty()
    }
}

/// Health of every tier plus background work.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// One entry per configured tier.
    pub tiers: Vec<TierHealth>,
    /// Embedding jobs scheduled but not finished.
    pub pending_embeddings: usize,
    /// Whether the durable tier is reachable.
    pub healthy: bool,
}

/// Outcome of a per-user purge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Entries removed per tier.
    pub removed: BTreeMap<TierKind, usize>,
    /// Tiers whose purge failed, with the reason.
    pub failed: BTreeMap<TierKind, String>,
    /// Embedding jobs for the user cancelled before the purge.
    pub cancelled_embeddings: usize,
}

// ---------------------------------------------------------------------------
// Background job accounting
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BackgroundJobs {
    pending: AtomicUsize,
    idle: Notify,
    next_id: AtomicU64,
    /// Live jobs per user, so a purge can cancel them.
    by_user: Mutex<HashMap<UserId, HashMap<u64, JoinHandle<()>>>>,
}

impl BackgroundJobs {
    /// Detach every live job of `user_id`.
    fn take_user(&self, user_id: UserId) -> Vec<JoinHandle<()>> {
        self.by_user
            .lock()
            .remove(&user_id)
            .map(|jobs| jobs.into_values().collect())
            .unwrap_or_default()
    }
}

/// Retires a job when it ends, whether it finished, panicked or was aborted.
struct JobGuard {
    jobs: Arc<BackgroundJobs>,
    user_id: UserId,
    id: u64,
}

impl JobGuard {
    fn start(jobs: &Arc<BackgroundJobs>, user_id: UserId) -> Self {
        jobs.pending.fetch_add(1, Ordering::SeqCst);
        Self {
            jobs: Arc::clone(jobs),
            user_id,
            id: jobs.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        {
            let mut by_user = self.jobs.by_user.lock();
            if let Some(live) = by_user.get_mut(&self.user_id) {
                live.remove(&self.id);
                if live.is_empty() {
                    by_user.remove(&self.user_id);
                }
            }
        }
        if self.jobs.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.jobs.idle.notify_waiters();
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Coordinates the cache, durable and semantic tiers.
pub struct MemoryOrchestrator {
    tiers: BTreeMap<TierKind, Arc<dyn Tier>>,
    dictionary: Arc<KeywordDictionary>,
    config: OrchestratorConfig,
    batch_delay: Duration,
    jobs: Arc<BackgroundJobs>,
}

impl std::fmt::Debug for MemoryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryOrchestrator")
            .field("tiers", &self.tiers.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MemoryOrchestrator {
    /// Orchestrate the given tiers.
    ///
    /// # Errors
    /// Returns `KokoroError::Config` if no durable tier is supplied or two
    /// tiers share a kind.
    pub fn new(
        config: &KokoroConfig,
        dictionary: Arc<KeywordDictionary>,
        tiers: Vec<Arc<dyn Tier>>,
    ) -> Result<Self> {
        let mut by_kind = BTreeMap::new();
        for tier in tiers {
            let kind = tier.kind();
            if by_kind.insert(kind, tier).is_some() {
                return Err(KokoroError::Config(format!("more than one {kind} tier")));
            }
        }
        if !by_kind.contains_key(&TierKind::Durable) {
            return Err(KokoroError::Config("a durable tier is required".to_string()));
        }
        info!(tiers = ?by_kind.keys().collect::<Vec<_>>(), "memory orchestrator ready");
        Ok(Self {
            tiers: by_kind,
            dictionary,
            config: config.orchestrator.clone(),
            batch_delay: Duration::from_millis(config.embedding.batch_delay_ms),
            jobs: Arc::new(BackgroundJobs::default()),
        })
    }

    /// Build the standard tiers from configuration.
    ///
    /// The durable log lives at `db_path`, or in memory when `None`. The
    /// semantic tier is omitted when the embedding provider is `"none"`.
    ///
    /// # Errors
    /// Returns `KokoroError::Connectivity` if the database cannot be opened
    /// and `KokoroError::Config` for an invalid embedding provider.
    pub fn open(config: &KokoroConfig, dictionary: Arc<KeywordDictionary>, db_path: Option<&Path>) -> Result<Self> {
        let unreachable = |e: TierError| KokoroError::Connectivity {
            tier: TierKind::Durable.to_string(),
            reason: e.to_string(),
        };
        let durable = match db_path {
            Some(path) => DurableTier::open(path, &config.durable).map_err(unreachable)?,
            None => DurableTier::open_in_memory(&config.durable).map_err(unreachable)?,
        };
        let mut tiers: Vec<Arc<dyn Tier>> = vec![Arc::new(CacheTier::new(&config.cache)), Arc::new(durable)];
        if let Some(provider) = build_provider(&config.embedding).map_err(|e| KokoroError::Config(e.to_string()))? {
            tiers.push(Arc::new(SemanticTier::new(provider)));
        }
        Self::new(config, dictionary, tiers)
    }

    fn tier(&self, kind: TierKind) -> Option<&Arc<dyn Tier>> {
        self.tiers.get(&kind)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.tier_timeout_ms)
    }

    /// Label `message` against recent history with the injected dictionary.
    #[must_use]
    pub fn analyze_context<S: AsRef<str>>(&self, message: &str, recent_history: &[S]) -> ContextAnalysis {
        analyze_context(&self.dictionary, message, recent_history)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Persist a message.
    ///
    /// Returns the stored message once the durable write has succeeded. The
    /// semantic tier is updated in the background.
    ///
    /// A durable timeout abandons the wait, not the write, so the row may
    /// still land. Callers that retry should set [`MessagePayload::id`]; a
    /// resend under the same id is stored once in every tier.
    ///
    /// # Errors
    /// Returns `KokoroError::Validation` for blank content and
    /// `KokoroError::DataIntegrity` if the durable write fails or times out.
    pub async fn save_message(
        &self,
        user_id: UserId,
        session_id: SessionId,
        payload: MessagePayload,
    ) -> Result<ChatMessage> {
        if payload.content.trim().is_empty() {
            return Err(KokoroError::Validation("message content is empty".to_string()));
        }
        let message = ChatMessage::from_payload(user_id, session_id, payload);
        let limit = self.timeout();

        let (cache, durable) = tokio::join!(
            self.write_to(TierKind::Cache, &message, limit),
            self.write_to(TierKind::Durable, &message, limit),
        );
        for (kind, outcome) in [(TierKind::Cache, cache), (TierKind::Durable, durable)] {
            let Some(Err(e)) = outcome else { continue };
            match kind.write_policy() {
                WritePolicy::Required => {
                    warn!(%user_id, message_id = %message.id, tier = %kind, error = %e, "required write failed");
                    return Err(e.classify(kind));
                }
                WritePolicy::BestEffort | WritePolicy::Background => {
                    warn!(%user_id, message_id = %message.id, tier = %kind, error = %e, "best-effort write failed");
                }
            }
        }

        self.schedule_embedding(&message);
        debug!(%user_id, %session_id, message_id = %message.id, "message saved");
        Ok(message)
    }

    /// Write to one tier, if configured. `None` means the tier is absent.
    async fn write_to(
        &self,
        kind: TierKind,
        message: &ChatMessage,
        limit: Duration,
    ) -> Option<std::result::Result<(), TierError>> {
        let tier = self.tier(kind)?;
        Some(bounded(kind, limit, tier.write(message)).await)
    }

    fn schedule_embedding(&self, message: &ChatMessage) {
        let Some(semantic) = self.tier(TierKind::Semantic) else {
            return;
        };
        let tier = Arc::clone(semantic);
        let message = message.clone();
        let guard = JobGuard::start(&self.jobs, message.user_id);
        let (user_id, id) = (guard.user_id, guard.id);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = tier.write(&message).await {
                let e = e.classify(TierKind::Semantic);
                warn!(message_id = %message.id, error = %e, "background embedding failed");
            }
        });
        // A job that already finished has nothing left to cancel.
        if !handle.is_finished() {
            self.jobs.by_user.lock().entry(user_id).or_default().insert(id, handle);
        }
    }

    /// Wait until every scheduled embedding job has finished.
    pub async fn wait_for_background(&self) {
        loop {
            let idle = self.jobs.idle.notified();
            if self.jobs.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Embed every durable message of `user_id` missing from the semantic
    /// index, pausing `batch_delay_ms` between embedding calls.
    ///
    /// Returns how many messages were newly indexed; a message that fails to
    /// embed is logged and left for the next run.
    ///
    /// # Errors
    /// Returns `KokoroError::Connectivity` if either tier cannot be listed.
    pub async fn vectorize_backlog(&self, user_id: UserId) -> Result<usize> {
        let Some(semantic) = self.tier(TierKind::Semantic) else {
            return Ok(0);
        };
        let durable = self.durable()?;
        let listing = |kind: TierKind| {
            move |e: TierError| KokoroError::Connectivity {
                tier: kind.to_string(),
                reason: e.to_string(),
            }
        };
        let authoritative = durable.messages(user_id).await.map_err(listing(TierKind::Durable))?;
        let indexed: HashSet<MessageId> = semantic
            .messages(user_id)
            .await
            .map_err(listing(TierKind::Semantic))?
            .into_iter()
            .map(|m| m.id)
            .collect();

        let pending: Vec<&ChatMessage> = authoritative.iter().filter(|m| !indexed.contains(&m.id)).collect();
        let mut embedded = 0;
        for (i, message) in pending.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            match semantic.write(message).await {
                Ok(()) => embedded += 1,
                Err(e) => warn!(message_id = %message.id, error = %e, "backlog embedding failed"),
            }
        }
        info!(%user_id, pending = pending.len(), embedded, "backlog vectorized");
        Ok(embedded)
    }

    fn durable(&self) -> Result<&Arc<dyn Tier>> {
        self.tier(TierKind::Durable)
            .ok_or_else(|| KokoroError::Config("a durable tier is required".to_string()))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Search every enabled tier concurrently and merge the results.
    pub async fn search_memories(
        &self,
        user_id: UserId,
        query: &str,
        session_id: Option<SessionId>,
        options: &SearchOptions,
    ) -> SearchResponse {
        let start = Instant::now();
        let tier_query = TierQuery {
            user_id,
            session_id,
            text: query.to_string(),
            max_results: options.max_results.unwrap_or(self.config.default_max_results),
            similarity_threshold: options
                .similarity_threshold
                .unwrap_or(self.config.similarity_threshold),
        };

        let (short_term, long_term, semantic) = tokio::join!(
            self.query_tier(TierKind::Cache, &tier_query, options),
            self.query_tier(TierKind::Durable, &tier_query, options),
            self.query_tier(TierKind::Semantic, &tier_query, options),
        );

        let mut unavailable = Vec::new();
        let mut settle = |kind: TierKind, outcome: Option<std::result::Result<Vec<TierHit>, TierError>>| match outcome {
            Some(Ok(hits)) => hits,
            Some(Err(e)) => {
                let e = e.classify(kind);
                warn!(%user_id, tier = %kind, error = %e, "tier degraded to empty result");
                unavailable.push(kind);
                Vec::new()
            }
            None => Vec::new(),
        };
        let short_term = settle(TierKind::Cache, short_term);
        let long_term = settle(TierKind::Durable, long_term);
        let semantic = settle(TierKind::Semantic, semantic);

        let history: Vec<&str> = short_term.iter().map(|h| h.message.content.as_str()).collect();
        let context = analyze_context(&self.dictionary, query, &history);
        let contextual_summary =
            contextual_summary(&context, &short_term, &long_term, &semantic, self.config.summary_items);

        debug!(
            %user_id,
            short_term = short_term.len(),
            long_term = long_term.len(),
            semantic = semantic.len(),
            context = %context.context_type,
            elapsed_ms = start.elapsed().as_millis(),
            "memories searched"
        );

        SearchResponse {
            short_term,
            long_term,
            semantic,
            context,
            contextual_summary,
            unavailable,
        }
    }

    /// Query one tier if it is configured and enabled.
    async fn query_tier(
        &self,
        kind: TierKind,
        query: &TierQuery,
        options: &SearchOptions,
    ) -> Option<std::result::Result<Vec<TierHit>, TierError>> {
        if !options.includes(kind) {
            return None;
        }
        let tier = self.tier(kind)?;
        Some(bounded(kind, self.timeout(), tier.search(query)).await)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Probe every tier concurrently.
    pub async fn get_system_status(&self) -> SystemStatus {
        let (cache, durable, semantic) = tokio::join!(
            self.probe(TierKind::Cache),
            self.probe(TierKind::Durable),
            self.probe(TierKind::Semantic),
        );
        let tiers: Vec<TierHealth> = [cache, durable, semantic].into_iter().flatten().collect();
        let healthy = tiers.iter().any(|h| h.kind == TierKind::Durable && h.reachable);
        SystemStatus {
            tiers,
            pending_embeddings: self.jobs.pending.load(Ordering::SeqCst),
            healthy,
        }
    }

    async fn probe(&self, kind: TierKind) -> Option<TierHealth> {
        let tier = self.tier(kind)?;
        let start = Instant::now();
        let mut health = match tokio::time::timeout(self.timeout(), tier.health()).await {
            Ok(health) => health,
            Err(_) => TierHealth::down(kind, format!("health probe timed out after {}ms", self.config.tier_timeout_ms)),
        };
        health.latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Some(health)
    }

    /// Purge `user_id` from every tier independently.
    ///
    /// The user's pending embedding jobs are cancelled and drained first.
    /// Messages saved, or a `vectorize_backlog` run started, while the purge
    /// is in progress are not covered.
    pub async fn cleanup(&self, user_id: UserId) -> CleanupReport {
        let cancelled = self.cancel_embeddings(user_id).await;
        let limit = self.timeout();
        let purge = |kind: TierKind| async move {
            let tier = self.tier(kind)?;
            Some((kind, bounded(kind, limit, tier.cleanup(user_id)).await))
        };
        let (cache, durable, semantic) =
            tokio::join!(purge(TierKind::Cache), purge(TierKind::Durable), purge(TierKind::Semantic));

        let mut report = CleanupReport {
            cancelled_embeddings: cancelled,
            ..CleanupReport::default()
        };
        for (kind, outcome) in [cache, durable, semantic].into_iter().flatten() {
            match outcome {
                Ok(removed) => {
                    report.removed.insert(kind, removed);
                }
                Err(e) => {
                    warn!(%user_id, tier = %kind, error = %e, "cleanup failed");
                    report.failed.insert(kind, e.to_string());
                }
            }
        }
        info!(
            %user_id,
            removed = ?report.removed,
            failed = report.failed.len(),
            cancelled,
            "user cleaned up"
        );
        report
    }

    /// Abort the user's embedding jobs and wait for each to stop.
    async fn cancel_embeddings(&self, user_id: UserId) -> usize {
        let handles = self.jobs.take_user(user_id);
        let mut cancelled = 0;
        for handle in &handles {
            if !handle.is_finished() {
                handle.abort();
                cancelled += 1;
            }
        }
        for handle in handles {
            if let Err(e) = handle.await
                && e.is_panic()
            {
                warn!(%user_id, error = %e, "embedding job panicked");
            }
        }
        if cancelled > 0 {
            debug!(%user_id, cancelled, "embedding jobs cancelled");
        }
        cancelled
    }
}

/// Run a tier future under the per-tier time budget.
async fn bounded<T>(
    kind: TierKind,
    limit: Duration,
    future: impl Future<Output = std::result::Result<T, TierError>>,
) -> std::result::Result<T, TierError> {
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(TierError::Timeout {
            tier: kind,
            ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

// ---------------------------------------------------------------------------
// Contextual summary
// ---------------------------------------------------------------------------

fn contextual_summary(
    context: &ContextAnalysis,
    short_term: &[TierHit],
    long_term: &[TierHit],
    semantic: &[TierHit],
    items: usize,
) -> String {
    let mut lines = vec![match context.context_type {
        ContextType::Reference => match &context.anchor {
            Some(anchor) => format!("The user is referring back to: \"{anchor}\""),
            None => "The user is referring back to earlier conversation.".to_string(),
        },
        ContextType::FollowUp => match &context.anchor {
            Some(anchor) => format!("The user wants to continue from: \"{anchor}\""),
            None => "The user wants to continue the current topic.".to_string(),
        },
        ContextType::General => "The user is starting a new topic.".to_string(),
    }];

    // Recent turns read best as the latest few; the other tiers are already
    // ranked most relevant first.
    let recent_start = short_term.len().saturating_sub(items);
    for (label, hits) in [
        ("Recent conversation", &short_term[recent_start..]),
        ("Related history", &long_term[..long_term.len().min(items)]),
        ("Similar memories", &semantic[..semantic.len().min(items)]),
    ] {
        if hits.is_empty() {
            continue;
        }
        let joined: Vec<&str> = hits.iter().map(|h| h.message.content.as_str()).collect();
        lines.push(format!("{label}: {}", joined.join(" / ")));
    }
    lines.join("\n")
}
