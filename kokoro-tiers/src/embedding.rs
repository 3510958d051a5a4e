//! Embedding providers — unified interface for Ollama, OpenAI-compatible
//! endpoints and an offline hashing embedder.
//!
//! HTTP calls are retried a bounded number of times with exponential backoff
//! plus jitter:
//!
//! ```text
//! delay(n) = min(base · 2^(n-1), max) + jitter,   jitter ∈ [0, base/2]
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use kokoro_core::Embedding;
use kokoro_core::config::EmbeddingConfig;

use crate::error::TierError;

/// Turns text into a vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short backend description for status reports.
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding, TierError>;
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base: Duration,
    /// Ceiling before jitter.
    pub max: Duration,
}

impl RetryPolicy {
    /// Policy from the embedding configuration.
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: Duration::from_millis(config.backoff_base_ms),
            max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Backoff before retry `attempt` (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exponent).min(self.max)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_cap = u64::try_from(self.base.as_millis() / 2).unwrap_or(0);
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Which HTTP API to speak.
#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    /// Ollama `/api/embeddings`.
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible `/v1/embeddings`.
    OpenAiCompatible {
        /// Server root.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
}

/// Embedding client for a remote model server.
pub struct HttpEmbeddingClient {
    backend: EmbeddingBackend,
    http: Client,
    model: String,
    dimensions: usize,
    timeout: Duration,
    retry: RetryPolicy,
    name: String,
}

impl std::fmt::Debug for HttpEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingClient")
            .field("name", &self.name)
            .field("dimensions", &self.dimensions)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpEmbeddingClient {
    /// Create a client.
    #[must_use]
    pub fn new(backend: EmbeddingBackend, config: &EmbeddingConfig) -> Self {
        let name = match &backend {
            EmbeddingBackend::Ollama { .. } => format!("ollama/{}", config.model),
            EmbeddingBackend::OpenAiCompatible { .. } => format!("openai/{}", config.model),
        };
        Self {
            backend,
            http: Client::new(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout: Duration::from_millis(config.request_timeout_ms),
            retry: RetryPolicy::from_config(config),
            name,
        }
    }

    async fn attempt(&self, text: &str) -> Result<Embedding, TierError> {
        let request = match &self.backend {
            EmbeddingBackend::Ollama { base_url } => self
                .http
                .post(format!("{base_url}/api/embeddings"))
                .json(&json!({ "model": self.model, "prompt": text })),
            EmbeddingBackend::OpenAiCompatible { base_url, api_key } => self
                .http
                .post(format!("{base_url}/v1/embeddings"))
                .bearer_auth(api_key)
                .json(&json!({ "model": self.model, "input": text })),
        };

        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TierError::Embedding(format!("HTTP {status}")));
        }
        let body: serde_json::Value = response.json().await?;
        let values = match &self.backend {
            EmbeddingBackend::Ollama { .. } => &body["embedding"],
            EmbeddingBackend::OpenAiCompatible { .. } => &body["data"][0]["embedding"],
        };
        parse_vector(values, self.dimensions)
    }
}

fn parse_vector(values: &serde_json::Value, dimensions: usize) -> Result<Embedding, TierError> {
    let array = values
        .as_array()
        .ok_or_else(|| TierError::Embedding("response has no embedding array".into()))?;
    #[allow(clippy::cast_possible_truncation)]
    let vector: Vec<f32> = array
        .iter()
        .map(|v| v.as_f64().map(|x| x as f32))
        .collect::<Option<_>>()
        .ok_or_else(|| TierError::Embedding("non-numeric embedding component".into()))?;
    if vector.is_empty() {
        return Err(TierError::Embedding("empty embedding".into()));
    }
    if dimensions > 0 && vector.len() != dimensions {
        return Err(TierError::Embedding(format!(
            "expected {dimensions} dimensions, got {}",
            vector.len()
        )));
    }
    Ok(Embedding(vector))
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Embedding, TierError> {
        let mut last_error = String::new();
        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.delay_with_jitter(attempt);
                debug!(
                    attempt = attempt + 1,
                    of = self.retry.max_retries + 1,
                    delay_ms = delay.as_millis(),
                    "retrying embedding call"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            match self.attempt(text).await {
                Ok(embedding) => {
                    debug!(
                        provider = %self.name,
                        latency_ms = start.elapsed().as_millis(),
                        "embedding generated"
                    );
                    return Ok(embedding);
                }
                Err(e) => {
                    warn!(provider = %self.name, error = %e, "embedding call failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(TierError::RetriesExhausted {
            attempts: self.retry.max_retries + 1,
            last_error,
        })
    }
}

// ---------------------------------------------------------------------------
// Hashing embedder
// ---------------------------------------------------------------------------

/// Deterministic feature-hashing embedder.
///
/// Character bigrams (so unsegmented Japanese works) and lower-cased ASCII
/// words are hashed into a fixed number of signed buckets, then the vector is
/// L2-normalised. Features are hashed with 64-bit FNV-1a, so a text maps to
/// the same vector on every run, build and platform.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Embedder producing `dimensions`-long vectors (at least 1).
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously.
    #[must_use]
    pub fn embed_text(&self, text: &str) -> Embedding {
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().filter(|c| !c.is_whitespace()).collect();
        let mut vector = vec![0.0_f32; self.dimensions];

        let dimensions = self.dimensions as u64;
        let mut add = |h: u64| {
            let bucket = usize::try_from(h % dimensions).unwrap_or(0);
            vector[bucket] += if h >> 63 == 0 { 1.0 } else { -1.0 };
        };

        let mut buf = [0u8; 8];
        for pair in chars.windows(2) {
            let first = pair[0].encode_utf8(&mut buf).len();
            let second = pair[1].encode_utf8(&mut buf[first..]).len();
            add(fnv1a(&buf[..first + second]));
        }
        if let [only] = chars.as_slice() {
            add(fnv1a(only.encode_utf8(&mut buf).as_bytes()));
        }
        for word in lowered.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| w.len() > 1) {
            // Word features live in their own space, apart from bigrams.
            add(fnv1a(word.as_bytes()) ^ WORD_SALT);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Embedding(vector)
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const WORD_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// 64-bit FNV-1a.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> Result<Embedding, TierError> {
        Ok(self.embed_text(text))
    }
}

/// Build the provider named in the configuration.
///
/// Returns `None` for `"none"`, which disables the semantic tier.
///
/// # Errors
/// Returns [`TierError::Unavailable`] for an unknown provider or an
/// OpenAI-compatible provider without an API key.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>, TierError> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "none" => return Ok(None),
        "hashing" => Arc::new(HashingEmbedder::new(config.dimensions)),
        "ollama" => Arc::new(HttpEmbeddingClient::new(
            EmbeddingBackend::Ollama {
                base_url: config.base_url.trim_end_matches('/').to_string(),
            },
            config,
        )),
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| TierError::Unavailable("openai embedding provider needs api_key".into()))?;
            Arc::new(HttpEmbeddingClient::new(
                EmbeddingBackend::OpenAiCompatible {
                    base_url: config.base_url.trim_end_matches('/').to_string(),
                    api_key,
                },
                config,
            ))
        }
        other => return Err(TierError::Unavailable(format!("unknown embedding provider '{other}'"))),
    };
    Ok(Some(provider))
}
