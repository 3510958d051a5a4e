//! Configuration for the Kokoro engine.
//!
//! Maps directly to `kokoro.toml`. Every section and field has a default, so
//! an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level Kokoro configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KokoroConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Memory weight computation.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Relationship derivation.
    #[serde(default)]
    pub relationship: RelationshipConfig,
    /// Tier fan-out behaviour.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Cache tier.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Durable tier.
    #[serde(default)]
    pub durable: DurableConfig,
    /// Embedding service used by the semantic tier.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl KokoroConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `KokoroError::Config` if the TOML is invalid or a value is out
    /// of range.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| crate::KokoroError::Config(e.to_string()))?;
        config.scoring.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Parameters of the memory weight function.
///
/// The weight bounds themselves are fixed (see
/// [`MIN_WEIGHT`](crate::weight::MIN_WEIGHT) and
/// [`MAX_WEIGHT`](crate::weight::MAX_WEIGHT)); unknown keys such as
/// `min_weight` are rejected rather than ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Base exponential decay rate per day.
    #[serde(default = "default_base_decay_rate")]
    pub base_decay_rate: f64,
    /// Weight added per time a memory was surfaced.
    #[serde(default = "default_reference_bonus_rate")]
    pub reference_bonus_rate: f64,
    /// Upper bound of the total reference bonus.
    #[serde(default = "default_reference_bonus_cap")]
    pub reference_bonus_cap: f64,
    /// Weight added per relationship level point at creation.
    #[serde(default = "default_relationship_nudge")]
    pub relationship_nudge: f64,
    /// Decayed weight never drops below this share of its undecayed value.
    #[serde(default = "default_decay_floor_ratio")]
    pub decay_floor_ratio: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_decay_rate: 0.01,
            reference_bonus_rate: 0.5,
            reference_bonus_cap: 3.0,
            relationship_nudge: 0.1,
            decay_floor_ratio: 0.1,
        }
    }
}

impl ScoringConfig {
    /// Check that every rate is finite and non-negative and that the decay
    /// floor is a share in [0, 1].
    ///
    /// # Errors
    /// Returns `KokoroError::Config` naming the first offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        let rates = [
            ("base_decay_rate", self.base_decay_rate),
            ("reference_bonus_rate", self.reference_bonus_rate),
            ("reference_bonus_cap", self.reference_bonus_cap),
            ("relationship_nudge", self.relationship_nudge),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(crate::KokoroError::Config(format!(
                    "scoring.{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.decay_floor_ratio) {
            return Err(crate::KokoroError::Config(format!(
                "scoring.decay_floor_ratio must be in [0, 1], got {}",
                self.decay_floor_ratio
            )));
        }
        Ok(())
    }
}

/// Relationship derivation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Number of most recent interactions considered.
    #[serde(default = "default_window")]
    pub window: usize,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self { window: 50 }
    }
}

/// Fan-out/fan-in settings for the tiered orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound for any single tier branch of a request.
    #[serde(default = "default_tier_timeout_ms")]
    pub tier_timeout_ms: u64,
    /// Results returned per tier when the caller does not specify.
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
    /// Semantic matches below this cosine similarity are discarded.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Items shown per tier in the synthesized contextual summary.
    #[serde(default = "default_summary_items")]
    pub summary_items: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tier_timeout_ms: 2000,
            default_max_results: 10,
            similarity_threshold: 0.7,
            summary_items: 3,
        }
    }
}

/// Cache tier retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of (user, session) buffers kept before LRU eviction.
    #[serde(default = "default_cache_sessions")]
    pub max_sessions: usize,
    /// Messages kept per session buffer.
    #[serde(default = "default_cache_messages")]
    pub max_messages_per_session: usize,
    /// Seconds a cached message stays readable.
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            max_messages_per_session: 50,
            ttl_seconds: 3600,
        }
    }
}

/// Durable tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableConfig {
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a CRC-32 of every message row.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "ollama", "openai", "hashing", "none".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Base URL of the embedding API.
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    /// Optional API key for OpenAI-compatible providers.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Embedding vector dimensions.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Hard timeout for a single embedding call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Ceiling for the backoff delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Pause between successive calls in batch vectorization.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            request_timeout_ms: 5000,
            max_retries: 2,
            backoff_base_ms: 200,
            backoff_max_ms: 2000,
            batch_delay_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_provider() -> String { "ollama".to_string() }
fn default_embedding_url() -> String { "http://localhost:11434".to_string() }
fn default_embedding_model() -> String { "nomic-embed-text".to_string() }
fn default_base_decay_rate() -> f64 { 0.01 }
fn default_reference_bonus_rate() -> f64 { 0.5 }
fn default_reference_bonus_cap() -> f64 { 3.0 }
fn default_relationship_nudge() -> f64 { 0.1 }
fn default_decay_floor_ratio() -> f64 { 0.1 }
fn default_similarity_threshold() -> f32 { 0.7 }
fn default_window() -> usize { 50 }
fn default_max_results() -> usize { 10 }
fn default_summary_items() -> usize { 3 }
fn default_cache_sessions() -> usize { 1024 }
fn default_cache_messages() -> usize { 50 }
fn default_dimensions() -> usize { 768 }
fn default_cache_ttl() -> u64 { 3600 }
fn default_tier_timeout_ms() -> u64 { 2000 }
fn default_request_timeout_ms() -> u64 { 5000 }
fn default_max_retries() -> u32 { 2 }
fn default_backoff_base_ms() -> u64 { 200 }
fn default_backoff_max_ms() -> u64 { 2000 }
fn default_batch_delay_ms() -> u64 { 100 }
