//! Configuration management for recall.
//!
//! Loads configuration from environment variables with support for:
//! - Multiple embedding and LLM providers with fallback priority
//! - Memory tuning knobs (thresholds, limits, decay)
//! - Background maintenance scheduling
//!
//! Configuration is built once at startup and passed to the services that
//! need it.

use std::env;
use std::time::Duration;

use recall_embeddings::{default_dimension, EmbeddingConfig, EmbeddingProviderConfig};
use recall_llm::{LlmConfig, LlmProviderConfig};

use crate::services::decay::DEFAULT_HALF_LIFE_DAYS;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub maintenance: MaintenanceConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Tunables for writing, retrieving and maintaining memories.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Minimum query similarity for retrieval.
    pub similarity_threshold: f32,
    /// Default number of memories returned by retrieval.
    pub retrieval_limit: usize,
    /// Similarity at which a write merges into an existing memory.
    pub duplicate_threshold: f32,
    /// Character count above which content is summarized.
    pub summarize_threshold: usize,
    pub summarization_enabled: bool,
    /// Similarity used by consolidation.
    pub consolidation_threshold: f32,
    /// Similarity used by duplicate removal.
    pub dedup_threshold: f32,
    /// Relevance below which pruning considers a memory.
    pub prune_threshold: f64,
    /// Days without access before a low-relevance memory can be archived.
    pub prune_min_age_days: i64,
    /// Access count at or above which a memory is never archived.
    pub prune_max_access_count: i64,
    pub decay_half_life_days: f64,
    /// Similarity at which memories join the same cluster.
    pub cluster_threshold: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            retrieval_limit: 5,
            duplicate_threshold: 0.9,
            summarize_threshold: 200,
            summarization_enabled: true,
            consolidation_threshold: 0.9,
            dedup_threshold: 0.95,
            prune_threshold: 0.3,
            prune_min_age_days: 30,
            prune_max_access_count: 3,
            decay_half_life_days: DEFAULT_HALF_LIFE_DAYS,
            cluster_threshold: 0.75,
        }
    }
}

/// Shortest pause between maintenance cycles.
pub const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Users processed in parallel per cycle.
    pub concurrency: usize,
    /// Rows embedded per user per cycle by the backfill step.
    pub backfill_batch: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(3600),
            concurrency: 4,
            backfill_batch: 50,
        }
    }
}

impl MaintenanceConfig {
    /// Pause between cycles, never shorter than [`MIN_MAINTENANCE_INTERVAL`].
    pub fn cycle_interval(&self) -> Duration {
        self.interval.max(MIN_MAINTENANCE_INTERVAL)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Prometheus listen address; exporter disabled when unset.
    pub metrics_addr: Option<String>,
    pub json_logs: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let memory_defaults = MemoryConfig::default();
        let maintenance_defaults = MaintenanceConfig::default();

        Self {
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/recall.db"),
            },
            embedding: Self::parse_embedding_config(),
            llm: LlmConfig {
                providers: Self::parse_llm_providers(),
            },
            memory: MemoryConfig {
                similarity_threshold: env_parse(
                    "MEMORY_SIMILARITY_THRESHOLD",
                    memory_defaults.similarity_threshold,
                ),
                retrieval_limit: env_parse("MEMORY_RETRIEVAL_LIMIT", memory_defaults.retrieval_limit),
                duplicate_threshold: env_parse(
                    "MEMORY_DUPLICATE_THRESHOLD",
                    memory_defaults.duplicate_threshold,
                ),
                summarize_threshold: env_parse(
                    "MEMORY_SUMMARIZE_THRESHOLD",
                    memory_defaults.summarize_threshold,
                ),
                summarization_enabled: env_flag(
                    "MEMORY_SUMMARIZATION_ENABLED",
                    memory_defaults.summarization_enabled,
                ),
                consolidation_threshold: env_parse(
                    "MEMORY_CONSOLIDATION_THRESHOLD",
                    memory_defaults.consolidation_threshold,
                ),
                dedup_threshold: env_parse("MEMORY_DEDUP_THRESHOLD", memory_defaults.dedup_threshold),
                prune_threshold: env_parse("MEMORY_PRUNE_THRESHOLD", memory_defaults.prune_threshold),
                decay_half_life_days: env_parse(
                    "MEMORY_DECAY_HALF_LIFE_DAYS",
                    memory_defaults.decay_half_life_days,
                )
                .max(1.0),
                ..memory_defaults
            },
            maintenance: MaintenanceConfig {
                enabled: env_flag("MAINTENANCE_ENABLED", maintenance_defaults.enabled),
                interval: Duration::from_secs(env_parse(
                    "MAINTENANCE_INTERVAL_SECS",
                    maintenance_defaults.interval.as_secs(),
                ))
                .max(MIN_MAINTENANCE_INTERVAL),
                concurrency: env_parse("MAINTENANCE_CONCURRENCY", maintenance_defaults.concurrency)
                    .max(1),
                ..maintenance_defaults
            },
            telemetry: TelemetryConfig {
                metrics_addr: env::var("METRICS_ADDR").ok().filter(|v| !v.is_empty()),
                json_logs: env_or("LOG_FORMAT", "pretty").eq_ignore_ascii_case("json"),
            },
        }
    }

    /// Parse LLM providers from environment.
    /// Supports Gemini, Anthropic, OpenRouter, and OpenAI with automatic fallback ordering.
    fn parse_llm_providers() -> Vec<LlmProviderConfig> {
        let mut providers = Vec::new();

        // Gemini (priority 1 - free tier)
        if let Ok(api_key) = env::var("GOOGLE_API_KEY") {
            providers.push(LlmProviderConfig {
                name: "gemini".to_string(),
                base_url: recall_llm::default_endpoint("gemini"),
                model: env_or("GEMINI_MODEL", &recall_llm::default_model("gemini")),
                api_key,
                priority: 1,
            });
        }

        if let Ok(api_key) = env::var("ANTHROPIC_API_KEY") {
            providers.push(LlmProviderConfig {
                name: "anthropic".to_string(),
                base_url: recall_llm::default_endpoint("anthropic"),
                model: env_or("ANTHROPIC_MODEL", &recall_llm::default_model("anthropic")),
                api_key,
                priority: 2,
            });
        }

        if let Ok(api_key) = env::var("OPENROUTER_API_KEY") {
            providers.push(LlmProviderConfig {
                name: "openrouter".to_string(),
                base_url: recall_llm::default_endpoint("openrouter"),
                model: env_or("OPENROUTER_MODEL", &recall_llm::default_model("openrouter")),
                api_key,
                priority: 3,
            });
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            providers.push(LlmProviderConfig {
                name: "openai".to_string(),
                base_url: recall_llm::default_endpoint("openai"),
                model: env_or("OPENAI_MODEL", &recall_llm::default_model("openai")),
                api_key,
                priority: 4,
            });
        }

        providers.sort_by_key(|p| p.priority);
        providers
    }

    /// Parse embedding providers from environment.
    /// OpenAI first (its model defines the stored dimension), then Gemini, then Ollama.
    fn parse_embedding_config() -> EmbeddingConfig {
        let mut providers = Vec::new();

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            providers.push(EmbeddingProviderConfig {
                name: "openai".to_string(),
                base_url: recall_embeddings::default_endpoint("openai"),
                model: env_or(
                    "OPENAI_EMBEDDING_MODEL",
                    &recall_embeddings::default_model("openai"),
                ),
                api_key,
                priority: 1,
            });
        }

        if let Ok(api_key) = env::var("GOOGLE_API_KEY") {
            providers.push(EmbeddingProviderConfig {
                name: "gemini".to_string(),
                base_url: recall_embeddings::default_endpoint("gemini"),
                model: env_or(
                    "GEMINI_EMBEDDING_MODEL",
                    &recall_embeddings::default_model("gemini"),
                ),
                api_key,
                priority: 2,
            });
        }

        // Local/self-hosted, no authentication
        if let Ok(ollama_url) = env::var("OLLAMA_URL") {
            providers.push(EmbeddingProviderConfig {
                name: "ollama".to_string(),
                base_url: ollama_url,
                model: env_or(
                    "OLLAMA_EMBEDDING_MODEL",
                    &recall_embeddings::default_model("ollama"),
                ),
                api_key: String::new(),
                priority: env_parse("OLLAMA_PRIORITY", 3),
            });
        }

        providers.sort_by_key(|p| p.priority);

        let default_dim = providers
            .first()
            .map(|p| default_dimension(&p.model))
            .unwrap_or(1536);

        EmbeddingConfig {
            providers,
            dimension: env_parse("EMBEDDING_DIMENSION", default_dim),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_defaults() {
        let memory = MemoryConfig::default();
        assert_eq!(memory.retrieval_limit, 5);
        assert!((memory.similarity_threshold - 0.3).abs() < f32::EPSILON);
        assert!((memory.duplicate_threshold - 0.9).abs() < f32::EPSILON);
        assert!((memory.dedup_threshold - 0.95).abs() < f32::EPSILON);
        assert_eq!(memory.summarize_threshold, 200);
        assert_eq!(memory.prune_min_age_days, 30);
        assert_eq!(memory.prune_max_access_count, 3);
    }

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("RECALL_TEST_PARSE_GARBAGE", "not-a-number");
        assert_eq!(env_parse("RECALL_TEST_PARSE_GARBAGE", 7usize), 7);
        std::env::set_var("RECALL_TEST_PARSE_GARBAGE", " 12 ");
        assert_eq!(env_parse("RECALL_TEST_PARSE_GARBAGE", 7usize), 12);
        std::env::remove_var("RECALL_TEST_PARSE_GARBAGE");
    }

    #[test]
    fn test_maintenance_interval_has_a_floor() {
        let config = MaintenanceConfig {
            interval: Duration::ZERO,
            ..MaintenanceConfig::default()
        };
        assert_eq!(config.cycle_interval(), MIN_MAINTENANCE_INTERVAL);
        assert_eq!(
            MaintenanceConfig::default().cycle_interval(),
            Duration::from_secs(3600)
        );

        std::env::set_var("MAINTENANCE_INTERVAL_SECS", "0");
        let config = Config::from_env();
        std::env::remove_var("MAINTENANCE_INTERVAL_SECS");
        assert_eq!(config.maintenance.interval, MIN_MAINTENANCE_INTERVAL);
    }

    #[test]
    fn test_env_flag() {
        std::env::set_var("RECALL_TEST_FLAG", "off");
        assert!(!env_flag("RECALL_TEST_FLAG", true));
        std::env::set_var("RECALL_TEST_FLAG", "yes");
        assert!(env_flag("RECALL_TEST_FLAG", false));
        std::env::remove_var("RECALL_TEST_FLAG");
        assert!(env_flag("RECALL_TEST_FLAG", true));
    }
}
