//! Configuration for the selection and refinement pipeline.
//!
//! All components receive explicit, immutable configuration objects
//! constructed once and passed by reference. There are no process-wide
//! registries or hidden globals; parallel test runs see independent
//! configuration values.

use std::env;
use std::path::PathBuf;

use crate::error::PipelineError;

/// Umbrella configuration for the whole pipeline
#[derive(Debug, Clone, Default)]
pub struct StratagemConfig {
    /// Remote collaborator API
    pub remote: RemoteConfig,
    /// HTTP request behavior
    pub request: RequestConfig,
    /// Optional session persistence
    pub database: DatabaseConfig,
    /// Named pipes per capability
    pub pipes: PipeConfig,
    /// Batch candidate generation
    pub generation: GenerationConfig,
    /// Consensus (clustering) selection
    pub selection: SelectionConfig,
    /// Pairwise tournaments
    pub tournament: TournamentConfig,
    /// Step dependency graph heuristics
    pub graph: GraphConfig,
    /// Refinement loop limits and targets
    pub refinement: RefinementConfig,
}

/// Remote collaborator API configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Bearer token for the collaborator API
    pub api_key: String,
    /// Base URL of the collaborator API
    pub base_url: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.stratagem.dev".to_string(),
        }
    }
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Per-request timeout
    pub timeout_ms: u64,
    /// Retries per request with exponential backoff
    pub max_retries: u32,
    /// Base delay between retries
    pub retry_delay_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Database configuration for optional session persistence
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: PathBuf,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/stratagem.db"),
            max_connections: 5,
        }
    }
}

/// Named remote pipes, one per collaborator capability
#[derive(Debug, Clone)]
pub struct PipeConfig {
    /// Pipe producing strategy candidates
    pub generator: String,
    /// Pipe judging pairwise comparisons
    pub judge: String,
    /// Pipe scoring the five dimensions
    pub evaluator: String,
    /// Pipe summarizing metrics reports
    pub summarizer: String,
    /// Embedding model name
    pub embedder: String,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            generator: "strategy-generator-v1".to_string(),
            judge: "strategy-judge-v1".to_string(),
            evaluator: "strategy-evaluator-v1".to_string(),
            summarizer: "strategy-feedback-v1".to_string(),
            embedder: "strategy-embedder-v1".to_string(),
        }
    }
}

/// Configuration for batch candidate generation
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Concurrency ceiling for the generation fan-out
    pub max_concurrency: usize,
    /// Retries per individual generation call
    pub max_retries: u32,
    /// Fixed delay between generation retries
    pub retry_delay_ms: u64,
    /// Sampling temperatures, one candidate per entry
    pub temperatures: Vec<f64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            max_retries: 2,
            retry_delay_ms: 500,
            temperatures: vec![0.3, 0.5, 0.7, 0.9, 1.1],
        }
    }
}

/// Configuration for consensus (clustering) selection
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Minimum cluster size for density clustering; pools smaller than this
    /// take the degenerate single-trunk path
    pub min_cluster_size: usize,
    /// Clusters whose size / population falls below this ratio contribute
    /// their members as twigs
    pub twig_size_ratio: f64,
    /// Cosine-distance neighborhood radius for density clustering
    pub cluster_eps: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            twig_size_ratio: 0.2,
            cluster_eps: 0.3,
        }
    }
}

/// Configuration for pairwise tournaments
#[derive(Debug, Clone)]
pub struct TournamentConfig {
    /// Independent judgments per pairing, aggregated by majority vote
    pub num_comparisons: usize,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self { num_comparisons: 3 }
    }
}

/// Configuration for the step dependency graph builder
///
/// The prerequisite/outcome satisfaction heuristic is approximate; its
/// thresholds are adjustable rather than load-bearing.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Minimum shared whitespace tokens between an outcome and a
    /// prerequisite for a dependency edge
    pub min_shared_tokens: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            min_shared_tokens: 2,
        }
    }
}

/// Configuration for the refinement loop
#[derive(Debug, Clone)]
pub struct RefinementConfig {
    /// Maximum refinement generations beyond the original candidate
    pub max_generations: u32,
    /// Convergence indicator above which the loop stops
    pub convergence_threshold: f64,
    /// Overall score above which the loop stops
    pub quality_target: f64,
    /// Compliance score above which the loop stops
    pub compliance_target: f64,
    /// Absolute improvement below which the loop stops
    pub min_improvement: f64,
    /// Wall-clock budget for a whole session, in seconds
    pub time_limit_secs: u64,
    /// Cap on per-strategy metric history; oldest snapshots are evicted
    pub history_cap: usize,
    /// Cost attributed to each refinement generation, for ROI estimates
    pub cost_per_generation: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            max_generations: 5,
            convergence_threshold: 0.8,
            quality_target: 9.0,
            compliance_target: 0.95,
            min_improvement: 0.01,
            time_limit_secs: 300,
            history_cap: 100,
            cost_per_generation: 1.0,
        }
    }
}

impl StratagemConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, PipelineError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let remote = RemoteConfig {
            api_key: env::var("STRATAGEM_API_KEY").map_err(|_| PipelineError::Config {
                message: "STRATAGEM_API_KEY is required".to_string(),
            })?,
            base_url: env::var("STRATAGEM_BASE_URL")
                .unwrap_or_else(|_| RemoteConfig::default().base_url),
        };

        let request = RequestConfig {
            timeout_ms: env_parsed("STRATAGEM_TIMEOUT_MS", 30000),
            max_retries: env_parsed("STRATAGEM_MAX_RETRIES", 3),
            retry_delay_ms: env_parsed("STRATAGEM_RETRY_DELAY_MS", 1000),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("STRATAGEM_DATABASE_PATH")
                    .unwrap_or_else(|_| "./data/stratagem.db".to_string()),
            ),
            max_connections: env_parsed("STRATAGEM_DATABASE_MAX_CONNECTIONS", 5),
        };

        let defaults = PipeConfig::default();
        let pipes = PipeConfig {
            generator: env::var("STRATAGEM_PIPE_GENERATOR").unwrap_or(defaults.generator),
            judge: env::var("STRATAGEM_PIPE_JUDGE").unwrap_or(defaults.judge),
            evaluator: env::var("STRATAGEM_PIPE_EVALUATOR").unwrap_or(defaults.evaluator),
            summarizer: env::var("STRATAGEM_PIPE_SUMMARIZER").unwrap_or(defaults.summarizer),
            embedder: env::var("STRATAGEM_PIPE_EMBEDDER").unwrap_or(defaults.embedder),
        };

        let generation = GenerationConfig {
            max_concurrency: env_parsed("STRATAGEM_GEN_CONCURRENCY", 5),
            max_retries: env_parsed("STRATAGEM_GEN_MAX_RETRIES", 2),
            retry_delay_ms: env_parsed("STRATAGEM_GEN_RETRY_DELAY_MS", 500),
            temperatures: GenerationConfig::default().temperatures,
        };

        let selection = SelectionConfig {
            min_cluster_size: env_parsed("STRATAGEM_MIN_CLUSTER_SIZE", 2),
            twig_size_ratio: env_parsed("STRATAGEM_TWIG_SIZE_RATIO", 0.2),
            cluster_eps: env_parsed("STRATAGEM_CLUSTER_EPS", 0.3),
        };

        let tournament = TournamentConfig {
            num_comparisons: env_parsed("STRATAGEM_NUM_COMPARISONS", 3),
        };

        let graph = GraphConfig {
            min_shared_tokens: env_parsed("STRATAGEM_MIN_SHARED_TOKENS", 2),
        };

        let refinement = RefinementConfig {
            max_generations: env_parsed("STRATAGEM_MAX_GENERATIONS", 5),
            convergence_threshold: env_parsed("STRATAGEM_CONVERGENCE_THRESHOLD", 0.8),
            quality_target: env_parsed("STRATAGEM_QUALITY_TARGET", 9.0),
            compliance_target: env_parsed("STRATAGEM_COMPLIANCE_TARGET", 0.95),
            min_improvement: env_parsed("STRATAGEM_MIN_IMPROVEMENT", 0.01),
            time_limit_secs: env_parsed("STRATAGEM_TIME_LIMIT_SECS", 300),
            history_cap: env_parsed("STRATAGEM_HISTORY_CAP", 100),
            cost_per_generation: env_parsed("STRATAGEM_COST_PER_GENERATION", 1.0),
        };

        Ok(StratagemConfig {
            remote,
            request,
            database,
            pipes,
            generation,
            selection,
            tournament,
            graph,
            refinement,
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StratagemConfig::default();
        assert_eq!(config.generation.max_concurrency, 5);
        assert_eq!(config.selection.twig_size_ratio, 0.2);
        assert_eq!(config.tournament.num_comparisons, 3);
        assert_eq!(config.refinement.max_generations, 5);
        assert_eq!(config.refinement.convergence_threshold, 0.8);
        assert_eq!(config.refinement.history_cap, 100);
        assert_eq!(config.graph.min_shared_tokens, 2);
    }

    #[test]
    fn test_env_parsed_fallback() {
        // Unset variable falls back to the provided default
        let value: u64 = env_parsed("STRATAGEM_TEST_UNSET_VARIABLE", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_refinement_defaults_are_consistent() {
        let refinement = RefinementConfig::default();
        assert!(refinement.quality_target <= 10.0);
        assert!(refinement.compliance_target <= 1.0);
        assert!(refinement.convergence_threshold <= 1.0);
        assert!(refinement.min_improvement > 0.0);
    }
}
