//! Batch candidate generation.
//!
//! Fans out one generation call per configured temperature, bounded by a
//! concurrency ceiling. Each call retries a fixed number of times with a
//! fixed delay; a call that exhausts its retries is dropped from the batch
//! rather than failing it. Only an entirely empty batch is an error.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::candidate::{CandidateMetadata, CandidatePool, StrategyCandidate};
use crate::collab::Generator;
use crate::config::GenerationConfig;
use crate::error::{PipelineError, PipelineResult};

/// Generates candidate pools by concurrent fan-out over a generator.
pub struct BatchGenerator {
    generator: Arc<dyn Generator>,
    config: GenerationConfig,
}

impl BatchGenerator {
    /// Create a batch generator.
    pub fn new(generator: Arc<dyn Generator>, config: GenerationConfig) -> Self {
        Self { generator, config }
    }

    /// Generate one candidate per configured temperature.
    ///
    /// Candidates keep their batch position and temperature in metadata.
    /// Returns [`PipelineError::EmptyCandidatePool`] only if every call
    /// failed.
    pub async fn generate_pool(&self, prompt: &str) -> PipelineResult<CandidatePool> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut set = JoinSet::new();

        for (source_index, &temperature) in self.config.temperatures.iter().enumerate() {
            let generator = Arc::clone(&self.generator);
            let semaphore = Arc::clone(&semaphore);
            let prompt = prompt.to_string();
            let max_retries = self.config.max_retries;
            let retry_delay = Duration::from_millis(self.config.retry_delay_ms);

            set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("generation semaphore never closed");
                let candidate =
                    generate_with_retry(&*generator, &prompt, temperature, max_retries, retry_delay)
                        .await;
                (source_index, temperature, candidate)
            });
        }

        let mut generated: Vec<(usize, f64, StrategyCandidate)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (source_index, temperature, candidate) =
                joined.map_err(|e| PipelineError::Internal {
                    message: format!("Generation task failed: {}", e),
                })?;
            match candidate {
                Some(candidate) => generated.push((source_index, temperature, candidate)),
                None => warn!(
                    source_index,
                    temperature, "Dropping candidate slot after exhausted retries"
                ),
            }
        }

        if generated.is_empty() {
            return Err(PipelineError::EmptyCandidatePool);
        }

        // Tasks finish in arbitrary order; restore batch order
        generated.sort_by_key(|(source_index, _, _)| *source_index);

        let mut pool = CandidatePool::new();
        for (source_index, temperature, candidate) in generated {
            pool.push(candidate, CandidateMetadata::new(source_index, temperature));
        }

        info!(
            requested = self.config.temperatures.len(),
            generated = pool.len(),
            "Generated candidate pool"
        );
        Ok(pool)
    }
}

async fn generate_with_retry(
    generator: &dyn Generator,
    prompt: &str,
    temperature: f64,
    max_retries: u32,
    retry_delay: Duration,
) -> Option<StrategyCandidate> {
    let mut attempt = 0;
    loop {
        match generator.generate(prompt, temperature).await {
            Ok(candidate) => {
                debug!(temperature, attempt, "Candidate generated");
                return Some(candidate);
            }
            Err(e) if attempt < max_retries => {
                warn!(temperature, attempt, error = %e, "Generation failed; retrying");
                attempt += 1;
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => {
                warn!(temperature, attempt, error = %e, "Generation failed; giving up");
                return None;
            }
        }
    }
}
