//! HTTP-backed collaborator gateway.
//!
//! Each capability maps onto a named remote pipe. Requests carry a JSON
//! input payload; responses return a completion string that is itself JSON
//! (possibly wrapped in markdown code fences). Retries use bounded
//! exponential backoff.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{
    EmbeddingProvider, Evaluator, FeedbackSummarizer, Generator, PairwiseJudge,
    PairwiseJudgment, Preference, QualitativeFeedback,
};
use crate::candidate::StrategyCandidate;
use crate::config::{PipeConfig, RemoteConfig, RequestConfig};
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::metrics::StrategicMetrics;

// ============================================================================
// Wire Types
// ============================================================================

/// Request body for running a pipe.
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    /// Pipe name
    pub name: String,
    /// Capability-specific input payload
    pub input: serde_json::Value,
}

/// Response body from running a pipe.
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    /// Whether the pipe run succeeded
    pub success: bool,
    /// Completion text, expected to contain JSON
    pub completion: String,
}

#[derive(Debug, Deserialize)]
struct JudgeWire {
    preference: u8,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
struct EvaluationWire {
    coherence: f64,
    feasibility: f64,
    domain_alignment: f64,
    risk_management: f64,
    resource_efficiency: f64,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f64>>,
}

// ============================================================================
// Gateway
// ============================================================================

/// Live HTTP gateway implementing every collaborator capability.
#[derive(Clone)]
pub struct PipeGateway {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
    pipes: PipeConfig,
}

impl PipeGateway {
    /// Create a new gateway.
    pub fn new(
        remote: &RemoteConfig,
        request_config: RequestConfig,
        pipes: PipeConfig,
    ) -> CollaboratorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(CollaboratorError::Http)?;

        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            api_key: remote.api_key.clone(),
            request_config,
            pipes,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run a pipe with bounded exponential-backoff retry.
    pub async fn call_pipe(&self, request: PipeRequest) -> CollaboratorResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let pipe_name = request.name.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    pipe = %pipe_name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying pipe request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    info!(
                        pipe = %pipe_name,
                        latency_ms = start.elapsed().as_millis(),
                        "Pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        pipe = %pipe_name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Pipe call failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(CollaboratorError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> CollaboratorResult<PipeResponse> {
        debug!(pipe = %request.name, "Calling pipe");

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    CollaboratorError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let pipe_response: PipeResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(pipe_response)
    }

    /// Parse a completion as `T`, tolerating markdown code fences.
    fn parse_completion<T: serde::de::DeserializeOwned>(
        completion: &str,
    ) -> CollaboratorResult<T> {
        if let Ok(value) = serde_json::from_str::<T>(completion) {
            return Ok(value);
        }

        let json_str = if completion.contains("```json") {
            completion
                .split("```json")
                .nth(1)
                .and_then(|s| s.split("```").next())
                .unwrap_or(completion)
        } else if completion.contains("```") {
            completion.split("```").nth(1).unwrap_or(completion)
        } else {
            completion
        };

        serde_json::from_str::<T>(json_str.trim()).map_err(|e| {
            CollaboratorError::InvalidResponse {
                message: format!("Failed to parse completion: {}", e),
            }
        })
    }
}

// ============================================================================
// Capability Implementations
// ============================================================================

#[async_trait]
impl Generator for PipeGateway {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> CollaboratorResult<StrategyCandidate> {
        let request = PipeRequest {
            name: self.pipes.generator.clone(),
            input: json!({ "prompt": prompt, "temperature": temperature }),
        };
        let response = self.call_pipe(request).await?;
        Self::parse_completion(&response.completion)
    }
}

#[async_trait]
impl PairwiseJudge for PipeGateway {
    async fn compare(
        &self,
        first: &StrategyCandidate,
        second: &StrategyCandidate,
        context: &str,
    ) -> CollaboratorResult<PairwiseJudgment> {
        let request = PipeRequest {
            name: self.pipes.judge.clone(),
            input: json!({ "first": first, "second": second, "context": context }),
        };
        let response = self.call_pipe(request).await?;
        let wire: JudgeWire = Self::parse_completion(&response.completion)?;

        let preference =
            Preference::from_u8(wire.preference).ok_or(CollaboratorError::InvalidResponse {
                message: format!("Preference must be 1 or 2, got {}", wire.preference),
            })?;

        Ok(PairwiseJudgment {
            preference,
            rationale: wire.rationale,
        })
    }
}

#[async_trait]
impl Evaluator for PipeGateway {
    async fn evaluate(
        &self,
        candidate: &StrategyCandidate,
        context: &str,
    ) -> CollaboratorResult<StrategicMetrics> {
        let request = PipeRequest {
            name: self.pipes.evaluator.clone(),
            input: json!({ "candidate": candidate, "context": context }),
        };
        let response = self.call_pipe(request).await?;
        let wire: EvaluationWire = Self::parse_completion(&response.completion)?;

        Ok(StrategicMetrics::new(
            wire.coherence,
            wire.feasibility,
            wire.domain_alignment,
            wire.risk_management,
            wire.resource_efficiency,
        ))
    }
}

#[async_trait]
impl FeedbackSummarizer for PipeGateway {
    async fn summarize(&self, report: &str) -> CollaboratorResult<QualitativeFeedback> {
        let request = PipeRequest {
            name: self.pipes.summarizer.clone(),
            input: json!({ "report": report }),
        };
        let response = self.call_pipe(request).await?;
        Self::parse_completion(&response.completion)
    }
}

#[async_trait]
impl EmbeddingProvider for PipeGateway {
    async fn embed(&self, texts: &[String]) -> CollaboratorResult<Vec<Vec<f64>>> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({ "model": self.pipes.embedder, "input": texts }))
            .send()
            .await
            .map_err(CollaboratorError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| CollaboratorError::InvalidResponse {
                    message: format!("Failed to parse embeddings: {}", e),
                })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(CollaboratorError::InvalidResponse {
                message: format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }

        Ok(parsed.embeddings)
    }
}
