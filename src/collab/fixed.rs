//! Deterministic collaborator doubles.
//!
//! These implement the capability traits without any network dependency,
//! for tests and offline runs. Selection between these and
//! [`super::http::PipeGateway`] is the caller's explicit choice.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    EmbeddingProvider, Evaluator, FeedbackSummarizer, Generator, PairwiseJudge,
    PairwiseJudgment, Preference, QualitativeFeedback,
};
use crate::candidate::StrategyCandidate;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::metrics::StrategicMetrics;

fn unavailable(what: &str) -> CollaboratorError {
    CollaboratorError::Unavailable {
        message: format!("{} exhausted its script", what),
        retries: 0,
    }
}

// ============================================================================
// Fixed Generator
// ============================================================================

/// Generator that replays a fixed sequence of candidates.
pub struct FixedGenerator {
    queue: Mutex<VecDeque<StrategyCandidate>>,
    /// When true, keep cycling the original sequence after it is exhausted
    cycle: Option<Vec<StrategyCandidate>>,
}

impl FixedGenerator {
    /// Return each candidate once, then fail.
    pub fn sequence(candidates: Vec<StrategyCandidate>) -> Self {
        Self {
            queue: Mutex::new(candidates.into()),
            cycle: None,
        }
    }

    /// Return the candidates in order, restarting from the beginning when
    /// the sequence runs out.
    pub fn cycling(candidates: Vec<StrategyCandidate>) -> Self {
        Self {
            queue: Mutex::new(candidates.clone().into()),
            cycle: Some(candidates),
        }
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self::sequence(Vec::new())
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _temperature: f64,
    ) -> CollaboratorResult<StrategyCandidate> {
        let mut queue = self.queue.lock().expect("generator lock poisoned");
        if queue.is_empty() {
            if let Some(cycle) = &self.cycle {
                queue.extend(cycle.iter().cloned());
            }
        }
        queue.pop_front().ok_or_else(|| unavailable("FixedGenerator"))
    }
}

// ============================================================================
// Scripted Judge
// ============================================================================

/// Judge that replays a scripted sequence of preferences, then falls back
/// to a default.
pub struct ScriptedJudge {
    script: Mutex<VecDeque<Preference>>,
    default: Preference,
}

impl ScriptedJudge {
    /// Replay `script`, then always answer `default`.
    pub fn new(script: Vec<Preference>, default: Preference) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default,
        }
    }

    /// A judge that always answers the same preference.
    pub fn always(preference: Preference) -> Self {
        Self::new(Vec::new(), preference)
    }
}

#[async_trait]
impl PairwiseJudge for ScriptedJudge {
    async fn compare(
        &self,
        _first: &StrategyCandidate,
        _second: &StrategyCandidate,
        _context: &str,
    ) -> CollaboratorResult<PairwiseJudgment> {
        let preference = self
            .script
            .lock()
            .expect("judge lock poisoned")
            .pop_front()
            .unwrap_or(self.default);
        Ok(PairwiseJudgment {
            preference,
            rationale: String::new(),
        })
    }
}

/// Judge whose every comparison fails, for failure-policy tests.
pub struct FailingJudge;

#[async_trait]
impl PairwiseJudge for FailingJudge {
    async fn compare(
        &self,
        _first: &StrategyCandidate,
        _second: &StrategyCandidate,
        _context: &str,
    ) -> CollaboratorResult<PairwiseJudgment> {
        Err(unavailable("FailingJudge"))
    }
}

// ============================================================================
// Fixed Evaluator
// ============================================================================

/// Evaluator that replays scripted metrics, then a default.
pub struct FixedEvaluator {
    script: Mutex<VecDeque<StrategicMetrics>>,
    default: StrategicMetrics,
}

impl FixedEvaluator {
    /// Replay `script`, then always answer `default`.
    pub fn new(script: Vec<StrategicMetrics>, default: StrategicMetrics) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default,
        }
    }

    /// An evaluator that always returns the same metrics.
    pub fn constant(metrics: StrategicMetrics) -> Self {
        Self::new(Vec::new(), metrics)
    }
}

#[async_trait]
impl Evaluator for FixedEvaluator {
    async fn evaluate(
        &self,
        _candidate: &StrategyCandidate,
        _context: &str,
    ) -> CollaboratorResult<StrategicMetrics> {
        Ok(self
            .script
            .lock()
            .expect("evaluator lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Evaluator whose every call fails, for neutral-fallback tests.
pub struct FailingEvaluator;

#[async_trait]
impl Evaluator for FailingEvaluator {
    async fn evaluate(
        &self,
        _candidate: &StrategyCandidate,
        _context: &str,
    ) -> CollaboratorResult<StrategicMetrics> {
        Err(unavailable("FailingEvaluator"))
    }
}

// ============================================================================
// Fixed Summarizer
// ============================================================================

/// Summarizer that always returns the same qualitative feedback.
pub struct FixedSummarizer {
    feedback: QualitativeFeedback,
}

impl FixedSummarizer {
    /// Always return `feedback`.
    pub fn new(feedback: QualitativeFeedback) -> Self {
        Self { feedback }
    }
}

#[async_trait]
impl FeedbackSummarizer for FixedSummarizer {
    async fn summarize(&self, _report: &str) -> CollaboratorResult<QualitativeFeedback> {
        Ok(self.feedback.clone())
    }
}

/// Summarizer whose every call fails; exercises the deterministic
/// threshold fallback in the feedback analyzer.
pub struct FailingSummarizer;

#[async_trait]
impl FeedbackSummarizer for FailingSummarizer {
    async fn summarize(&self, _report: &str) -> CollaboratorResult<QualitativeFeedback> {
        Err(unavailable("FailingSummarizer"))
    }
}

// ============================================================================
// Hash Embedder
// ============================================================================

/// Deterministic bag-of-tokens embedder.
///
/// Tokens are hashed into a fixed number of buckets and the bucket counts
/// are L2-normalized. Same text, same vector; similar texts share buckets
/// and score high cosine similarity. Good enough to exercise clustering
/// without a model.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    /// Create an embedder producing `dims`-length vectors.
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed_one(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dims;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> CollaboratorResult<Vec<Vec<f64>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
