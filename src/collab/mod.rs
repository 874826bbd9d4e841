//! Capability interfaces for external collaborators.
//!
//! The pipeline core never talks to a model directly; every external
//! dependency is a capability trait with two implementations chosen by the
//! caller:
//!
//! - [`http::PipeGateway`]: live HTTP-backed collaborators
//! - [`fixed`]: deterministic doubles for tests and offline runs
//!
//! This keeps test/live selection explicit instead of sniffing types at
//! runtime.

pub mod fixed;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::candidate::StrategyCandidate;
use crate::error::CollaboratorResult;
use crate::metrics::StrategicMetrics;

// ============================================================================
// Judgment Types
// ============================================================================

/// Which side of a pairwise comparison was preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    /// The first candidate of the pairing
    First,
    /// The second candidate of the pairing
    Second,
}

impl Preference {
    /// Wire representation: 1 for first, 2 for second.
    pub fn as_u8(&self) -> u8 {
        match self {
            Preference::First => 1,
            Preference::Second => 2,
        }
    }

    /// Parse the wire representation.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Preference::First),
            2 => Some(Preference::Second),
            _ => None,
        }
    }
}

/// A single pairwise judgment with its rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseJudgment {
    /// Preferred side of the pairing
    pub preference: Preference,
    /// Free-text rationale from the judge
    #[serde(default)]
    pub rationale: String,
}

// ============================================================================
// Qualitative Feedback
// ============================================================================

/// Qualitative summary returned by the feedback collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitativeFeedback {
    /// Observed strengths
    pub strengths: Vec<String>,
    /// Observed weaknesses
    pub weaknesses: Vec<String>,
    /// One-paragraph overall assessment
    #[serde(default)]
    pub overall_assessment: String,
    /// Collaborator confidence in the summary (0.0-1.0)
    #[serde(default)]
    pub confidence: f64,
    /// Dimensions most in need of attention
    #[serde(default)]
    pub priority_areas: Vec<String>,
}

// ============================================================================
// Capability Traits
// ============================================================================

/// Produces a strategy candidate from a prompt at a sampling temperature.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a candidate. Retryable; callers own the retry policy.
    async fn generate(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> CollaboratorResult<StrategyCandidate>;
}

/// Compares two candidates and states a preference.
#[async_trait]
pub trait PairwiseJudge: Send + Sync {
    /// Judge one pairing in the given context.
    async fn compare(
        &self,
        first: &StrategyCandidate,
        second: &StrategyCandidate,
        context: &str,
    ) -> CollaboratorResult<PairwiseJudgment>;
}

/// Scores a candidate along the five strategic dimensions.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluate a candidate in the given context.
    async fn evaluate(
        &self,
        candidate: &StrategyCandidate,
        context: &str,
    ) -> CollaboratorResult<StrategicMetrics>;
}

/// Summarizes a formatted metrics report into qualitative feedback.
#[async_trait]
pub trait FeedbackSummarizer: Send + Sync {
    /// Summarize the report.
    async fn summarize(&self, report: &str) -> CollaboratorResult<QualitativeFeedback>;
}

/// Embeds candidate texts into fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed each text; the result preserves input order and length.
    async fn embed(&self, texts: &[String]) -> CollaboratorResult<Vec<Vec<f64>>>;
}
