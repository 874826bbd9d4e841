//! Candidate pool and per-candidate metadata.
//!
//! A [`StrategyCandidate`] is a structured multi-step plan produced by the
//! external generation collaborator. Candidates are immutable once generated;
//! refinement produces a new instance rather than mutating one in place.
//! Selection-time state (embedding, cluster label, trunk/twig marks) lives in
//! [`CandidateMetadata`] alongside each pooled candidate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Cluster label reserved for unclustered/noise candidates
pub const NOISE_LABEL: i64 = -1;

// ============================================================================
// Plan Steps
// ============================================================================

/// A single step of a strategy plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// What the step does
    pub action: String,
    /// Conditions that must hold before the step can run
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// What the step produces
    pub outcome: String,
    /// Known risks of the step
    #[serde(default)]
    pub risks: Vec<String>,
    /// Confidence in the step succeeding (0.0-1.0)
    #[serde(default = "default_step_confidence")]
    pub confidence: f64,
}

fn default_step_confidence() -> f64 {
    0.8
}

impl PlanStep {
    /// Create a new step from an action and its outcome
    pub fn new(action: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            prerequisites: Vec::new(),
            outcome: outcome.into(),
            risks: Vec::new(),
            confidence: default_step_confidence(),
        }
    }

    /// Set the prerequisites
    pub fn with_prerequisites(mut self, prerequisites: Vec<String>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    /// Set the risks
    pub fn with_risks(mut self, risks: Vec<String>) -> Self {
        self.risks = risks;
        self
    }

    /// Set the confidence, clamped to [0, 1]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

// ============================================================================
// Strategy Candidate
// ============================================================================

/// A complete multi-step strategy plan
///
/// `alignment_scores` uses a `BTreeMap` so iteration order, and therefore the
/// embedding text serialization, is deterministic for identical content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCandidate {
    /// Plan title
    pub title: String,
    /// Ordered steps of the plan
    pub steps: Vec<PlanStep>,
    /// Dimension name to numeric score
    #[serde(default)]
    pub alignment_scores: BTreeMap<String, f64>,
    /// Free-text timeline estimate
    #[serde(default)]
    pub estimated_timeline: String,
    /// Resources the plan requires
    #[serde(default)]
    pub resource_requirements: Vec<String>,
}

impl StrategyCandidate {
    /// Create a new candidate with a title and steps
    pub fn new(title: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            title: title.into(),
            steps,
            alignment_scores: BTreeMap::new(),
            estimated_timeline: String::new(),
            resource_requirements: Vec::new(),
        }
    }

    /// Set an alignment score for a dimension
    pub fn with_alignment(mut self, dimension: impl Into<String>, score: f64) -> Self {
        self.alignment_scores.insert(dimension.into(), score);
        self
    }

    /// Set the timeline estimate
    pub fn with_timeline(mut self, timeline: impl Into<String>) -> Self {
        self.estimated_timeline = timeline.into();
        self
    }

    /// Set the resource requirements
    pub fn with_resources(mut self, resources: Vec<String>) -> Self {
        self.resource_requirements = resources;
        self
    }
}

// ============================================================================
// Candidate Metadata
// ============================================================================

/// Selection-time metadata attached to a pooled candidate
///
/// Invariant: `is_trunk` and `is_twig` are never both true, and across one
/// selection run at most one candidate is marked trunk. The marking methods
/// below preserve the first half; the consensus selector owns the second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Index of the candidate within its generation batch
    pub source_index: usize,
    /// Sampling temperature used to generate the candidate
    pub temperature: f64,
    /// Embedding vector, populated by the embedding adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
    /// Cluster label assigned by the consensus selector; -1 = noise
    pub cluster_label: i64,
    /// Whether this candidate was selected as the consensus trunk
    pub is_trunk: bool,
    /// Whether this candidate was selected as an alternative twig
    pub is_twig: bool,
    /// Technique or domain tag used for grouped tournaments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technique: Option<String>,
}

impl CandidateMetadata {
    /// Create metadata for a freshly generated candidate
    pub fn new(source_index: usize, temperature: f64) -> Self {
        Self {
            source_index,
            temperature,
            embedding: None,
            cluster_label: NOISE_LABEL,
            is_trunk: false,
            is_twig: false,
            technique: None,
        }
    }

    /// Attach a technique tag
    pub fn with_technique(mut self, technique: impl Into<String>) -> Self {
        self.technique = Some(technique.into());
        self
    }

    /// Mark as trunk, clearing any twig mark
    pub fn mark_trunk(&mut self) {
        self.is_trunk = true;
        self.is_twig = false;
    }

    /// Mark as twig unless already trunk
    pub fn mark_twig(&mut self) {
        if !self.is_trunk {
            self.is_twig = true;
        }
    }

    /// Clear selection marks and cluster label
    pub fn reset_selection(&mut self) {
        self.cluster_label = NOISE_LABEL;
        self.is_trunk = false;
        self.is_twig = false;
    }
}

// ============================================================================
// Candidate Pool
// ============================================================================

/// A candidate together with its selection metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PooledCandidate {
    /// The plan itself
    pub candidate: StrategyCandidate,
    /// Selection-time metadata
    pub meta: CandidateMetadata,
}

/// In-memory collection of generated candidates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatePool {
    items: Vec<PooledCandidate>,
}

impl CandidatePool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from bare candidates, assigning sequential source indices
    pub fn from_candidates(candidates: Vec<StrategyCandidate>, temperature: f64) -> Self {
        let items = candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| PooledCandidate {
                candidate,
                meta: CandidateMetadata::new(i, temperature),
            })
            .collect();
        Self { items }
    }

    /// Add a candidate with its metadata
    pub fn push(&mut self, candidate: StrategyCandidate, meta: CandidateMetadata) {
        self.items.push(PooledCandidate { candidate, meta });
    }

    /// Number of candidates in the pool
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Borrow a pooled candidate by index
    pub fn get(&self, index: usize) -> Option<&PooledCandidate> {
        self.items.get(index)
    }

    /// Mutably borrow a pooled candidate by index
    pub fn get_mut(&mut self, index: usize) -> Option<&mut PooledCandidate> {
        self.items.get_mut(index)
    }

    /// Iterate over pooled candidates
    pub fn iter(&self) -> impl Iterator<Item = &PooledCandidate> {
        self.items.iter()
    }

    /// Iterate mutably over pooled candidates
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PooledCandidate> {
        self.items.iter_mut()
    }

    /// Borrow the candidates without metadata
    pub fn candidates(&self) -> Vec<&StrategyCandidate> {
        self.items.iter().map(|p| &p.candidate).collect()
    }

    /// Indices of candidates that have an embedding
    pub fn embedded_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, p)| p.meta.embedding.is_some())
            .map(|(i, _)| i)
            .collect()
    }
}
