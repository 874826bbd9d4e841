//! Metric types for strategy evaluation and refinement tracking.
//!
//! [`StrategicMetrics`] is the five-dimension quality assessment returned by
//! the external evaluation collaborator. [`RefinementMetrics`] is the
//! per-generation snapshot derived from it by the performance tracker;
//! snapshots are created once, appended to a bounded history, and never
//! mutated afterward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed weights for the overall score:
/// coherence, feasibility, domain alignment, risk management, resource efficiency
pub const OVERALL_WEIGHTS: [f64; 5] = [0.25, 0.25, 0.20, 0.15, 0.15];

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for one refinement snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RefinementId(pub String);

impl RefinementId {
    /// Create a new unique refinement ID.
    pub fn new() -> Self {
        Self(format!("refine_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for RefinementId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RefinementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a strategy lineage across generations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StrategyId(pub String);

impl StrategyId {
    /// Create a new unique strategy ID.
    pub fn new() -> Self {
        Self(format!("strategy_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for StrategyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Strategic Metrics
// ============================================================================

/// Five-dimension quality assessment, each sub-score on a 0-10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicMetrics {
    /// Logical coherence of the plan
    pub coherence: f64,
    /// How realistic the plan is to execute
    pub feasibility: f64,
    /// Fit with the problem domain
    pub domain_alignment: f64,
    /// Quality of risk identification and mitigation
    pub risk_management: f64,
    /// Economy of the required resources
    pub resource_efficiency: f64,
    /// Fixed-weight linear combination of the sub-scores
    pub overall_score: f64,
}

impl StrategicMetrics {
    /// Create metrics from sub-scores, clamping each to [0, 10] and
    /// computing the overall score.
    pub fn new(
        coherence: f64,
        feasibility: f64,
        domain_alignment: f64,
        risk_management: f64,
        resource_efficiency: f64,
    ) -> Self {
        let coherence = coherence.clamp(0.0, 10.0);
        let feasibility = feasibility.clamp(0.0, 10.0);
        let domain_alignment = domain_alignment.clamp(0.0, 10.0);
        let risk_management = risk_management.clamp(0.0, 10.0);
        let resource_efficiency = resource_efficiency.clamp(0.0, 10.0);

        let overall_score = OVERALL_WEIGHTS[0] * coherence
            + OVERALL_WEIGHTS[1] * feasibility
            + OVERALL_WEIGHTS[2] * domain_alignment
            + OVERALL_WEIGHTS[3] * risk_management
            + OVERALL_WEIGHTS[4] * resource_efficiency;

        Self {
            coherence,
            feasibility,
            domain_alignment,
            risk_management,
            resource_efficiency,
            overall_score,
        }
    }

    /// Neutral mid-scale metrics, used when an evaluation call fails.
    pub fn neutral() -> Self {
        Self::new(5.0, 5.0, 5.0, 5.0, 5.0)
    }

    /// Sub-scores in declaration order.
    pub fn sub_scores(&self) -> [f64; 5] {
        [
            self.coherence,
            self.feasibility,
            self.domain_alignment,
            self.risk_management,
            self.resource_efficiency,
        ]
    }
}

// ============================================================================
// Performance Trend
// ============================================================================

/// Direction of recent score evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTrend {
    /// Scores are flat
    Stable,
    /// Scores are rising
    Improving,
    /// Scores are falling
    Degrading,
    /// Scores alternate up and down
    Oscillating,
}

impl PerformanceTrend {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceTrend::Stable => "stable",
            PerformanceTrend::Improving => "improving",
            PerformanceTrend::Degrading => "degrading",
            PerformanceTrend::Oscillating => "oscillating",
        }
    }
}

impl std::fmt::Display for PerformanceTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PerformanceTrend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stable" => Ok(PerformanceTrend::Stable),
            "improving" => Ok(PerformanceTrend::Improving),
            "degrading" => Ok(PerformanceTrend::Degrading),
            "oscillating" => Ok(PerformanceTrend::Oscillating),
            _ => Err(format!("Unknown performance trend: {}", s)),
        }
    }
}

// ============================================================================
// Refinement Metrics
// ============================================================================

/// Per-generation snapshot recorded by the performance tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementMetrics {
    /// Unique snapshot identifier
    pub refinement_id: RefinementId,
    /// Strategy lineage this snapshot belongs to
    pub strategy_id: StrategyId,
    /// Generation index; 0 = original candidate
    pub generation: u32,
    /// When the snapshot was recorded
    pub timestamp: DateTime<Utc>,
    /// Strategic quality assessment for this generation
    pub strategic: StrategicMetrics,
    /// Clipped relative change of overall score versus the previous
    /// generation, in [-1, 1]; 0 for generation 0
    pub improvement_score: f64,
    /// Normalized inverse variance of recent scores, in [0, 1]
    pub convergence_indicator: f64,
    /// Weighted composite of the five sub-scores, in [0, 1]
    pub compliance_score: f64,
    /// Equal to generation
    pub recursive_depth: u32,
    /// Momentum of recent improvements, in [-1, 1]
    pub evolution_velocity: f64,
    /// Direction of recent score evolution
    pub performance_trend: PerformanceTrend,
    /// Confidence in the trend classification, in [0, 1]
    pub trend_confidence: f64,
    /// Cost attributed to producing this generation
    pub refinement_cost: f64,
    /// Improvement per unit cost, clipped to [-10, 10]
    pub roi_estimate: f64,
}
