//! Multi-generation performance tracking.
//!
//! The tracker keeps a capped, append-only history of
//! [`RefinementMetrics`] snapshots per strategy lineage and derives the
//! cross-generation quantities (improvement, convergence, velocity, trend,
//! ROI) at record time. Snapshots are never mutated after recording; the
//! oldest is evicted once a lineage exceeds the cap.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::{
    PerformanceTrend, RefinementId, RefinementMetrics, StrategicMetrics, StrategyId,
};

/// Weights for the compliance composite:
/// coherence, risk management, domain alignment, resource efficiency, feasibility
pub const COMPLIANCE_WEIGHTS: [f64; 5] = [0.25, 0.25, 0.20, 0.15, 0.15];

/// Assumed maximum variance on a 0-10 score scale, for convergence scaling
const MAX_SCORE_VARIANCE: f64 = 25.0;

// ============================================================================
// Statistics Helpers
// ============================================================================

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Least-squares slope of `values` against their indices.
fn slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    if values.len() < 2 {
        return 0.0;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut covariance = 0.0;
    let mut x_variance = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        covariance += dx * (y - y_mean);
        x_variance += dx * dx;
    }
    if x_variance == 0.0 {
        return 0.0;
    }
    covariance / x_variance
}

// ============================================================================
// Session Summary
// ============================================================================

/// Aggregate view over one strategy lineage's recorded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Highest overall score recorded
    pub best_score: f64,
    /// Mean overall score across the history
    pub average_score: f64,
    /// Overall score of the latest snapshot
    pub latest_score: f64,
    /// Trend of the latest snapshot
    pub latest_trend: PerformanceTrend,
    /// Compliance score of the latest snapshot
    pub latest_compliance: f64,
    /// Evolution velocity of the latest snapshot
    pub latest_velocity: f64,
    /// Seconds between the first and last recorded snapshot
    pub time_span_secs: i64,
    /// Number of snapshots retained
    pub snapshot_count: usize,
}

// ============================================================================
// Performance Tracker
// ============================================================================

/// Records per-generation snapshots and derives cross-generation metrics.
pub struct PerformanceTracker {
    histories: HashMap<StrategyId, Vec<RefinementMetrics>>,
    history_cap: usize,
}

impl PerformanceTracker {
    /// Create a tracker with the given per-lineage history cap.
    pub fn new(history_cap: usize) -> Self {
        Self {
            histories: HashMap::new(),
            history_cap: history_cap.max(1),
        }
    }

    /// Record one generation's evaluation and derive its snapshot.
    ///
    /// `refinement_cost` is the cost attributed to producing this
    /// generation; it only feeds the ROI estimate.
    pub fn record_performance(
        &mut self,
        strategy_id: &StrategyId,
        strategic: StrategicMetrics,
        generation: u32,
        refinement_cost: f64,
    ) -> RefinementMetrics {
        let history = self.histories.entry(strategy_id.clone()).or_default();
        let current_overall = strategic.overall_score;

        let improvement_score = improvement(history, generation, current_overall);
        let convergence_indicator = convergence(history, current_overall);
        let compliance_score = compliance(&strategic);
        let evolution_velocity = velocity(history, generation, improvement_score);
        let (performance_trend, trend_confidence) = trend(history, current_overall);
        let roi_estimate = roi(improvement_score, refinement_cost);

        let snapshot = RefinementMetrics {
            refinement_id: RefinementId::new(),
            strategy_id: strategy_id.clone(),
            generation,
            timestamp: Utc::now(),
            strategic,
            improvement_score,
            convergence_indicator,
            compliance_score,
            recursive_depth: generation,
            evolution_velocity,
            performance_trend,
            trend_confidence,
            refinement_cost: refinement_cost.max(0.0),
            roi_estimate,
        };

        history.push(snapshot.clone());
        if history.len() > self.history_cap {
            history.remove(0);
        }

        debug!(
            strategy = %strategy_id,
            generation,
            overall = current_overall,
            improvement = improvement_score,
            convergence = convergence_indicator,
            trend = %snapshot.performance_trend,
            "Recorded performance snapshot"
        );

        snapshot
    }

    /// Recorded history for a lineage, oldest first.
    pub fn history(&self, strategy_id: &StrategyId) -> &[RefinementMetrics] {
        self.histories
            .get(strategy_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Summarize a lineage's history; `None` if nothing was recorded.
    pub fn session_summary(&self, strategy_id: &StrategyId) -> Option<SessionSummary> {
        let history = self.histories.get(strategy_id)?;
        let latest = history.last()?;
        let scores: Vec<f64> = history.iter().map(|m| m.strategic.overall_score).collect();

        Some(SessionSummary {
            best_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            average_score: mean(&scores),
            latest_score: latest.strategic.overall_score,
            latest_trend: latest.performance_trend,
            latest_compliance: latest.compliance_score,
            latest_velocity: latest.evolution_velocity,
            time_span_secs: (latest.timestamp - history[0].timestamp).num_seconds(),
            snapshot_count: history.len(),
        })
    }
}

// ============================================================================
// Derived Quantities
// ============================================================================

fn improvement(history: &[RefinementMetrics], generation: u32, current: f64) -> f64 {
    if generation == 0 {
        return 0.0;
    }
    let previous = history
        .iter()
        .rev()
        .find(|m| m.generation == generation - 1)
        .map(|m| m.strategic.overall_score);
    match previous {
        Some(prev) if prev == 0.0 => {
            if current > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Some(prev) => ((current - prev) / prev).clamp(-1.0, 1.0),
        None => 0.0,
    }
}

fn convergence(history: &[RefinementMetrics], current: f64) -> f64 {
    if history.len() < 3 {
        return 0.0;
    }
    let mut scores: Vec<f64> = history.iter().map(|m| m.strategic.overall_score).collect();
    scores.push(current);
    let window = &scores[scores.len().saturating_sub(5)..];

    if window.iter().all(|&s| s == window[0]) {
        return 1.0;
    }
    (1.0 - variance(window) / MAX_SCORE_VARIANCE).clamp(0.0, 1.0)
}

fn compliance(strategic: &StrategicMetrics) -> f64 {
    (COMPLIANCE_WEIGHTS[0] * strategic.coherence
        + COMPLIANCE_WEIGHTS[1] * strategic.risk_management
        + COMPLIANCE_WEIGHTS[2] * strategic.domain_alignment
        + COMPLIANCE_WEIGHTS[3] * strategic.resource_efficiency
        + COMPLIANCE_WEIGHTS[4] * strategic.feasibility)
        / 10.0
}

fn velocity(history: &[RefinementMetrics], generation: u32, current_improvement: f64) -> f64 {
    if generation == 0 {
        return 0.0;
    }
    let mut improvements: Vec<f64> = history.iter().map(|m| m.improvement_score).collect();
    improvements.push(current_improvement);
    let window = &improvements[improvements.len().saturating_sub(5)..];

    (mean(window) * (1.0 + 1.0 / generation as f64)).clamp(-1.0, 1.0)
}

fn trend(history: &[RefinementMetrics], current: f64) -> (PerformanceTrend, f64) {
    let mut scores: Vec<f64> = history.iter().map(|m| m.strategic.overall_score).collect();
    scores.push(current);
    let window = &scores[scores.len().saturating_sub(10)..];

    if window.len() < 3 {
        return (PerformanceTrend::Stable, 0.0);
    }

    let confidence = (1.0 - variance(window) / 10.0).clamp(0.0, 1.0);
    let s = slope(window);

    let classification = if s.abs() < 0.05 {
        PerformanceTrend::Stable
    } else if s > 0.15 {
        PerformanceTrend::Improving
    } else if s < -0.15 {
        PerformanceTrend::Degrading
    } else {
        let ups = window.windows(2).filter(|w| w[1] > w[0]).count() as i64;
        let downs = window.windows(2).filter(|w| w[1] < w[0]).count() as i64;
        if (ups - downs).abs() <= 1 {
            PerformanceTrend::Oscillating
        } else if s > 0.0 {
            PerformanceTrend::Improving
        } else {
            PerformanceTrend::Degrading
        }
    };

    (classification, confidence)
}

fn roi(improvement_score: f64, cost: f64) -> f64 {
    let raw = if cost <= 0.0 {
        improvement_score * 10.0
    } else {
        improvement_score * 100.0 / cost
    };
    raw.clamp(-10.0, 10.0)
}
