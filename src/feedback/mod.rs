//! Feedback analysis over refinement metrics.
//!
//! The analyzer turns the latest snapshot plus history into a
//! [`FeedbackAnalysis`]: strengths/weaknesses, convergence flags, a
//! compliance trend, a ranked list of improvement suggestions, and a
//! stop/continue decision. Strengths and weaknesses come from the external
//! summarization collaborator when it answers; on failure a deterministic
//! threshold fallback takes over so analysis never fails outright.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collab::FeedbackSummarizer;
use crate::config::RefinementConfig;
use crate::metrics::{PerformanceTrend, RefinementMetrics};

/// Sub-score below which a category gets an improvement suggestion
const SUGGESTION_THRESHOLD: f64 = 7.0;
/// Fallback sub-score threshold for a strength
const STRENGTH_THRESHOLD: f64 = 7.5;
/// Fallback sub-score threshold for a weakness
const WEAKNESS_THRESHOLD: f64 = 5.0;
/// Convergence indicator above which the loop is considered converging
const CONVERGING_THRESHOLD: f64 = 0.6;
/// Trend confidence above which a degrading trend stops the loop
const DEGRADING_CONFIDENCE: f64 = 0.7;
/// ROI below which refinement is judged not worth continuing
const ROI_FLOOR: f64 = -1.0;
/// Suggestions kept after ranking by priority
const MAX_SUGGESTIONS: usize = 5;

// ============================================================================
// Suggestions
// ============================================================================

/// Quality dimension a suggestion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCategory {
    /// Logical chaining between steps
    Coherence,
    /// Realism of effort and timing
    Feasibility,
    /// Risk identification and mitigation
    RiskManagement,
    /// Economy and specificity of resources
    ResourceEfficiency,
    /// Fit with the problem domain
    DomainAlignment,
}

impl SuggestionCategory {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionCategory::Coherence => "coherence",
            SuggestionCategory::Feasibility => "feasibility",
            SuggestionCategory::RiskManagement => "risk_management",
            SuggestionCategory::ResourceEfficiency => "resource_efficiency",
            SuggestionCategory::DomainAlignment => "domain_alignment",
        }
    }
}

impl std::fmt::Display for SuggestionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One concrete refinement recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    /// Dimension the suggestion targets
    pub category: SuggestionCategory,
    /// Ranking weight, in [0, 1]
    pub priority: f64,
    /// Expected score impact if applied, in [0, 1]
    pub expected_impact: f64,
    /// Estimated effort to apply, in [0, 1]
    pub implementation_effort: f64,
    /// Confidence the suggestion helps, in [0, 1]
    pub confidence: f64,
    /// Human-readable summary
    pub description: String,
    /// Concrete edits to make
    pub specific_changes: Vec<String>,
}

/// Fixed catalog entry for a category: (priority, impact, effort, confidence,
/// description, changes)
fn catalog_entry(category: SuggestionCategory) -> ImprovementSuggestion {
    let (priority, expected_impact, implementation_effort, confidence, description, changes): (
        f64,
        f64,
        f64,
        f64,
        &str,
        &[&str],
    ) = match category {
        SuggestionCategory::Coherence => (
            0.9,
            0.8,
            0.6,
            0.85,
            "Tighten the logical chain between steps",
            &[
                "Add explicit prerequisites linking each step to the previous outcome",
                "Reorder steps so outcomes precede the steps that depend on them",
                "State one measurable outcome per step",
            ],
        ),
        SuggestionCategory::RiskManagement => (
            0.85,
            0.75,
            0.5,
            0.8,
            "Identify and mitigate per-step risks",
            &[
                "List at least one concrete risk per step",
                "Add a mitigation or fallback for each identified risk",
            ],
        ),
        SuggestionCategory::Feasibility => (
            0.8,
            0.7,
            0.55,
            0.75,
            "Ground the plan in realistic effort and timing",
            &[
                "Re-estimate the timeline against the listed resources",
                "Split low-confidence steps into smaller verifiable steps",
            ],
        ),
        SuggestionCategory::DomainAlignment => (
            0.7,
            0.65,
            0.6,
            0.7,
            "Align every step with the problem domain",
            &[
                "Tie each step to a stated domain objective",
                "Drop steps that do not serve the problem domain",
            ],
        ),
        SuggestionCategory::ResourceEfficiency => (
            0.6,
            0.6,
            0.4,
            0.7,
            "Make resource requirements specific and lean",
            &[
                "Name the specific skill set each resource line requires",
                "Consolidate overlapping resource requirements",
            ],
        ),
    };

    ImprovementSuggestion {
        category,
        priority,
        expected_impact,
        implementation_effort,
        confidence,
        description: description.to_string(),
        specific_changes: changes.iter().map(|c| c.to_string()).collect(),
    }
}

// ============================================================================
// Analysis Result
// ============================================================================

/// Why the analyzer recommends stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopSignal {
    /// Convergence indicator crossed the configured threshold
    Converged,
    /// Generation count reached the configured maximum
    MaxGenerationsReached,
    /// Confidently degrading trend
    DegradingTrend,
    /// ROI fell below the floor
    NegativeRoi,
    /// Overall score crossed the quality target
    QualityTargetReached,
}

/// Full output of one analysis pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    /// Observed strengths
    pub strengths: Vec<String>,
    /// Observed weaknesses
    pub weaknesses: Vec<String>,
    /// Convergence indicator above the converging threshold
    pub is_converging: bool,
    /// Convergence indicator above the configured stop threshold
    pub is_highly_converged: bool,
    /// Direction of recent compliance scores
    pub compliance_trend: PerformanceTrend,
    /// Suggestions ranked by priority, highest first
    pub suggestions: Vec<ImprovementSuggestion>,
    /// Recommendation to stop, if any condition held
    pub stop: Option<StopSignal>,
    /// Urgency of further refinement, in [0, 1]; 0.0 when stopping
    pub refinement_priority: f64,
}

impl FeedbackAnalysis {
    /// Whether the analyzer recommends ending the session.
    pub fn should_stop(&self) -> bool {
        self.stop.is_some()
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// Produces [`FeedbackAnalysis`] from snapshots and history.
pub struct FeedbackAnalyzer {
    summarizer: Arc<dyn FeedbackSummarizer>,
    config: RefinementConfig,
}

impl FeedbackAnalyzer {
    /// Create an analyzer over the given summarizer.
    pub fn new(summarizer: Arc<dyn FeedbackSummarizer>, config: RefinementConfig) -> Self {
        Self { summarizer, config }
    }

    /// Analyze the current snapshot against prior history.
    pub async fn analyze(
        &self,
        current: &RefinementMetrics,
        history: &[RefinementMetrics],
    ) -> FeedbackAnalysis {
        let (strengths, weaknesses) = self.strengths_and_weaknesses(current, history).await;
        let suggestions = self.suggestions_for(current);
        let stop = self.stop_signal(current);

        let refinement_priority = if stop.is_some() {
            0.0
        } else {
            refinement_priority(current, suggestions.len())
        };

        FeedbackAnalysis {
            strengths,
            weaknesses,
            is_converging: current.convergence_indicator > CONVERGING_THRESHOLD,
            is_highly_converged: current.convergence_indicator
                > self.config.convergence_threshold,
            compliance_trend: compliance_trend(current, history),
            suggestions,
            stop,
            refinement_priority,
        }
    }

    async fn strengths_and_weaknesses(
        &self,
        current: &RefinementMetrics,
        history: &[RefinementMetrics],
    ) -> (Vec<String>, Vec<String>) {
        let report = format_metrics_report(current, history);
        match self.summarizer.summarize(&report).await {
            Ok(feedback) => {
                debug!(
                    strengths = feedback.strengths.len(),
                    weaknesses = feedback.weaknesses.len(),
                    "Summarizer produced qualitative feedback"
                );
                (feedback.strengths, feedback.weaknesses)
            }
            Err(e) => {
                warn!(error = %e, "Summarizer failed; using threshold fallback");
                threshold_feedback(current)
            }
        }
    }

    fn suggestions_for(&self, current: &RefinementMetrics) -> Vec<ImprovementSuggestion> {
        let scored = [
            (SuggestionCategory::Coherence, current.strategic.coherence),
            (SuggestionCategory::Feasibility, current.strategic.feasibility),
            (
                SuggestionCategory::RiskManagement,
                current.strategic.risk_management,
            ),
            (
                SuggestionCategory::ResourceEfficiency,
                current.strategic.resource_efficiency,
            ),
            (
                SuggestionCategory::DomainAlignment,
                current.strategic.domain_alignment,
            ),
        ];

        let mut suggestions: Vec<ImprovementSuggestion> = scored
            .into_iter()
            .filter(|(_, score)| *score < SUGGESTION_THRESHOLD)
            .map(|(category, _)| catalog_entry(category))
            .collect();
        suggestions.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }

    fn stop_signal(&self, current: &RefinementMetrics) -> Option<StopSignal> {
        if current.convergence_indicator > self.config.convergence_threshold {
            return Some(StopSignal::Converged);
        }
        if current.generation >= self.config.max_generations {
            return Some(StopSignal::MaxGenerationsReached);
        }
        if current.performance_trend == PerformanceTrend::Degrading
            && current.trend_confidence > DEGRADING_CONFIDENCE
        {
            return Some(StopSignal::DegradingTrend);
        }
        if current.roi_estimate < ROI_FLOOR {
            return Some(StopSignal::NegativeRoi);
        }
        if current.strategic.overall_score > self.config.quality_target {
            return Some(StopSignal::QualityTargetReached);
        }
        None
    }
}

// ============================================================================
// Derivations
// ============================================================================

const DIMENSION_NAMES: [&str; 5] = [
    "coherence",
    "feasibility",
    "domain alignment",
    "risk management",
    "resource efficiency",
];

fn threshold_feedback(current: &RefinementMetrics) -> (Vec<String>, Vec<String>) {
    let mut strengths = Vec::new();
    let mut weaknesses = Vec::new();
    for (name, score) in DIMENSION_NAMES.iter().zip(current.strategic.sub_scores()) {
        if score >= STRENGTH_THRESHOLD {
            strengths.push(format!("Strong {} ({:.1}/10)", name, score));
        } else if score <= WEAKNESS_THRESHOLD {
            weaknesses.push(format!("Weak {} ({:.1}/10)", name, score));
        }
    }
    (strengths, weaknesses)
}

fn compliance_trend(current: &RefinementMetrics, history: &[RefinementMetrics]) -> PerformanceTrend {
    let mut scores: Vec<f64> = history.iter().map(|m| m.compliance_score).collect();
    scores.push(current.compliance_score);
    let window = &scores[scores.len().saturating_sub(5)..];
    if window.len() < 2 {
        return PerformanceTrend::Stable;
    }

    let n = window.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = window.iter().sum::<f64>() / n;
    let mut covariance = 0.0;
    let mut x_variance = 0.0;
    for (i, &y) in window.iter().enumerate() {
        let dx = i as f64 - x_mean;
        covariance += dx * (y - y_mean);
        x_variance += dx * dx;
    }
    let slope = covariance / x_variance;

    if slope > 0.05 {
        PerformanceTrend::Improving
    } else if slope < -0.05 {
        PerformanceTrend::Degrading
    } else {
        PerformanceTrend::Stable
    }
}

fn refinement_priority(current: &RefinementMetrics, suggestion_count: usize) -> f64 {
    let factors = [
        current.improvement_score.clamp(0.0, 1.0),
        (1.0 - current.convergence_indicator).clamp(0.0, 1.0),
        (current.roi_estimate / 10.0).clamp(0.0, 1.0),
        (suggestion_count as f64 / MAX_SUGGESTIONS as f64).clamp(0.0, 1.0),
        ((10.0 - current.strategic.overall_score) / 10.0).clamp(0.0, 1.0),
    ];
    factors.iter().sum::<f64>() / factors.len() as f64
}

/// Render the report handed to the summarization collaborator.
pub fn format_metrics_report(
    current: &RefinementMetrics,
    history: &[RefinementMetrics],
) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "# Strategy Performance Report");
    let _ = writeln!(report);
    let _ = writeln!(report, "Generation: {}", current.generation);
    let _ = writeln!(
        report,
        "Overall score: {:.2}/10",
        current.strategic.overall_score
    );
    for (name, score) in DIMENSION_NAMES.iter().zip(current.strategic.sub_scores()) {
        let _ = writeln!(report, "- {}: {:.2}/10", name, score);
    }
    let _ = writeln!(report);
    let _ = writeln!(
        report,
        "Improvement: {:+.3}  Convergence: {:.3}  Compliance: {:.3}",
        current.improvement_score, current.convergence_indicator, current.compliance_score
    );
    let _ = writeln!(
        report,
        "Trend: {} (confidence {:.2})  Velocity: {:+.3}  ROI: {:+.2}",
        current.performance_trend,
        current.trend_confidence,
        current.evolution_velocity,
        current.roi_estimate
    );

    if !history.is_empty() {
        let _ = writeln!(report);
        let _ = writeln!(report, "## Score history");
        for snapshot in history {
            let _ = writeln!(
                report,
                "- generation {}: {:.2}",
                snapshot.generation, snapshot.strategic.overall_score
            );
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::fixed::{FailingSummarizer, FixedSummarizer};
    use crate::collab::QualitativeFeedback;
    use crate::metrics::{RefinementId, StrategicMetrics, StrategyId};
    use chrono::Utc;

    fn snapshot(strategic: StrategicMetrics, generation: u32) -> RefinementMetrics {
        RefinementMetrics {
            refinement_id: RefinementId::new(),
            strategy_id: StrategyId::new(),
            generation,
            timestamp: Utc::now(),
            strategic,
            improvement_score: 0.1,
            convergence_indicator: 0.2,
            compliance_score: 0.6,
            recursive_depth: generation,
            evolution_velocity: 0.05,
            performance_trend: PerformanceTrend::Stable,
            trend_confidence: 0.5,
            refinement_cost: 1.0,
            roi_estimate: 2.0,
        }
    }

    fn analyzer_with(summarizer: Arc<dyn FeedbackSummarizer>) -> FeedbackAnalyzer {
        FeedbackAnalyzer::new(summarizer, RefinementConfig::default())
    }

    #[tokio::test]
    async fn test_fallback_thresholds() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let current = snapshot(StrategicMetrics::new(8.0, 4.0, 6.0, 7.5, 5.0), 1);
        let analysis = analyzer.analyze(&current, &[]).await;

        assert_eq!(analysis.strengths.len(), 2); // coherence 8.0, risk 7.5
        assert_eq!(analysis.weaknesses.len(), 2); // feasibility 4.0, resource 5.0
        assert!(analysis.strengths[0].contains("coherence"));
    }

    #[tokio::test]
    async fn test_summarizer_output_preferred() {
        let feedback = QualitativeFeedback {
            strengths: vec!["clear sequencing".to_string()],
            weaknesses: vec!["thin risk coverage".to_string()],
            overall_assessment: "solid".to_string(),
            confidence: 0.9,
            priority_areas: vec![],
        };
        let analyzer = analyzer_with(Arc::new(FixedSummarizer::new(feedback)));
        let current = snapshot(StrategicMetrics::neutral(), 1);
        let analysis = analyzer.analyze(&current, &[]).await;

        assert_eq!(analysis.strengths, vec!["clear sequencing"]);
        assert_eq!(analysis.weaknesses, vec!["thin risk coverage"]);
    }

    #[tokio::test]
    async fn test_suggestions_for_low_sub_scores() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        // Only coherence and risk management fall below 7.0
        let current = snapshot(StrategicMetrics::new(6.0, 8.0, 8.0, 5.0, 8.0), 1);
        let analysis = analyzer.analyze(&current, &[]).await;

        let categories: Vec<SuggestionCategory> =
            analysis.suggestions.iter().map(|s| s.category).collect();
        assert_eq!(
            categories,
            vec![
                SuggestionCategory::Coherence,
                SuggestionCategory::RiskManagement
            ]
        );
        assert!(analysis.suggestions[0].priority >= analysis.suggestions[1].priority);
        assert!(!analysis.suggestions[0].specific_changes.is_empty());
    }

    #[tokio::test]
    async fn test_no_suggestions_when_all_scores_high() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let current = snapshot(StrategicMetrics::new(8.0, 8.0, 8.0, 8.0, 8.0), 1);
        let analysis = analyzer.analyze(&current, &[]).await;
        assert!(analysis.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_stop_on_convergence() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let mut current = snapshot(StrategicMetrics::neutral(), 1);
        current.convergence_indicator = 0.95;
        let analysis = analyzer.analyze(&current, &[]).await;

        assert_eq!(analysis.stop, Some(StopSignal::Converged));
        assert!(analysis.is_highly_converged);
        assert_eq!(analysis.refinement_priority, 0.0);
    }

    #[tokio::test]
    async fn test_stop_on_max_generations() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let current = snapshot(StrategicMetrics::neutral(), 5);
        let analysis = analyzer.analyze(&current, &[]).await;
        assert_eq!(analysis.stop, Some(StopSignal::MaxGenerationsReached));
    }

    #[tokio::test]
    async fn test_stop_on_confident_degradation() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let mut current = snapshot(StrategicMetrics::neutral(), 1);
        current.performance_trend = PerformanceTrend::Degrading;
        current.trend_confidence = 0.8;
        let analysis = analyzer.analyze(&current, &[]).await;
        assert_eq!(analysis.stop, Some(StopSignal::DegradingTrend));
    }

    #[tokio::test]
    async fn test_no_stop_on_unconfident_degradation() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let mut current = snapshot(StrategicMetrics::neutral(), 1);
        current.performance_trend = PerformanceTrend::Degrading;
        current.trend_confidence = 0.5;
        let analysis = analyzer.analyze(&current, &[]).await;
        assert_eq!(analysis.stop, None);
    }

    #[tokio::test]
    async fn test_stop_on_negative_roi() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let mut current = snapshot(StrategicMetrics::neutral(), 1);
        current.roi_estimate = -2.0;
        let analysis = analyzer.analyze(&current, &[]).await;
        assert_eq!(analysis.stop, Some(StopSignal::NegativeRoi));
    }

    #[tokio::test]
    async fn test_stop_on_quality_target() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let current = snapshot(StrategicMetrics::new(9.5, 9.5, 9.5, 9.5, 9.5), 1);
        let analysis = analyzer.analyze(&current, &[]).await;
        assert_eq!(analysis.stop, Some(StopSignal::QualityTargetReached));
    }

    #[tokio::test]
    async fn test_refinement_priority_factors() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let mut current = snapshot(StrategicMetrics::new(6.0, 8.0, 8.0, 5.0, 8.0), 1);
        current.improvement_score = 0.5;
        current.convergence_indicator = 0.4;
        current.roi_estimate = 5.0;
        let analysis = analyzer.analyze(&current, &[]).await;

        // overall = 0.25*6 + 0.25*8 + 0.2*8 + 0.15*5 + 0.15*8 = 7.05
        // factors: 0.5, 0.6, 0.5, 2/5, (10-7.05)/10
        let expected = (0.5 + 0.6 + 0.5 + 0.4 + 0.295) / 5.0;
        assert!((analysis.refinement_priority - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_compliance_trend_improving() {
        let analyzer = analyzer_with(Arc::new(FailingSummarizer));
        let mut history = Vec::new();
        for (generation, compliance) in [0.4, 0.5, 0.6].iter().enumerate() {
            let mut s = snapshot(StrategicMetrics::neutral(), generation as u32);
            s.compliance_score = *compliance;
            history.push(s);
        }
        let mut current = snapshot(StrategicMetrics::neutral(), 3);
        current.compliance_score = 0.7;

        let analysis = analyzer.analyze(&current, &history).await;
        assert_eq!(analysis.compliance_trend, PerformanceTrend::Improving);
    }

    #[test]
    fn test_report_contains_history() {
        let history = vec![snapshot(StrategicMetrics::neutral(), 0)];
        let current = snapshot(StrategicMetrics::new(7.0, 6.0, 8.0, 5.0, 6.5), 1);
        let report = format_metrics_report(&current, &history);

        assert!(report.contains("Generation: 1"));
        assert!(report.contains("coherence: 7.00/10"));
        assert!(report.contains("generation 0: 5.00"));
    }
}
