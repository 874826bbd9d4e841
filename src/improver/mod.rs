//! Produces the next-generation candidate from improvement suggestions.
//!
//! The preferred path asks the generative collaborator for a rewritten
//! candidate, seeded with the current plan, feedback, and the top
//! suggestions. When that call fails the improver falls back to a
//! deterministic rule-based pass applying category-specific local edits,
//! so an improvement attempt always yields a candidate.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::candidate::{PooledCandidate, StrategyCandidate};
use crate::collab::Generator;
use crate::error::{CollaboratorError, PipelineError, PipelineResult};
use crate::feedback::{FeedbackAnalysis, ImprovementSuggestion, SuggestionCategory};
use crate::metrics::RefinementMetrics;

/// Suggestions applied per improvement pass
const MAX_APPLIED_SUGGESTIONS: usize = 3;

/// Prerequisite added by coherence edits
const GENERIC_PREREQUISITE: &str = "previous step outcome validated";
/// Risk added by risk-management edits
const GENERIC_RISK: &str = "execution may take longer than planned";
/// Prefix added to vague resource lines
const RESOURCE_PREFIX: &str = "Specialized";

/// Builds refined candidates from analysis output.
pub struct StrategyImprover {
    generator: Arc<dyn Generator>,
}

impl StrategyImprover {
    /// Create an improver over the given generator.
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Produce the next-generation candidate.
    ///
    /// Applies up to the top three suggestions, optionally filtered to
    /// `categories`. Generation provenance (source index, temperature)
    /// carries over; the embedding and selection marks reset because the
    /// content changed. Fails only if the refined candidate would have no
    /// steps at all.
    pub async fn improve(
        &self,
        pooled: &PooledCandidate,
        analysis: &FeedbackAnalysis,
        current: &RefinementMetrics,
        categories: Option<&[SuggestionCategory]>,
    ) -> PipelineResult<PooledCandidate> {
        let suggestions = selected_suggestions(&analysis.suggestions, categories);

        let candidate = match self
            .generate_refined(&pooled.candidate, analysis, current, &suggestions)
            .await
        {
            Ok(candidate) => {
                debug!(title = %candidate.title, "Generative refinement succeeded");
                candidate
            }
            Err(e) => {
                warn!(error = %e, "Generative refinement failed; applying rule-based edits");
                apply_rules(&pooled.candidate, &suggestions)
            }
        };

        if candidate.steps.is_empty() {
            return Err(PipelineError::Internal {
                message: "Refined candidate has no steps".to_string(),
            });
        }

        let mut meta = pooled.meta.clone();
        meta.embedding = None;
        meta.reset_selection();

        Ok(PooledCandidate { candidate, meta })
    }

    async fn generate_refined(
        &self,
        candidate: &StrategyCandidate,
        analysis: &FeedbackAnalysis,
        current: &RefinementMetrics,
        suggestions: &[&ImprovementSuggestion],
    ) -> Result<StrategyCandidate, CollaboratorError> {
        let context = json!({
            "candidate": candidate,
            "strengths": analysis.strengths,
            "weaknesses": analysis.weaknesses,
            "overall_score": current.strategic.overall_score,
            "compliance_score": current.compliance_score,
            "suggestions": suggestions,
        });
        let prompt = format!(
            "Refine the following strategy plan. Keep its intent, address the \
             weaknesses and suggestions, and return the full revised plan.\n{}",
            context
        );
        let candidate = self.generator.generate(&prompt, 0.7).await?;
        if candidate.steps.is_empty() {
            return Err(CollaboratorError::InvalidResponse {
                message: "Generated refinement has no steps".to_string(),
            });
        }
        Ok(candidate)
    }
}

fn selected_suggestions<'a>(
    suggestions: &'a [ImprovementSuggestion],
    categories: Option<&[SuggestionCategory]>,
) -> Vec<&'a ImprovementSuggestion> {
    suggestions
        .iter()
        .filter(|s| categories.map_or(true, |allowed| allowed.contains(&s.category)))
        .take(MAX_APPLIED_SUGGESTIONS)
        .collect()
}

// ============================================================================
// Rule-Based Edits
// ============================================================================

fn apply_rules(
    candidate: &StrategyCandidate,
    suggestions: &[&ImprovementSuggestion],
) -> StrategyCandidate {
    let mut refined = candidate.clone();

    let has = |category: SuggestionCategory| suggestions.iter().any(|s| s.category == category);
    let feasibility_mentions_timeline = suggestions.iter().any(|s| {
        s.category == SuggestionCategory::Feasibility
            && (s.description.to_lowercase().contains("timeline")
                || s.specific_changes
                    .iter()
                    .any(|c| c.to_lowercase().contains("timeline")))
    });

    for step in &mut refined.steps {
        if has(SuggestionCategory::Coherence) && step.prerequisites.len() < 2 {
            step.prerequisites.push(GENERIC_PREREQUISITE.to_string());
        }
        if has(SuggestionCategory::RiskManagement) && step.risks.is_empty() {
            step.risks.push(GENERIC_RISK.to_string());
            step.confidence = (step.confidence - 0.1).max(0.1);
        }
        if feasibility_mentions_timeline && step.confidence > 0.8 {
            step.confidence = (step.confidence - 0.05).min(0.9);
        }
    }

    if has(SuggestionCategory::ResourceEfficiency) {
        for resource in &mut refined.resource_requirements {
            if resource.split_whitespace().count() < 3 {
                *resource = format!("{} {}", RESOURCE_PREFIX, resource);
            }
        }
    }

    refined.title = format!("{} (Refined)", refined.title);
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{CandidateMetadata, PlanStep};
    use crate::collab::fixed::FixedGenerator;
    use crate::metrics::{
        PerformanceTrend, RefinementId, StrategicMetrics, StrategyId,
    };
    use chrono::Utc;

    fn catalog(categories: &[SuggestionCategory]) -> Vec<ImprovementSuggestion> {
        categories
            .iter()
            .map(|&category| ImprovementSuggestion {
                category,
                priority: 0.8,
                expected_impact: 0.7,
                implementation_effort: 0.5,
                confidence: 0.8,
                description: match category {
                    SuggestionCategory::Feasibility => {
                        "Re-estimate the timeline against resources".to_string()
                    }
                    _ => "Improve this dimension".to_string(),
                },
                specific_changes: vec![],
            })
            .collect()
    }

    fn analysis_with(suggestions: Vec<ImprovementSuggestion>) -> FeedbackAnalysis {
        FeedbackAnalysis {
            strengths: vec![],
            weaknesses: vec![],
            is_converging: false,
            is_highly_converged: false,
            compliance_trend: PerformanceTrend::Stable,
            suggestions,
            stop: None,
            refinement_priority: 0.5,
        }
    }

    fn snapshot() -> RefinementMetrics {
        RefinementMetrics {
            refinement_id: RefinementId::new(),
            strategy_id: StrategyId::new(),
            generation: 1,
            timestamp: Utc::now(),
            strategic: StrategicMetrics::neutral(),
            improvement_score: 0.0,
            convergence_indicator: 0.0,
            compliance_score: 0.5,
            recursive_depth: 1,
            evolution_velocity: 0.0,
            performance_trend: PerformanceTrend::Stable,
            trend_confidence: 0.0,
            refinement_cost: 1.0,
            roi_estimate: 0.0,
        }
    }

    fn pooled(candidate: StrategyCandidate) -> PooledCandidate {
        let mut meta = CandidateMetadata::new(2, 0.9);
        meta.embedding = Some(vec![1.0, 0.0]);
        meta.mark_trunk();
        PooledCandidate { candidate, meta }
    }

    #[tokio::test]
    async fn test_generative_path_preferred() {
        let improved = StrategyCandidate::new("Better plan", vec![PlanStep::new("a", "b")]);
        let improver = StrategyImprover::new(Arc::new(FixedGenerator::sequence(vec![
            improved.clone(),
        ])));
        let original = pooled(StrategyCandidate::new("Plan", vec![PlanStep::new("a", "b")]));

        let next = improver
            .improve(&original, &analysis_with(vec![]), &snapshot(), None)
            .await
            .unwrap();
        assert_eq!(next.candidate.title, "Better plan");
    }

    #[tokio::test]
    async fn test_fallback_coherence_adds_prerequisite() {
        let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
        let original = pooled(StrategyCandidate::new(
            "Plan",
            vec![PlanStep::new("a", "b")
                .with_prerequisites(vec!["budget approved".to_string()])],
        ));
        let analysis = analysis_with(catalog(&[SuggestionCategory::Coherence]));

        let next = improver
            .improve(&original, &analysis, &snapshot(), None)
            .await
            .unwrap();
        assert_eq!(next.candidate.title, "Plan (Refined)");
        assert_eq!(
            next.candidate.steps[0].prerequisites,
            vec!["budget approved", GENERIC_PREREQUISITE]
        );
    }

    #[tokio::test]
    async fn test_fallback_risk_edit_reduces_confidence() {
        let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
        let original = pooled(StrategyCandidate::new(
            "Plan",
            vec![PlanStep::new("a", "b").with_confidence(0.15)],
        ));
        let analysis = analysis_with(catalog(&[SuggestionCategory::RiskManagement]));

        let next = improver
            .improve(&original, &analysis, &snapshot(), None)
            .await
            .unwrap();
        let step = &next.candidate.steps[0];
        assert_eq!(step.risks, vec![GENERIC_RISK]);
        // Floor at 0.1
        assert!((step.confidence - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_feasibility_caps_confidence() {
        let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
        let original = pooled(StrategyCandidate::new(
            "Plan",
            vec![PlanStep::new("a", "b").with_confidence(0.95)],
        ));
        let analysis = analysis_with(catalog(&[SuggestionCategory::Feasibility]));

        let next = improver
            .improve(&original, &analysis, &snapshot(), None)
            .await
            .unwrap();
        assert!((next.candidate.steps[0].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_qualifies_vague_resources() {
        let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
        let original = pooled(
            StrategyCandidate::new("Plan", vec![PlanStep::new("a", "b")]).with_resources(vec![
                "analyst".to_string(),
                "data engineering contractor team".to_string(),
            ]),
        );
        let analysis = analysis_with(catalog(&[SuggestionCategory::ResourceEfficiency]));

        let next = improver
            .improve(&original, &analysis, &snapshot(), None)
            .await
            .unwrap();
        assert_eq!(
            next.candidate.resource_requirements,
            vec![
                "Specialized analyst".to_string(),
                "data engineering contractor team".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_category_filter_limits_edits() {
        let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
        let original = pooled(StrategyCandidate::new(
            "Plan",
            vec![PlanStep::new("a", "b")],
        ));
        let analysis = analysis_with(catalog(&[
            SuggestionCategory::Coherence,
            SuggestionCategory::RiskManagement,
        ]));

        let next = improver
            .improve(
                &original,
                &analysis,
                &snapshot(),
                Some(&[SuggestionCategory::RiskManagement]),
            )
            .await
            .unwrap();
        // Coherence edit filtered out; only the risk edit applied
        assert_eq!(next.candidate.steps[0].prerequisites.len(), 0);
        assert_eq!(next.candidate.steps[0].risks.len(), 1);
    }

    #[tokio::test]
    async fn test_provenance_carries_and_selection_resets() {
        let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
        let original = pooled(StrategyCandidate::new(
            "Plan",
            vec![PlanStep::new("a", "b")],
        ));
        let next = improver
            .improve(&original, &analysis_with(vec![]), &snapshot(), None)
            .await
            .unwrap();

        assert_eq!(next.meta.source_index, 2);
        assert_eq!(next.meta.temperature, 0.9);
        assert!(next.meta.embedding.is_none());
        assert!(!next.meta.is_trunk);
    }
}
