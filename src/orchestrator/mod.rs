//! Refinement loop orchestration.
//!
//! Drives one candidate through evaluate → analyze → decide → improve until
//! a terminal condition holds, collecting everything into a
//! [`RefinementSession`]. The loop degrades instead of failing: a failed
//! evaluation scores neutral, a failed improvement ends the session with the
//! best candidate found so far, and storage writes are fire-and-forget.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::candidate::{PooledCandidate, StrategyCandidate};
use crate::collab::Evaluator;
use crate::config::RefinementConfig;
use crate::error::PipelineResult;
use crate::feedback::{FeedbackAnalysis, FeedbackAnalyzer, StopSignal};
use crate::improver::StrategyImprover;
use crate::metrics::{RefinementMetrics, StrategicMetrics, StrategyId};
use crate::storage::{GenerationSnapshot, SessionRecord, SessionStore};
use crate::tracker::PerformanceTracker;

// ============================================================================
// Completion Reasons
// ============================================================================

/// Why a refinement session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionReason {
    /// Wall-clock budget exhausted
    TimeLimitReached,
    /// The feedback analyzer recommended stopping
    FeedbackRecommendedStop,
    /// Convergence indicator crossed the configured threshold
    Converged,
    /// Overall score crossed the quality target
    QualityTargetReached,
    /// Compliance score crossed the compliance target
    ComplianceTargetReached,
    /// Improvement fell below the configured minimum
    MinimalImprovement,
    /// Improvement attempt failed; message carries the cause
    ImprovementFailed(String),
    /// Loop ran its full generation budget
    MaxGenerationsReached,
}

impl CompletionReason {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionReason::TimeLimitReached => "time-limit-reached",
            CompletionReason::FeedbackRecommendedStop => "feedback-recommended-stop",
            CompletionReason::Converged => "converged",
            CompletionReason::QualityTargetReached => "quality-target-reached",
            CompletionReason::ComplianceTargetReached => "compliance-target-reached",
            CompletionReason::MinimalImprovement => "minimal-improvement",
            CompletionReason::ImprovementFailed(_) => "improvement-failed",
            CompletionReason::MaxGenerationsReached => "max-generations-reached",
        }
    }
}

impl std::fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionReason::ImprovementFailed(message) => {
                write!(f, "{}: {}", self.as_str(), message)
            }
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

fn reason_from_signal(signal: StopSignal) -> CompletionReason {
    match signal {
        StopSignal::Converged => CompletionReason::Converged,
        StopSignal::MaxGenerationsReached => CompletionReason::MaxGenerationsReached,
        StopSignal::QualityTargetReached => CompletionReason::QualityTargetReached,
        StopSignal::DegradingTrend | StopSignal::NegativeRoi => {
            CompletionReason::FeedbackRecommendedStop
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Complete record of one refinement run.
#[derive(Debug, Clone)]
pub struct RefinementSession {
    /// Unique session identifier
    pub session_id: String,
    /// Lineage identifier used by the performance tracker
    pub strategy_id: StrategyId,
    /// Problem context the session refined against
    pub context: String,
    /// Candidates in generation order; index 0 is the original
    pub candidates: Vec<PooledCandidate>,
    /// One snapshot per generation, oldest first
    pub metrics: Vec<RefinementMetrics>,
    /// One analysis per completed analyze step
    pub analyses: Vec<FeedbackAnalysis>,
    /// Latest generation index
    pub current_generation: u32,
    /// Whether the session reached a terminal state
    pub is_complete: bool,
    /// Terminal reason, set when `is_complete`
    pub completion_reason: Option<CompletionReason>,
    /// Candidate with the best overall score so far
    pub best_strategy: StrategyCandidate,
    /// Best overall score so far; never decreases
    pub best_score: f64,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// When the session completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Total cost attributed across generations
    pub total_cost: f64,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs refinement sessions end to end.
pub struct RefinementOrchestrator {
    evaluator: Arc<dyn Evaluator>,
    improver: StrategyImprover,
    analyzer: FeedbackAnalyzer,
    tracker: PerformanceTracker,
    store: Option<Arc<dyn SessionStore>>,
    config: RefinementConfig,
}

impl RefinementOrchestrator {
    /// Create an orchestrator; `store` is optional persistence.
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        improver: StrategyImprover,
        analyzer: FeedbackAnalyzer,
        store: Option<Arc<dyn SessionStore>>,
        config: RefinementConfig,
    ) -> Self {
        let tracker = PerformanceTracker::new(config.history_cap);
        Self {
            evaluator,
            improver,
            analyzer,
            tracker,
            store,
            config,
        }
    }

    /// Access the tracker, for history queries after a run.
    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    /// Refine one candidate to a terminal state.
    pub async fn refine(
        &mut self,
        original: PooledCandidate,
        context: &str,
    ) -> PipelineResult<RefinementSession> {
        let clock = Instant::now();
        let session_id = format!("session_{}", Uuid::new_v4());
        let strategy_id = StrategyId::new();

        info!(session = %session_id, context, "Starting refinement session");

        let strategic = self.evaluate_or_neutral(&original.candidate, context).await;
        let first = self
            .tracker
            .record_performance(&strategy_id, strategic, 0, 0.0);

        let mut session = RefinementSession {
            session_id,
            strategy_id: strategy_id.clone(),
            context: context.to_string(),
            best_strategy: original.candidate.clone(),
            best_score: first.strategic.overall_score,
            candidates: vec![original],
            metrics: vec![first],
            analyses: Vec::new(),
            current_generation: 0,
            is_complete: false,
            completion_reason: None,
            started_at: Utc::now(),
            completed_at: None,
            total_cost: 0.0,
        };
        self.write_snapshot(&session, 0);

        loop {
            if clock.elapsed().as_secs() >= self.config.time_limit_secs {
                self.complete(&mut session, CompletionReason::TimeLimitReached);
                return Ok(session);
            }

            let current = session.metrics.last().expect("at least generation 0");
            let history = &session.metrics[..session.metrics.len() - 1];
            let analysis = self.analyzer.analyze(current, history).await;
            let stop = analysis.stop;
            session.analyses.push(analysis);

            if let Some(signal) = stop {
                self.complete(&mut session, reason_from_signal(signal));
                return Ok(session);
            }

            let next_generation = session.current_generation + 1;
            let latest = session.candidates.last().expect("at least the original");
            let analysis = session.analyses.last().expect("just pushed");
            let current = session.metrics.last().expect("at least generation 0");

            let improved = match self.improver.improve(latest, analysis, current, None).await {
                Ok(improved) => improved,
                Err(e) => {
                    warn!(error = %e, "Improvement failed; ending session with best so far");
                    self.complete(
                        &mut session,
                        CompletionReason::ImprovementFailed(e.to_string()),
                    );
                    return Ok(session);
                }
            };

            let strategic = self.evaluate_or_neutral(&improved.candidate, context).await;
            let snapshot = self.tracker.record_performance(
                &strategy_id,
                strategic,
                next_generation,
                self.config.cost_per_generation,
            );

            session.total_cost += self.config.cost_per_generation;
            session.current_generation = next_generation;
            if snapshot.strategic.overall_score > session.best_score {
                session.best_score = snapshot.strategic.overall_score;
                session.best_strategy = improved.candidate.clone();
            }
            session.candidates.push(improved);
            session.metrics.push(snapshot.clone());
            self.write_snapshot(&session, next_generation);

            if snapshot.compliance_score >= self.config.compliance_target {
                self.complete(&mut session, CompletionReason::ComplianceTargetReached);
                return Ok(session);
            }
            if snapshot.improvement_score.abs() < self.config.min_improvement {
                self.complete(&mut session, CompletionReason::MinimalImprovement);
                return Ok(session);
            }
        }
    }

    async fn evaluate_or_neutral(
        &self,
        candidate: &StrategyCandidate,
        context: &str,
    ) -> StrategicMetrics {
        match self.evaluator.evaluate(candidate, context).await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "Evaluation failed; scoring neutral");
                StrategicMetrics::neutral()
            }
        }
    }

    fn complete(&self, session: &mut RefinementSession, reason: CompletionReason) {
        info!(
            session = %session.session_id,
            generations = session.current_generation + 1,
            best_score = session.best_score,
            reason = reason.as_str(),
            "Refinement session completed"
        );
        session.is_complete = true;
        session.completion_reason = Some(reason);
        session.completed_at = Some(Utc::now());
        self.write_session_record(session);
    }

    /// Fire-and-forget snapshot write; storage never blocks the loop.
    fn write_snapshot(&self, session: &RefinementSession, generation: u32) {
        let Some(store) = &self.store else {
            return;
        };
        let index = generation as usize;
        let snapshot = GenerationSnapshot {
            session_id: session.session_id.clone(),
            generation,
            candidate: session.candidates[index].candidate.clone(),
            metrics: session.metrics[index].clone(),
            created_at: Utc::now(),
        };
        let store = Arc::clone(store);
        tokio::spawn(async move {
            if let Err(e) = store.save_snapshot(&snapshot).await {
                warn!(error = %e, "Failed to persist generation snapshot");
            }
        });
    }

    fn write_session_record(&self, session: &RefinementSession) {
        let Some(store) = &self.store else {
            return;
        };
        let record = SessionRecord {
            session_id: session.session_id.clone(),
            context: session.context.clone(),
            created_at: session.started_at,
            completed_at: session.completed_at.unwrap_or_else(Utc::now),
            generations: session.current_generation + 1,
            completion_reason: session
                .completion_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_default(),
            best_score: session.best_score,
            best_candidate: session.best_strategy.clone(),
            metrics_history: session.metrics.clone(),
            feedback_summaries: session
                .analyses
                .iter()
                .enumerate()
                .map(|(generation, a)| {
                    format!(
                        "generation {}: {} strengths, {} weaknesses, {} suggestions, priority {:.2}",
                        generation,
                        a.strengths.len(),
                        a.weaknesses.len(),
                        a.suggestions.len(),
                        a.refinement_priority
                    )
                })
                .collect(),
            total_cost: session.total_cost,
        };
        let store = Arc::clone(store);
        tokio::spawn(async move {
            if let Err(e) = store.save_session(&record).await {
                warn!(error = %e, "Failed to persist session record");
            }
        });
    }
}
