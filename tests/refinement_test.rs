//! Integration tests for the refinement loop
//!
//! Runs the orchestrator end to end over deterministic collaborator
//! doubles: a scripted evaluator, a failing summarizer (which exercises the
//! threshold fallback in the analyzer), and a failing generator (which
//! exercises the rule-based improver fallback).

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use stratagem::candidate::{CandidateMetadata, PlanStep, PooledCandidate, StrategyCandidate};
use stratagem::collab::fixed::{FailingEvaluator, FailingSummarizer, FixedEvaluator, FixedGenerator};
use stratagem::config::{DatabaseConfig, RefinementConfig};
use stratagem::feedback::FeedbackAnalyzer;
use stratagem::improver::StrategyImprover;
use stratagem::metrics::{PerformanceTrend, StrategicMetrics};
use stratagem::orchestrator::{CompletionReason, RefinementOrchestrator};
use stratagem::storage::{SessionStore, SqliteSessionStore};

/// Opt-in log output for debugging test runs: `RUST_LOG=debug cargo test`
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn original_candidate() -> PooledCandidate {
    let candidate = StrategyCandidate::new(
        "Northern expansion",
        vec![
            PlanStep::new("Survey the market", "Market report ready")
                .with_prerequisites(vec!["Budget approved".to_string()]),
            PlanStep::new("Open a regional office", "Office operating"),
        ],
    )
    .with_timeline("2 quarters");

    PooledCandidate {
        candidate,
        meta: CandidateMetadata::new(0, 0.7),
    }
}

fn flat(score: f64) -> StrategicMetrics {
    StrategicMetrics::new(score, score, score, score, score)
}

fn test_config() -> RefinementConfig {
    RefinementConfig {
        max_generations: 3,
        convergence_threshold: 0.99,
        quality_target: 9.5,
        compliance_target: 0.99,
        min_improvement: 0.01,
        time_limit_secs: 60,
        history_cap: 100,
        cost_per_generation: 1.0,
    }
}

fn build_orchestrator(
    evaluator: Arc<dyn stratagem::collab::Evaluator>,
    config: RefinementConfig,
) -> RefinementOrchestrator {
    init_logging();
    let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
    let analyzer = FeedbackAnalyzer::new(Arc::new(FailingSummarizer), config.clone());
    RefinementOrchestrator::new(evaluator, improver, analyzer, None, config)
}

#[tokio::test]
async fn test_improving_run_reaches_max_generations() {
    let evaluator = Arc::new(FixedEvaluator::new(
        vec![flat(5.0), flat(6.0), flat(7.0), flat(8.0)],
        flat(8.0),
    ));
    let mut orchestrator = build_orchestrator(evaluator, test_config());

    let session = orchestrator
        .refine(original_candidate(), "enter the northern market")
        .await
        .unwrap();

    assert!(session.is_complete);
    assert_eq!(
        session.completion_reason,
        Some(CompletionReason::MaxGenerationsReached)
    );
    assert_eq!(session.current_generation, 3);
    assert_eq!(session.candidates.len(), 4);
    assert_eq!(session.metrics.len(), 4);
    assert_eq!(session.best_score, 8.0);
    assert_eq!(session.total_cost, 3.0);

    // Generation 0 never counts as an improvement
    assert_eq!(session.metrics[0].improvement_score, 0.0);
    assert!(session.metrics[1].improvement_score > 0.0);

    // Monotone scores read as an improving trend
    assert_eq!(
        session.metrics[3].performance_trend,
        PerformanceTrend::Improving
    );

    // Each refinement pass renames the candidate
    assert!(session.candidates[1].candidate.title.ends_with("(Refined)"));

    // The tracker holds the same history the session reports
    let history = orchestrator.tracker().history(&session.strategy_id);
    assert_eq!(history.len(), 4);
    assert_eq!(history[3].strategic.overall_score, 8.0);
}

#[tokio::test]
async fn test_quality_target_stops_at_generation_zero() {
    let evaluator = Arc::new(FixedEvaluator::constant(flat(9.6)));
    let mut orchestrator = build_orchestrator(evaluator, test_config());

    let session = orchestrator
        .refine(original_candidate(), "ctx")
        .await
        .unwrap();

    assert_eq!(
        session.completion_reason,
        Some(CompletionReason::QualityTargetReached)
    );
    assert_eq!(session.current_generation, 0);
    assert_eq!(session.candidates.len(), 1);
    assert_eq!(session.total_cost, 0.0);
    assert_eq!(session.best_score, 9.6);
}

#[tokio::test]
async fn test_flat_scores_stop_on_minimal_improvement() {
    let evaluator = Arc::new(FixedEvaluator::constant(flat(6.0)));
    let mut orchestrator = build_orchestrator(evaluator, test_config());

    let session = orchestrator
        .refine(original_candidate(), "ctx")
        .await
        .unwrap();

    assert_eq!(
        session.completion_reason,
        Some(CompletionReason::MinimalImprovement)
    );
    assert_eq!(session.current_generation, 1);
    assert_eq!(session.metrics[1].improvement_score, 0.0);
}

#[tokio::test]
async fn test_degrading_scores_stop_on_feedback() {
    let evaluator = Arc::new(FixedEvaluator::new(
        vec![flat(8.0), flat(7.0), flat(6.0)],
        flat(5.0),
    ));
    let mut orchestrator = build_orchestrator(evaluator, test_config());

    let session = orchestrator
        .refine(original_candidate(), "ctx")
        .await
        .unwrap();

    // Falling scores turn the ROI negative, which the analyzer reports as
    // a recommendation to stop
    assert_eq!(
        session.completion_reason,
        Some(CompletionReason::FeedbackRecommendedStop)
    );
    // Best never decays below the original score
    assert_eq!(session.best_score, 8.0);
    assert_eq!(session.best_strategy.title, "Northern expansion");
    assert!(session.metrics.last().unwrap().roi_estimate < -1.0);
}

#[tokio::test]
async fn test_evaluator_failure_scores_neutral() {
    let mut orchestrator = build_orchestrator(Arc::new(FailingEvaluator), test_config());

    let session = orchestrator
        .refine(original_candidate(), "ctx")
        .await
        .unwrap();

    // Every generation scores neutral, so the loop stops on flat scores
    assert_eq!(session.metrics[0].strategic.overall_score, 5.0);
    assert_eq!(
        session.completion_reason,
        Some(CompletionReason::MinimalImprovement)
    );
}

#[tokio::test]
async fn test_weak_risk_scores_drive_rule_improvements() {
    // Risk management is the only dimension under the suggestion threshold
    let evaluator = Arc::new(FixedEvaluator::constant(StrategicMetrics::new(
        8.0, 8.0, 8.0, 4.0, 8.0,
    )));
    let config = RefinementConfig {
        max_generations: 1,
        min_improvement: 0.0,
        ..test_config()
    };
    let mut orchestrator = build_orchestrator(evaluator, config);

    let session = orchestrator
        .refine(original_candidate(), "ctx")
        .await
        .unwrap();

    assert_eq!(
        session.completion_reason,
        Some(CompletionReason::MaxGenerationsReached)
    );

    // The rule fallback added risk coverage to every uncovered step
    let refined = &session.candidates[1].candidate;
    assert!(refined.steps.iter().all(|step| !step.risks.is_empty()));
    assert!(refined.title.ends_with("(Refined)"));

    // Refined candidates re-enter selection with cleared marks
    let meta = &session.candidates[1].meta;
    assert!(meta.embedding.is_none());
    assert!(!meta.is_trunk && !meta.is_twig);
}

#[tokio::test]
async fn test_completed_session_is_persisted() {
    init_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(
        SqliteSessionStore::new(&DatabaseConfig {
            path: dir.path().join("sessions.db"),
            max_connections: 2,
        })
        .await
        .expect("Failed to create store"),
    );

    let evaluator = Arc::new(FixedEvaluator::constant(flat(6.0)));
    let improver = StrategyImprover::new(Arc::new(FixedGenerator::failing()));
    let analyzer = FeedbackAnalyzer::new(Arc::new(FailingSummarizer), test_config());
    let mut orchestrator = RefinementOrchestrator::new(
        evaluator,
        improver,
        analyzer,
        Some(store.clone() as Arc<dyn SessionStore>),
        test_config(),
    );

    let session = orchestrator
        .refine(original_candidate(), "persisted run")
        .await
        .unwrap();

    // Storage writes are fire-and-forget; wait for them to land
    let mut record = None;
    for _ in 0..50 {
        record = store.get_session(&session.session_id).await.unwrap();
        if record.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let record = record.expect("session record never persisted");

    assert_eq!(record.context, "persisted run");
    assert_eq!(record.completion_reason, "minimal-improvement");
    assert_eq!(record.generations, 2);
    assert_eq!(record.best_score, 6.0);

    let mut snapshots = Vec::new();
    for _ in 0..50 {
        snapshots = store.session_snapshots(&session.session_id).await.unwrap();
        if snapshots.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].generation, 0);
    assert_eq!(snapshots[1].generation, 1);
}
