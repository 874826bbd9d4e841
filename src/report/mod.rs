//! Human-readable session reports.
//!
//! Renders a completed [`RefinementSession`] as markdown with a
//! performance-evolution table, for attaching to run artifacts.

use std::fmt::Write as _;

use crate::orchestrator::RefinementSession;

/// Render a session as a markdown report.
pub fn render_markdown_report(session: &RefinementSession) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# Refinement Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "- Session: `{}`", session.session_id);
    let _ = writeln!(out, "- Context: {}", session.context);
    let _ = writeln!(
        out,
        "- Generations: {} (including the original)",
        session.current_generation + 1
    );
    if let Some(reason) = &session.completion_reason {
        let _ = writeln!(out, "- Completed: {}", reason);
    }
    let _ = writeln!(out, "- Best score: {:.2}/10", session.best_score);
    let _ = writeln!(out, "- Best strategy: {}", session.best_strategy.title);
    let _ = writeln!(out, "- Total cost: {:.2}", session.total_cost);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Performance evolution");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "| Generation | Score | Improvement | Convergence | Compliance |"
    );
    let _ = writeln!(out, "|---|---|---|---|---|");
    for snapshot in &session.metrics {
        let _ = writeln!(
            out,
            "| {} | {:.2} | {:+.3} | {:.3} | {:.3} |",
            snapshot.generation,
            snapshot.strategic.overall_score,
            snapshot.improvement_score,
            snapshot.convergence_indicator,
            snapshot.compliance_score,
        );
    }

    if let Some(latest) = session.metrics.last() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Latest trend: {} (confidence {:.2}), velocity {:+.3}, ROI {:+.2}",
            latest.performance_trend,
            latest.trend_confidence,
            latest.evolution_velocity,
            latest.roi_estimate,
        );
    }

    if let Some(analysis) = session.analyses.last() {
        if !analysis.strengths.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Strengths");
            for strength in &analysis.strengths {
                let _ = writeln!(out, "- {}", strength);
            }
        }
        if !analysis.weaknesses.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Weaknesses");
            for weakness in &analysis.weaknesses {
                let _ = writeln!(out, "- {}", weakness);
            }
        }
    }

    out
}
