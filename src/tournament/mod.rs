//! Pairwise tournaments over a candidate pool.
//!
//! Three formats share one voting primitive: each pairing is judged
//! `num_comparisons` times by the external judge and decided by majority
//! vote. A failed judgment never aborts a tournament; it is logged, counted,
//! and scored as a vote for the first (incumbent) candidate, so transient
//! judge outages degrade toward keeping the status quo instead of failing
//! the run. Ties also resolve to the first candidate.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::candidate::{CandidatePool, StrategyCandidate};
use crate::collab::{PairwiseJudge, Preference};
use crate::config::TournamentConfig;
use crate::error::{PipelineError, PipelineResult};

// ============================================================================
// Pair Voting
// ============================================================================

/// Outcome of one majority-voted pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairOutcome {
    /// Pool index of the first candidate
    pub first: usize,
    /// Pool index of the second candidate
    pub second: usize,
    /// Which side won the majority
    pub winner: Preference,
    /// Votes for the first candidate, including failure defaults
    pub first_votes: usize,
    /// Votes for the second candidate
    pub second_votes: usize,
    /// Judgments that failed and defaulted to the first candidate
    pub failed_judgments: usize,
}

impl PairOutcome {
    /// Pool index of the winning candidate.
    pub fn winner_index(&self) -> usize {
        match self.winner {
            Preference::First => self.first,
            Preference::Second => self.second,
        }
    }
}

async fn vote_on_pair(
    judge: Arc<dyn PairwiseJudge>,
    first_candidate: Arc<StrategyCandidate>,
    second_candidate: Arc<StrategyCandidate>,
    context: Arc<String>,
    first: usize,
    second: usize,
    num_comparisons: usize,
) -> PairOutcome {
    let mut set = JoinSet::new();
    for _ in 0..num_comparisons.max(1) {
        let judge = Arc::clone(&judge);
        let a = Arc::clone(&first_candidate);
        let b = Arc::clone(&second_candidate);
        let context = Arc::clone(&context);
        set.spawn(async move { judge.compare(&a, &b, &context).await });
    }

    let mut first_votes = 0usize;
    let mut second_votes = 0usize;
    let mut failed_judgments = 0usize;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(judgment)) => match judgment.preference {
                Preference::First => first_votes += 1,
                Preference::Second => second_votes += 1,
            },
            Ok(Err(e)) => {
                warn!(first, second, error = %e, "Judgment failed; counting for first");
                first_votes += 1;
                failed_judgments += 1;
            }
            Err(e) => {
                warn!(first, second, error = %e, "Judgment task panicked; counting for first");
                first_votes += 1;
                failed_judgments += 1;
            }
        }
    }

    let winner = if second_votes > first_votes {
        Preference::Second
    } else {
        Preference::First
    };

    debug!(
        first,
        second,
        first_votes,
        second_votes,
        failed_judgments,
        winner = winner.as_u8(),
        "Pairing decided"
    );

    PairOutcome {
        first,
        second,
        winner,
        first_votes,
        second_votes,
        failed_judgments,
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of an elimination tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EliminationResult {
    /// Pool index of the overall winner
    pub winner: usize,
    /// Pairings in the order they were played
    pub rounds: Vec<PairOutcome>,
    /// Total failed judgments across all pairings
    pub failed_judgments: usize,
}

/// One candidate's standing in a round-robin tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standing {
    /// Pool index
    pub index: usize,
    /// Pairings won
    pub wins: usize,
    /// Pairings played
    pub games: usize,
    /// `wins / games`, 0.0 when no games were played
    pub win_rate: f64,
}

/// Result of a round-robin tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRobinResult {
    /// Pool index of the top-ranked candidate
    pub winner: usize,
    /// All candidates, best first
    pub rankings: Vec<Standing>,
    /// Total failed judgments across all pairings
    pub failed_judgments: usize,
}

/// Result of a grouped tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedResult {
    /// Pool index of the overall winner
    pub winner: usize,
    /// Group tag to that group's winning pool index
    pub group_winners: BTreeMap<String, usize>,
    /// Total failed judgments across all pairings
    pub failed_judgments: usize,
}

// ============================================================================
// Tournament Runner
// ============================================================================

/// Group tag for candidates without a technique mark
const UNTAGGED_GROUP: &str = "general";

/// Runs pairwise tournaments against a judge collaborator.
pub struct TournamentRunner {
    judge: Arc<dyn PairwiseJudge>,
    config: TournamentConfig,
}

impl TournamentRunner {
    /// Create a runner over the given judge.
    pub fn new(judge: Arc<dyn PairwiseJudge>, config: TournamentConfig) -> Self {
        Self { judge, config }
    }

    fn require_pool(&self, pool: &CandidatePool) -> PipelineResult<()> {
        if pool.len() < 2 {
            return Err(PipelineError::NotEnoughCandidates {
                required: 2,
                actual: pool.len(),
            });
        }
        Ok(())
    }

    async fn play_pair(
        &self,
        pool: &CandidatePool,
        first: usize,
        second: usize,
        context: &str,
    ) -> PairOutcome {
        vote_on_pair(
            Arc::clone(&self.judge),
            Arc::new(pool.get(first).expect("index within pool").candidate.clone()),
            Arc::new(pool.get(second).expect("index within pool").candidate.clone()),
            Arc::new(context.to_string()),
            first,
            second,
            self.config.num_comparisons,
        )
        .await
    }

    /// Sequential elimination: the incumbent faces each challenger in pool
    /// order, and the pairing winner carries forward.
    pub async fn run_elimination(
        &self,
        pool: &CandidatePool,
        context: &str,
    ) -> PipelineResult<EliminationResult> {
        self.require_pool(pool)?;
        self.eliminate_among(pool, &(0..pool.len()).collect::<Vec<_>>(), context)
            .await
    }

    async fn eliminate_among(
        &self,
        pool: &CandidatePool,
        indices: &[usize],
        context: &str,
    ) -> PipelineResult<EliminationResult> {
        let mut champion = indices[0];
        let mut rounds = Vec::new();
        let mut failed_judgments = 0;

        for &challenger in &indices[1..] {
            let outcome = self.play_pair(pool, champion, challenger, context).await;
            failed_judgments += outcome.failed_judgments;
            champion = outcome.winner_index();
            rounds.push(outcome);
        }

        info!(
            candidates = indices.len(),
            winner = champion,
            failed_judgments,
            "Elimination tournament completed"
        );

        Ok(EliminationResult {
            winner: champion,
            rounds,
            failed_judgments,
        })
    }

    /// Every pair plays once; candidates rank by wins, then win rate, then
    /// pool index. Pairings are judged concurrently.
    pub async fn run_round_robin(
        &self,
        pool: &CandidatePool,
        context: &str,
    ) -> PipelineResult<RoundRobinResult> {
        self.require_pool(pool)?;
        self.round_robin_among(pool, &(0..pool.len()).collect::<Vec<_>>(), context)
            .await
    }

    async fn round_robin_among(
        &self,
        pool: &CandidatePool,
        indices: &[usize],
        context: &str,
    ) -> PipelineResult<RoundRobinResult> {
        let mut set = JoinSet::new();
        for (slot, &first) in indices.iter().enumerate() {
            for &second in &indices[slot + 1..] {
                let judge = Arc::clone(&self.judge);
                let a = Arc::new(pool.get(first).expect("index within pool").candidate.clone());
                let b = Arc::new(pool.get(second).expect("index within pool").candidate.clone());
                let context = Arc::new(context.to_string());
                let num_comparisons = self.config.num_comparisons;
                set.spawn(async move {
                    vote_on_pair(judge, a, b, context, first, second, num_comparisons).await
                });
            }
        }

        let mut wins: BTreeMap<usize, usize> = indices.iter().map(|&i| (i, 0)).collect();
        let mut games: BTreeMap<usize, usize> = indices.iter().map(|&i| (i, 0)).collect();
        let mut failed_judgments = 0;

        while let Some(joined) = set.join_next().await {
            let outcome = joined.map_err(|e| PipelineError::Internal {
                message: format!("Round-robin pairing task failed: {}", e),
            })?;
            failed_judgments += outcome.failed_judgments;
            *games.get_mut(&outcome.first).expect("known index") += 1;
            *games.get_mut(&outcome.second).expect("known index") += 1;
            *wins.get_mut(&outcome.winner_index()).expect("known index") += 1;
        }

        let mut rankings: Vec<Standing> = indices
            .iter()
            .map(|&index| Standing {
                index,
                wins: wins[&index],
                games: games[&index],
                win_rate: if games[&index] > 0 {
                    wins[&index] as f64 / games[&index] as f64
                } else {
                    0.0
                },
            })
            .collect();
        rankings.sort_by(|a, b| {
            b.wins
                .cmp(&a.wins)
                .then_with(|| {
                    b.win_rate
                        .partial_cmp(&a.win_rate)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.index.cmp(&b.index))
        });

        let winner = rankings[0].index;
        info!(
            candidates = indices.len(),
            winner,
            failed_judgments,
            "Round-robin tournament completed"
        );

        Ok(RoundRobinResult {
            winner,
            rankings,
            failed_judgments,
        })
    }

    /// Candidates group by technique tag; each group plays a round-robin
    /// among its members (a singleton wins its group outright), and the
    /// group winners play a final elimination.
    pub async fn run_grouped(
        &self,
        pool: &CandidatePool,
        context: &str,
    ) -> PipelineResult<GroupedResult> {
        self.require_pool(pool)?;

        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, pooled) in pool.iter().enumerate() {
            let tag = pooled
                .meta
                .technique
                .clone()
                .unwrap_or_else(|| UNTAGGED_GROUP.to_string());
            groups.entry(tag).or_default().push(index);
        }

        let mut group_winners = BTreeMap::new();
        let mut failed_judgments = 0;

        for (tag, members) in &groups {
            let winner = if members.len() == 1 {
                debug!(group = %tag, winner = members[0], "Singleton group wins outright");
                members[0]
            } else {
                let result = self.round_robin_among(pool, members, context).await?;
                failed_judgments += result.failed_judgments;
                result.winner
            };
            group_winners.insert(tag.clone(), winner);
        }

        let finalists: Vec<usize> = group_winners.values().copied().collect();
        let winner = if finalists.len() == 1 {
            finalists[0]
        } else {
            let finals = self.eliminate_among(pool, &finalists, context).await?;
            failed_judgments += finals.failed_judgments;
            finals.winner
        };

        info!(
            groups = groups.len(),
            winner,
            failed_judgments,
            "Grouped tournament completed"
        );

        Ok(GroupedResult {
            winner,
            group_winners,
            failed_judgments,
        })
    }
}
