//! Consensus selection: density clustering over candidate embeddings.
//!
//! The selector clusters the pool, picks the medoid of the largest cluster
//! as the trunk (the single consensus candidate), and marks small-cluster
//! members and noise as twigs (meaningfully different alternatives). The
//! procedure is deterministic for fixed inputs: cluster labels are assigned
//! in first-seen candidate order and every tie-break is by lowest label or
//! lowest index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candidate::{CandidatePool, NOISE_LABEL};
use crate::config::SelectionConfig;
use crate::embedding::cosine_similarity;
use crate::error::{PipelineError, PipelineResult};

// ============================================================================
// Density Clustering
// ============================================================================

fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    1.0 - cosine_similarity(a, b)
}

/// DBSCAN over cosine distance.
///
/// Returns one label per point; -1 marks noise. Points are visited in index
/// order and cluster labels count up from 0, so output is deterministic.
pub fn dbscan(embeddings: &[Vec<f64>], eps: f64, min_samples: usize) -> Vec<i64> {
    let n = embeddings.len();
    let mut labels = vec![NOISE_LABEL; n];
    let mut visited = vec![false; n];
    let mut next_label = 0i64;

    let neighbors_of = |point: usize| -> Vec<usize> {
        (0..n)
            .filter(|&other| cosine_distance(&embeddings[point], &embeddings[other]) <= eps)
            .collect()
    };

    for point in 0..n {
        if visited[point] {
            continue;
        }
        visited[point] = true;

        let neighbors = neighbors_of(point);
        if neighbors.len() < min_samples {
            continue; // stays noise unless absorbed by a later cluster
        }

        let label = next_label;
        next_label += 1;
        labels[point] = label;

        let mut queue: std::collections::VecDeque<usize> = neighbors.into();
        while let Some(current) = queue.pop_front() {
            if labels[current] == NOISE_LABEL {
                labels[current] = label;
            }
            if visited[current] {
                continue;
            }
            visited[current] = true;

            let current_neighbors = neighbors_of(current);
            if current_neighbors.len() >= min_samples {
                queue.extend(current_neighbors);
            }
        }
    }

    labels
}

// ============================================================================
// Consensus Outcome
// ============================================================================

/// Result of a consensus selection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    /// Pool index of the trunk candidate
    pub trunk_index: usize,
    /// Pool indices of the twig candidates, ascending
    pub twig_indices: Vec<usize>,
    /// Number of clusters found, excluding noise
    pub cluster_count: usize,
    /// Number of noise-labeled candidates
    pub noise_count: usize,
    /// Cluster label to member count
    pub cluster_sizes: BTreeMap<i64, usize>,
    /// Cluster label to mean pairwise cosine similarity within the cluster
    /// (1.0 for singletons)
    pub cluster_coherence: BTreeMap<i64, f64>,
}

// ============================================================================
// Consensus Selector
// ============================================================================

/// Clustering-based trunk/twig selector.
pub struct ConsensusSelector {
    config: SelectionConfig,
}

impl ConsensusSelector {
    /// Create a selector with the given configuration.
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Select a trunk and twigs from an embedded pool.
    ///
    /// Updates each candidate's cluster label and trunk/twig marks in place.
    /// Pools smaller than the minimum cluster size take the degenerate path:
    /// the first candidate becomes trunk with no twigs.
    pub fn select(&self, pool: &mut CandidatePool) -> PipelineResult<ConsensusOutcome> {
        if pool.is_empty() {
            return Err(PipelineError::EmptyCandidatePool);
        }

        for pooled in pool.iter_mut() {
            pooled.meta.reset_selection();
        }

        let embeddings: Vec<Vec<f64>> = pool
            .iter()
            .map(|p| {
                p.meta
                    .embedding
                    .clone()
                    .ok_or_else(|| PipelineError::Internal {
                        message: format!(
                            "Candidate {} has no embedding",
                            p.meta.source_index
                        ),
                    })
            })
            .collect::<PipelineResult<_>>()?;

        if pool.len() < self.config.min_cluster_size {
            return Ok(self.degenerate_outcome(pool, &embeddings));
        }

        let labels = dbscan(&embeddings, self.config.cluster_eps, self.config.min_cluster_size);
        for (pooled, &label) in pool.iter_mut().zip(&labels) {
            pooled.meta.cluster_label = label;
        }

        let mut cluster_sizes: BTreeMap<i64, usize> = BTreeMap::new();
        for &label in &labels {
            if label != NOISE_LABEL {
                *cluster_sizes.entry(label).or_insert(0) += 1;
            }
        }
        let noise_count = labels.iter().filter(|&&l| l == NOISE_LABEL).count();

        // Largest cluster; equal sizes resolve to the smallest label.
        // BTreeMap iterates labels ascending, so the first maximum wins.
        let largest_label = cluster_sizes
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&label, _)| label);

        let (trunk_index, twig_indices) = match largest_label {
            Some(largest) => {
                let members: Vec<usize> = labels
                    .iter()
                    .enumerate()
                    .filter(|(_, &l)| l == largest)
                    .map(|(i, _)| i)
                    .collect();
                let trunk = medoid(&members, &embeddings);

                let total = pool.len() as f64;
                let twigs: Vec<usize> = labels
                    .iter()
                    .enumerate()
                    .filter(|(_, &label)| {
                        label == NOISE_LABEL
                            || (label != largest
                                && (cluster_sizes[&label] as f64) / total
                                    < self.config.twig_size_ratio)
                    })
                    .map(|(i, _)| i)
                    .collect();
                (trunk, twigs)
            }
            None => {
                // Everything is noise: keep the first candidate as trunk and
                // offer the rest as twigs
                (0, (1..pool.len()).collect())
            }
        };

        pool.get_mut(trunk_index)
            .expect("trunk index within pool")
            .meta
            .mark_trunk();
        for &index in &twig_indices {
            if index != trunk_index {
                pool.get_mut(index)
                    .expect("twig index within pool")
                    .meta
                    .mark_twig();
            }
        }
        let twig_indices: Vec<usize> = twig_indices
            .into_iter()
            .filter(|&i| i != trunk_index)
            .collect();

        let cluster_coherence = coherence_by_cluster(&labels, &embeddings);

        info!(
            candidates = pool.len(),
            clusters = cluster_sizes.len(),
            noise = noise_count,
            trunk = trunk_index,
            twigs = twig_indices.len(),
            "Consensus selection completed"
        );

        Ok(ConsensusOutcome {
            trunk_index,
            twig_indices,
            cluster_count: cluster_sizes.len(),
            noise_count,
            cluster_sizes,
            cluster_coherence,
        })
    }

    fn degenerate_outcome(
        &self,
        pool: &mut CandidatePool,
        embeddings: &[Vec<f64>],
    ) -> ConsensusOutcome {
        debug!(
            candidates = pool.len(),
            min_cluster_size = self.config.min_cluster_size,
            "Population below minimum cluster size; first candidate is trunk"
        );

        for pooled in pool.iter_mut() {
            pooled.meta.cluster_label = 0;
        }
        pool.get_mut(0)
            .expect("non-empty pool")
            .meta
            .mark_trunk();

        let members: Vec<usize> = (0..pool.len()).collect();
        let mut cluster_coherence = BTreeMap::new();
        cluster_coherence.insert(0, mean_pairwise_similarity(&members, embeddings));

        ConsensusOutcome {
            trunk_index: 0,
            twig_indices: Vec::new(),
            cluster_count: 1,
            noise_count: 0,
            cluster_sizes: BTreeMap::from([(0, pool.len())]),
            cluster_coherence,
        }
    }
}

/// Member of `members` minimizing total cosine distance to the others;
/// ties resolve to the lowest index.
fn medoid(members: &[usize], embeddings: &[Vec<f64>]) -> usize {
    debug_assert!(!members.is_empty());
    if members.len() == 1 {
        return members[0];
    }

    let mut best = members[0];
    let mut best_total = f64::INFINITY;
    for &candidate in members {
        let total: f64 = members
            .iter()
            .filter(|&&other| other != candidate)
            .map(|&other| cosine_distance(&embeddings[candidate], &embeddings[other]))
            .sum();
        if total < best_total {
            best_total = total;
            best = candidate;
        }
    }
    best
}

fn mean_pairwise_similarity(members: &[usize], embeddings: &[Vec<f64>]) -> f64 {
    if members.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0usize;
    for (slot, &a) in members.iter().enumerate() {
        for &b in &members[slot + 1..] {
            total += cosine_similarity(&embeddings[a], &embeddings[b]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

fn coherence_by_cluster(labels: &[i64], embeddings: &[Vec<f64>]) -> BTreeMap<i64, f64> {
    let mut members_by_label: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        if label != NOISE_LABEL {
            members_by_label.entry(label).or_default().push(index);
        }
    }
    members_by_label
        .into_iter()
        .map(|(label, members)| (label, mean_pairwise_similarity(&members, embeddings)))
        .collect()
}
