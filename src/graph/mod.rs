//! Per-candidate step dependency graphs.
//!
//! Each candidate's steps become nodes of a directed graph; an edge i -> j
//! (i < j) means step i's outcome satisfies one of step j's prerequisites.
//! The graph is an arena of step records plus adjacency index lists, with no
//! back-pointers; acyclicity is verified by an explicit validation pass
//! after construction rather than assumed.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::StrategyCandidate;
use crate::config::GraphConfig;

// ============================================================================
// Step Graph
// ============================================================================

/// A node of the step graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepNode {
    /// Step index in the candidate's original order
    pub index: usize,
    /// The step's action text
    pub action: String,
}

/// Directed graph over a candidate's steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepGraph {
    nodes: Vec<StepNode>,
    /// Adjacency lists: `edges[i]` holds the successors of node i
    edges: Vec<Vec<usize>>,
    /// How many edges were force-added to connect adjacent steps
    forced_edge_count: usize,
}

impl StepGraph {
    /// Create a graph with `nodes` and no edges.
    pub fn with_nodes(nodes: Vec<StepNode>) -> Self {
        let edges = vec![Vec::new(); nodes.len()];
        Self {
            nodes,
            edges,
            forced_edge_count: 0,
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    /// Number of edges that were force-added for connectivity.
    pub fn forced_edge_count(&self) -> usize {
        self.forced_edge_count
    }

    /// Borrow the nodes.
    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    /// Successors of node `from`.
    pub fn successors(&self, from: usize) -> &[usize] {
        &self.edges[from]
    }

    /// Add an edge, ignoring duplicates.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    /// Whether a direct edge exists.
    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.edges[from].contains(&to)
    }

    /// Whether any directed path connects `from` to `to`.
    pub fn has_path(&self, from: usize, to: usize) -> bool {
        if from == to {
            return true;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if visited[node] {
                continue;
            }
            visited[node] = true;
            stack.extend(self.edges[node].iter().copied());
        }
        false
    }

    /// In-degree of every node.
    pub fn in_degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.nodes.len()];
        for targets in &self.edges {
            for &to in targets {
                degrees[to] += 1;
            }
        }
        degrees
    }

    /// Topological order of the nodes, or `None` if the graph has a cycle.
    ///
    /// Ties are broken by original index, so the order is deterministic.
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let mut degrees = self.in_degrees();
        let mut ready: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| degrees[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(&next) = ready.iter().min() {
            ready.retain(|&n| n != next);
            order.push(next);
            for &to in &self.edges[next] {
                degrees[to] -= 1;
                if degrees[to] == 0 {
                    ready.push(to);
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }

    /// Whether the graph is acyclic.
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    /// Narrative flow: topological order when acyclic; otherwise a
    /// best-effort linearization by (in-degree ascending, original index).
    pub fn narrative_flow(&self) -> Vec<usize> {
        if let Some(order) = self.topological_order() {
            return order;
        }

        let degrees = self.in_degrees();
        let mut order: Vec<usize> = (0..self.nodes.len()).collect();
        order.sort_by_key(|&i| (degrees[i], i));
        order
    }

    /// Shortest-path depth of each node from node 0; `None` for nodes
    /// unreachable from node 0.
    pub fn depths_from_root(&self) -> Vec<Option<usize>> {
        let mut depths = vec![None; self.nodes.len()];
        if self.nodes.is_empty() {
            return depths;
        }

        depths[0] = Some(0);
        let mut queue = VecDeque::from([0]);
        while let Some(node) = queue.pop_front() {
            let depth = depths[node].expect("queued nodes have a depth");
            for &to in &self.edges[node] {
                if depths[to].is_none() {
                    depths[to] = Some(depth + 1);
                    queue.push_back(to);
                }
            }
        }
        depths
    }

    /// Largest count of nodes sharing the same shortest-path depth from
    /// node 0.
    pub fn max_width(&self) -> usize {
        let depths = self.depths_from_root();
        let mut counts = std::collections::HashMap::new();
        for depth in depths.into_iter().flatten() {
            *counts.entry(depth).or_insert(0usize) += 1;
        }
        counts.values().copied().max().unwrap_or(0)
    }

    /// Whether the graph is a simple linear chain.
    pub fn is_linear_chain(&self) -> bool {
        self.node_count() > 0 && self.edge_count() == self.node_count() - 1
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Whether an outcome satisfies a prerequisite: a case-insensitive
/// substring match in either direction, or at least
/// `config.min_shared_tokens` shared whitespace tokens.
fn satisfies(outcome: &str, prerequisite: &str, config: &GraphConfig) -> bool {
    let outcome_lower = outcome.to_lowercase();
    let prerequisite_lower = prerequisite.to_lowercase();
    if outcome_lower.is_empty() || prerequisite_lower.is_empty() {
        return false;
    }

    if outcome_lower.contains(&prerequisite_lower) || prerequisite_lower.contains(&outcome_lower) {
        return true;
    }

    let outcome_tokens: std::collections::HashSet<&str> =
        outcome_lower.split_whitespace().collect();
    let shared = prerequisite_lower
        .split_whitespace()
        .collect::<std::collections::HashSet<&str>>()
        .intersection(&outcome_tokens)
        .count();
    shared >= config.min_shared_tokens
}

/// Build the dependency graph for one candidate.
///
/// After the heuristic pass, every adjacent index pair (i, i+1) lacking both
/// a direct edge and any existing path gets a forced edge so the ordering
/// stays connected even when no textual dependency was found.
pub fn build_step_graph(candidate: &StrategyCandidate, config: &GraphConfig) -> StepGraph {
    let nodes = candidate
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| StepNode {
            index,
            action: step.action.clone(),
        })
        .collect();
    let mut graph = StepGraph::with_nodes(nodes);

    for i in 0..candidate.steps.len() {
        for j in (i + 1)..candidate.steps.len() {
            let outcome = &candidate.steps[i].outcome;
            let satisfied = candidate.steps[j]
                .prerequisites
                .iter()
                .any(|prerequisite| satisfies(outcome, prerequisite, config));
            if satisfied {
                graph.add_edge(i, j);
            }
        }
    }

    for i in 0..candidate.steps.len().saturating_sub(1) {
        if !graph.has_edge(i, i + 1) && !graph.has_path(i, i + 1) {
            graph.add_edge(i, i + 1);
            graph.forced_edge_count += 1;
        }
    }

    // Edges only ever point forward, so a cycle here means corrupt input
    // rather than a builder bug; flag it but keep the graph usable.
    if !graph.is_acyclic() {
        warn!(
            title = %candidate.title,
            steps = candidate.steps.len(),
            "Step dependency graph contains a cycle"
        );
    }

    debug!(
        title = %candidate.title,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        forced = graph.forced_edge_count,
        "Built step dependency graph"
    );

    graph
}

// ============================================================================
// Population Diagnostics
// ============================================================================

/// Aggregate structure statistics over a population of step graphs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDiagnostics {
    /// Mean node count
    pub avg_node_count: f64,
    /// Mean edge count
    pub avg_edge_count: f64,
    /// Mean maximum width (nodes sharing a shortest-path depth)
    pub avg_max_width: f64,
    /// Fraction of candidates whose graph is a simple linear chain
    pub linear_chain_fraction: f64,
}

impl GraphDiagnostics {
    /// Aggregate over a population; all zeros for an empty population.
    pub fn aggregate(graphs: &[StepGraph]) -> Self {
        if graphs.is_empty() {
            return Self {
                avg_node_count: 0.0,
                avg_edge_count: 0.0,
                avg_max_width: 0.0,
                linear_chain_fraction: 0.0,
            };
        }

        let count = graphs.len() as f64;
        Self {
            avg_node_count: graphs.iter().map(|g| g.node_count() as f64).sum::<f64>() / count,
            avg_edge_count: graphs.iter().map(|g| g.edge_count() as f64).sum::<f64>() / count,
            avg_max_width: graphs.iter().map(|g| g.max_width() as f64).sum::<f64>() / count,
            linear_chain_fraction: graphs.iter().filter(|g| g.is_linear_chain()).count() as f64
                / count,
        }
    }
}
