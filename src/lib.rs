//! # Stratagem
//!
//! A selection-and-refinement pipeline for strategy candidates: structured
//! multi-step plans produced by external collaborators and scored along five
//! quality dimensions.
//!
//! ## Features
//!
//! - **Batch Generation**: bounded-concurrency fan-out with per-call retries
//! - **Consensus Selection**: density clustering over embeddings picks a
//!   trunk (medoid of the largest cluster) and twigs (outliers and small
//!   clusters)
//! - **Tournaments**: elimination, round-robin, and technique-grouped
//!   pairwise comparison with majority voting
//! - **Dependency Graphs**: per-candidate step DAGs from prerequisite and
//!   outcome matching
//! - **Refinement Loop**: evaluate, analyze, improve, and stop on any of
//!   eight terminal conditions, with per-generation performance tracking
//! - **Persistence**: optional SQLite session snapshots and markdown reports
//!
//! ## Architecture
//!
//! ```text
//! Generator (HTTP) → Candidate Pool → Embeddings → Consensus / Tournament
//!                                                        ↓
//!                          Orchestrator ← trunk → (twigs)
//!                     evaluate → track → analyze → improve
//!                                   ↓
//!                             SQLite (optional)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stratagem::collab::http::PipeGateway;
//! use stratagem::config::StratagemConfig;
//! use stratagem::consensus::ConsensusSelector;
//! use stratagem::embedding::embed_pool;
//! use stratagem::generation::BatchGenerator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StratagemConfig::from_env()?;
//!     let gateway = Arc::new(PipeGateway::new(
//!         &config.remote,
//!         config.request.clone(),
//!         config.pipes.clone(),
//!     )?);
//!
//!     let batch = BatchGenerator::new(gateway.clone(), config.generation.clone());
//!     let mut pool = batch.generate_pool("enter the northern market").await?;
//!     embed_pool(gateway.as_ref(), &mut pool).await?;
//!
//!     let selector = ConsensusSelector::new(config.selection.clone());
//!     let outcome = selector.select(&mut pool)?;
//!     println!("trunk: {}", pool.get(outcome.trunk_index).unwrap().candidate.title);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Candidate pool and per-candidate metadata.
pub mod candidate;
/// Capability interfaces for external collaborators, live and fixed.
pub mod collab;
/// Configuration for every pipeline component.
pub mod config;
/// Consensus (clustering) selection of a trunk and twigs.
pub mod consensus;
/// Candidate serialization and similarity utilities for embeddings.
pub mod embedding;
/// Error types and result aliases.
pub mod error;
/// Feedback analysis, improvement suggestions, and stop decisions.
pub mod feedback;
/// Bounded-concurrency batch candidate generation.
pub mod generation;
/// Per-candidate step dependency graphs.
pub mod graph;
/// Rule-based and generative candidate improvement.
pub mod improver;
/// Metric types for evaluation and refinement tracking.
pub mod metrics;
/// The refinement loop orchestrator.
pub mod orchestrator;
/// Markdown session reports.
pub mod report;
/// Optional SQLite session persistence.
pub mod storage;
/// Multi-generation performance tracking.
pub mod tracker;
/// Pairwise tournament selection.
pub mod tournament;

pub use candidate::{CandidateMetadata, CandidatePool, PooledCandidate, StrategyCandidate};
pub use config::StratagemConfig;
pub use error::{PipelineError, PipelineResult};
pub use metrics::{RefinementMetrics, StrategicMetrics};
pub use orchestrator::{CompletionReason, RefinementOrchestrator, RefinementSession};
