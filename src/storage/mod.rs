//! Optional persistence for refinement sessions.
//!
//! The orchestrator treats storage as a fire-and-forget side channel:
//! per-generation snapshots and the final session record are written if a
//! store is attached, and write failures are logged without ever blocking
//! or failing the refinement loop.

mod sqlite;

pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::StrategyCandidate;
use crate::error::StorageResult;
use crate::metrics::RefinementMetrics;

/// One persisted generation of a refinement session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    /// Session the snapshot belongs to
    pub session_id: String,
    /// Generation index, 0 = original candidate
    pub generation: u32,
    /// The candidate at this generation
    pub candidate: StrategyCandidate,
    /// Recorded metrics for this generation
    pub metrics: RefinementMetrics,
    /// When the snapshot was written
    pub created_at: DateTime<Utc>,
}

/// Final record of a completed refinement session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier
    pub session_id: String,
    /// Problem context the session refined against
    pub context: String,
    /// When the session started
    pub created_at: DateTime<Utc>,
    /// When the session completed
    pub completed_at: DateTime<Utc>,
    /// Generations produced, including generation 0
    pub generations: u32,
    /// Terminal completion reason
    pub completion_reason: String,
    /// Best overall score reached
    pub best_score: f64,
    /// Candidate that achieved the best score
    pub best_candidate: StrategyCandidate,
    /// Full metrics history, oldest first
    pub metrics_history: Vec<RefinementMetrics>,
    /// One feedback summary line per generation
    pub feedback_summaries: Vec<String>,
    /// Total refinement cost attributed to the session
    pub total_cost: f64,
}

/// Persistence interface for refinement sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist one generation snapshot.
    async fn save_snapshot(&self, snapshot: &GenerationSnapshot) -> StorageResult<()>;

    /// Snapshots for a session, ordered by generation.
    async fn session_snapshots(&self, session_id: &str)
        -> StorageResult<Vec<GenerationSnapshot>>;

    /// Persist the final session record (insert or replace).
    async fn save_session(&self, record: &SessionRecord) -> StorageResult<()>;

    /// Load a session record by ID.
    async fn get_session(&self, session_id: &str) -> StorageResult<Option<SessionRecord>>;

    /// IDs of all persisted sessions, most recent first.
    async fn list_sessions(&self) -> StorageResult<Vec<String>>;
}
