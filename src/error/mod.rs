use thiserror::Error;

/// Pipeline-level errors
///
/// Single-operation failures (one generation, one comparison, one evaluation,
/// one feedback call) are recovered locally by the component that issued them
/// and never surface here. The only hard pipeline error is an empty candidate
/// pool: with nothing to select or refine there is no documented default.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// A collaborator call failed and no local recovery applied
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// A storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// No candidates survived generation
    #[error("No candidates survived generation")]
    EmptyCandidatePool,

    /// An operation needs more candidates than the pool holds
    #[error("Not enough candidates: need at least {required}, got {actual}")]
    NotEnoughCandidates {
        /// Minimum pool size for the operation
        required: usize,
        /// Actual pool size
        actual: usize,
    },

    /// Invariant violation or unexpected internal state
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong
        message: String,
    },
}

/// Errors from external collaborator calls (generation, comparison,
/// evaluation, qualitative feedback, embedding)
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Call failed after exhausting retries
    #[error("Collaborator unavailable: {message} (retries: {retries})")]
    Unavailable {
        /// Last error observed
        message: String,
        /// Retries attempted
        retries: u32,
    },

    /// The remote API returned a non-success status
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The response could not be parsed into the expected shape
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Parse failure detail
        message: String,
    },

    /// The request exceeded its timeout
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not open or reach the database
    #[error("Database connection failed: {message}")]
    Connection {
        /// Connection failure detail
        message: String,
    },

    /// A query or row conversion failed
    #[error("Query failed: {message}")]
    Query {
        /// Query failure detail
        message: String,
    },

    /// The requested session does not exist
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// Missing session ID
        session_id: String,
    },

    /// Applying embedded migrations failed
    #[error("Migration failed: {message}")]
    Migration {
        /// Migration failure detail
        message: String,
    },

    /// Underlying driver error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for collaborator operations
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
