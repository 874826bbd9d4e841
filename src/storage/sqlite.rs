use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{GenerationSnapshot, SessionRecord, SessionStore};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a new SQLite session store
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|e| StorageError::Query {
        message: format!("Failed to serialize value: {}", e),
    })
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> StorageResult<T> {
    serde_json::from_str(json).map_err(|e| StorageError::Query {
        message: format!("Failed to parse stored JSON: {}", e),
    })
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid stored timestamp: {}", e),
        })
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    session_id: String,
    generation: i64,
    candidate: String,
    metrics: String,
    created_at: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> StorageResult<GenerationSnapshot> {
        Ok(GenerationSnapshot {
            session_id: self.session_id,
            generation: self.generation as u32,
            candidate: from_json(&self.candidate)?,
            metrics: from_json(&self.metrics)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    context: String,
    created_at: String,
    completed_at: String,
    generations: i64,
    completion_reason: String,
    best_score: f64,
    best_candidate: String,
    metrics_history: String,
    feedback_summaries: String,
    total_cost: f64,
}

impl SessionRow {
    fn into_record(self) -> StorageResult<SessionRecord> {
        Ok(SessionRecord {
            session_id: self.session_id,
            context: self.context,
            created_at: parse_timestamp(&self.created_at)?,
            completed_at: parse_timestamp(&self.completed_at)?,
            generations: self.generations as u32,
            completion_reason: self.completion_reason,
            best_score: self.best_score,
            best_candidate: from_json(&self.best_candidate)?,
            metrics_history: from_json(&self.metrics_history)?,
            feedback_summaries: from_json(&self.feedback_summaries)?,
            total_cost: self.total_cost,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save_snapshot(&self, snapshot: &GenerationSnapshot) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (session_id, generation, candidate, metrics, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.session_id)
        .bind(snapshot.generation as i64)
        .bind(to_json(&snapshot.candidate)?)
        .bind(to_json(&snapshot.metrics)?)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn session_snapshots(
        &self,
        session_id: &str,
    ) -> StorageResult<Vec<GenerationSnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT session_id, generation, candidate, metrics, created_at
            FROM snapshots
            WHERE session_id = ?
            ORDER BY generation ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    async fn save_session(&self, record: &SessionRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sessions
                (session_id, context, created_at, completed_at, generations,
                 completion_reason, best_score, best_candidate, metrics_history,
                 feedback_summaries, total_cost)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.session_id)
        .bind(&record.context)
        .bind(record.created_at.to_rfc3339())
        .bind(record.completed_at.to_rfc3339())
        .bind(record.generations as i64)
        .bind(&record.completion_reason)
        .bind(record.best_score)
        .bind(to_json(&record.best_candidate)?)
        .bind(to_json(&record.metrics_history)?)
        .bind(to_json(&record.feedback_summaries)?)
        .bind(record.total_cost)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> StorageResult<Option<SessionRecord>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, context, created_at, completed_at, generations,
                   completion_reason, best_score, best_candidate, metrics_history,
                   feedback_summaries, total_cost
            FROM sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_record).transpose()
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT session_id
            FROM sessions
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
