//! Session Checkpoint Store
//!
//! Persists `SessionCheckpoint`s keyed by session id so that a session
//! suspended for approval can be resumed by another process. Two backends:
//! an in-process map and SQLite (rusqlite with r2d2 connection pooling).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::models::checkpoint::{SessionCheckpoint, SessionStatus};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::database_path;

/// Storage backend for session checkpoints.
pub trait CheckpointStore: Send + Sync {
    /// Insert or replace the checkpoint of `checkpoint.session_id`.
    fn save(&self, checkpoint: &SessionCheckpoint) -> AppResult<()>;

    fn load(&self, session_id: &str) -> AppResult<Option<SessionCheckpoint>>;

    /// Returns `true` when a checkpoint was removed.
    fn delete(&self, session_id: &str) -> AppResult<bool>;

    /// Atomically move a session from `from` to `to`. Returns `false` when
    /// the session is missing or not in `from`, leaving it untouched.
    fn claim(&self, session_id: &str, from: SessionStatus, to: SessionStatus) -> AppResult<bool>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Checkpoints held in process memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    sessions: Mutex<HashMap<String, SessionCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, SessionCheckpoint>>> {
        self.sessions
            .lock()
            .map_err(|_| AppError::database("checkpoint store lock poisoned"))
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, checkpoint: &SessionCheckpoint) -> AppResult<()> {
        self.sessions()?
            .insert(checkpoint.session_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, session_id: &str) -> AppResult<Option<SessionCheckpoint>> {
        Ok(self.sessions()?.get(session_id).cloned())
    }

    fn delete(&self, session_id: &str) -> AppResult<bool> {
        Ok(self.sessions()?.remove(session_id).is_some())
    }

    fn claim(&self, session_id: &str, from: SessionStatus, to: SessionStatus) -> AppResult<bool> {
        let mut sessions = self.sessions()?;
        match sessions.get_mut(session_id) {
            Some(checkpoint) if checkpoint.status == from => {
                checkpoint.status = to;
                checkpoint.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Checkpoints stored as JSON payloads in a SQLite table.
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: DbPool,
}

impl SqliteCheckpointStore {
    /// Open (or create) the default database at `~/.netdiag/sessions.db`.
    pub fn open_default() -> AppResult<Self> {
        Self::open(database_path()?)
    }

    /// Open (or create) a database file with connection pooling.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database for testing.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS diagnosis_sessions (
                session_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_diagnosis_sessions_status
                ON diagnosis_sessions(status)",
            [],
        )?;
        Ok(())
    }

    /// Ids of all sessions currently waiting on approval, oldest first.
    pub fn awaiting_sessions(&self) -> AppResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT session_id FROM diagnosis_sessions
             WHERE status = 'awaiting_approval'
             ORDER BY created_at ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, checkpoint: &SessionCheckpoint) -> AppResult<()> {
        let payload = serde_json::to_string(checkpoint)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO diagnosis_sessions (session_id, status, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id) DO UPDATE SET
                status = excluded.status,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![
                checkpoint.session_id,
                checkpoint.status.as_str(),
                payload,
                checkpoint.created_at.to_rfc3339(),
                checkpoint.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> AppResult<Option<SessionCheckpoint>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM diagnosis_sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, session_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM diagnosis_sessions WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(removed > 0)
    }

    fn claim(&self, session_id: &str, from: SessionStatus, to: SessionStatus) -> AppResult<bool> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        // Column and payload change in one statement; the WHERE clause is the lock.
        let updated = conn.execute(
            "UPDATE diagnosis_sessions
             SET status = ?3,
                 payload = json_set(payload, '$.status', ?3, '$.updatedAt', ?4),
                 updated_at = ?4
             WHERE session_id = ?1 AND status = ?2",
            params![session_id, from.as_str(), to.as_str(), now],
        )?;
        Ok(updated == 1)
    }
}
