//! SQLite-backed user store.
//!
//! One table keyed by the external authentication provider's identity id.
//! `sync` is insert-if-absent: the first call for an identity id creates
//! the row, every later call is a no-op that reports the existing row.
//! There is no update-on-change — a changed name or email after first sync
//! is ignored.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::AppError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    identity_id TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    email       TEXT NOT NULL,
    image       TEXT,
    created_at  TEXT NOT NULL
);
";

/// Incoming sync request fields.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub identity_id: String,
    pub image: Option<String>,
}

/// A stored user row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub identity_id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub created_at: String,
}

/// Result of a sync call: the row id plus whether this call created it.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub id: i64,
    pub created: bool,
}

/// Thread-safe handle over one SQLite connection.
///
/// `rusqlite::Connection` is `Send` but not `Sync`; the mutex makes the
/// store shareable across blocking tasks.
pub struct UserStore {
    conn: Mutex<Connection>,
}

impl UserStore {
    /// Open (or create) the store at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)
            .map_err(|e| AppError::Store(format!("cannot open {}: {e}", path.display())))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Store(format!("schema init failed: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert the user unless a row with the same identity id exists.
    pub fn sync(&self, user: &NewUser) -> Result<SyncOutcome, AppError> {
        let conn = self.lock()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE identity_id = ?1",
                params![user.identity_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("lookup failed: {e}")))?;

        if let Some(id) = existing {
            return Ok(SyncOutcome { id, created: false });
        }

        conn.execute(
            "INSERT INTO users (identity_id, name, email, image, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.identity_id,
                user.name,
                user.email,
                user.image,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Store(format!("insert failed: {e}")))?;

        Ok(SyncOutcome { id: conn.last_insert_rowid(), created: true })
    }

    /// Fetch a user row by identity id.
    pub fn get_by_identity(&self, identity_id: &str) -> Result<Option<UserRecord>, AppError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, identity_id, name, email, image, created_at
             FROM users WHERE identity_id = ?1",
            params![identity_id],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    identity_id: row.get(1)?,
                    name: row.get(2)?,
                    email: row.get(3)?,
                    image: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Store(format!("lookup failed: {e}")))
    }

    /// Number of stored users.
    pub fn count(&self) -> Result<i64, AppError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(|e| AppError::Store(format!("count failed: {e}")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AppError> {
        self.conn
            .lock()
            .map_err(|_| AppError::Store("user store mutex poisoned".into()))
    }
}
