//! lookalike-store — SQLite-backed record store.
//!
//! Every operation opens its own connection and drops it before returning,
//! so no handle outlives a request. Appends run in a single transaction and
//! the database uses WAL journaling, letting readers scan concurrently with
//! a writer without ever seeing a partial row.

use lookalike_core::{IdentityRecord, NewIdentity, RecordId, RecordStore, StoreError};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT    NOT NULL CHECK (length(trim(name)) > 0),
    age        INTEGER NOT NULL CHECK (age >= 0),
    photo      BLOB    NOT NULL,
    created_at TEXT    NOT NULL
);
";

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Append-only identity store in a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn open_with_timeout(
        path: impl Into<PathBuf>,
        busy_timeout_ms: u64,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let store = Self {
            path,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        };
        let conn = store.connect()?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "wal", |row| row.get(0))
            .map_err(db_error)?;
        if !mode.eq_ignore_ascii_case("wal") {
            tracing::warn!(mode = %mode, "WAL journaling unavailable; readers may block on writes");
        }
        conn.execute_batch(SCHEMA).map_err(db_error)?;

        tracing::info!(path = %store.path.display(), "record store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count.max(0) as u64)
    }

    /// Fetch one record by id.
    pub fn get(&self, id: RecordId) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT id, name, age, photo, created_at FROM users WHERE id = ?1",
            params![id],
            raw_row,
        )
        .optional()
        .map_err(db_error)?
        .map(RawRow::into_record)
        .transpose()
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StoreError::Unavailable(format!("{}: {e}", self.path.display())))?;
        conn.busy_timeout(self.busy_timeout).map_err(db_error)?;
        Ok(conn)
    }
}

impl RecordStore for SqliteStore {
    fn append(&self, identity: &NewIdentity, photo: &[u8]) -> Result<RecordId, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(db_error)?;
        tx.execute(
            "INSERT INTO users (name, age, photo, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.name(),
                identity.age(),
                photo,
                chrono::Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_error)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(db_error)?;

        tracing::debug!(id, photo_bytes = photo.len(), "record appended");
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<IdentityRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT id, name, age, photo, created_at FROM users ORDER BY id")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], raw_row)
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;
        rows.into_iter().map(RawRow::into_record).collect()
    }
}

/// Row as read from SQLite, before range checks.
struct RawRow {
    id: i64,
    name: String,
    age: i64,
    photo: Vec<u8>,
    created_at: String,
}

impl RawRow {
    fn into_record(self) -> Result<IdentityRecord, StoreError> {
        let age = u32::try_from(self.age).map_err(|_| StoreError::Corrupt {
            id: self.id,
            reason: format!("age {} out of range", self.age),
        })?;
        Ok(IdentityRecord {
            id: self.id,
            name: self.name,
            age,
            photo: self.photo,
            created_at: self.created_at,
        })
    }
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        photo: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn db_error(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}
