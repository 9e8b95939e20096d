use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// Format used for every timestamp this layer writes. Fixed width, so SQL
/// string comparison matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// How long a connection waits for another writer's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Columns added after the first release. Older files get them via
/// `ALTER TABLE ... ADD COLUMN` on startup.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("users", "username TEXT"),
    ("users", "first_name TEXT"),
    ("users", "last_name TEXT"),
    ("users", "verified INTEGER DEFAULT 0"),
    ("applications", "cover_letter_path TEXT"),
    ("applications", "resume_path TEXT"),
];

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'candidate',
        is_banned INTEGER NOT NULL DEFAULT 0,
        banned_until TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        username TEXT,
        first_name TEXT,
        last_name TEXT,
        verified INTEGER DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        employer_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        location_text TEXT,
        lat REAL,
        lng REAL,
        salary TEXT,
        tags TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (employer_id) REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS applications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        cover_letter TEXT,
        resume_text TEXT,
        cover_letter_path TEXT,
        resume_path TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (job_id) REFERENCES jobs(id),
        FOREIGN KEY (user_id) REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS ratings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        target_type TEXT NOT NULL,
        target_id INTEGER NOT NULL,
        rater_id INTEGER NOT NULL,
        rating INTEGER NOT NULL CHECK (rating >= 1 AND rating <= 5),
        comment TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (rater_id) REFERENCES users(id)
    );

    CREATE TABLE IF NOT EXISTS tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token TEXT UNIQUE NOT NULL,
        email TEXT NOT NULL,
        purpose TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );
"#;

// Indexes reference columns that may only exist after patching.
const INDEXES: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_jobs_employer ON jobs(employer_id);
    CREATE INDEX IF NOT EXISTS idx_applications_job ON applications(job_id);
    CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id);
    CREATE INDEX IF NOT EXISTS idx_ratings_target ON ratings(target_type, target_id);
    CREATE INDEX IF NOT EXISTS idx_ratings_rater ON ratings(rater_id);
    CREATE INDEX IF NOT EXISTS idx_tokens_expires ON tokens(expires_at);
"#;

/// Handle to the job-board database file.
///
/// Holds only the location. Every accessor opens its own connection and
/// drops it before returning, so a `Store` can be cloned freely and shared
/// across threads.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform data directory.
    pub fn open_default() -> Self {
        Self::new(Self::default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `jobboard.db` in the platform data directory, or the working directory
    /// when no home directory can be resolved.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "jobboard").map_or_else(
            || PathBuf::from("jobboard.db"),
            |dirs| dirs.data_dir().join("jobboard.db"),
        )
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        debug!(path = %self.path.display(), "opening connection");
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Create missing tables and patch missing columns. Safe to call on every
    /// start; never drops or rewrites data.
    pub fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;

        for (table, column_def) in ADDITIVE_COLUMNS {
            if let Err(e) = add_column_if_missing(&conn, table, column_def) {
                warn!(table, column = column_def, error = %e, "failed to add column");
            }
        }

        conn.execute_batch(INDEXES)?;
        info!(path = %self.path.display(), "database initialized");
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.path.exists() {
            return Err(StoreError::NotInitialized(self.path.clone()));
        }
        let conn = self.connect()?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
             AND name IN ('users', 'jobs', 'applications', 'ratings', 'tokens')",
            [],
            |row| row.get(0),
        )?;
        if tables < 5 {
            return Err(StoreError::NotInitialized(self.path.clone()));
        }
        Ok(())
    }

    /// Live column names of `table`, in declaration order.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.connect()?;
        table_columns(&conn, table)
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{table}')"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn add_column_if_missing(conn: &Connection, table: &str, column_def: &str) -> Result<bool> {
    let name = column_def.split_whitespace().next().unwrap_or(column_def);
    if table_columns(conn, table)?.iter().any(|c| c == name) {
        return Ok(false);
    }
    conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column_def}"))?;
    info!(table, column = name, "added column");
    Ok(true)
}

pub(crate) fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn now_iso() -> String {
    format_timestamp(Utc::now().naive_utc())
}

/// Parse a timestamp in the layout this crate writes, or the space-separated
/// `CURRENT_TIMESTAMP` layout. The fractional part is optional.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}
