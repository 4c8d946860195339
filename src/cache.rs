//! Change tracking backed by SQLite.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::types::PullRequest;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Remembers the last modification time seen for each pull request.
pub struct ChangeTracker {
    conn: Connection,
}

impl ChangeTracker {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open cache database {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS pr_data (
                pr_id      INTEGER PRIMARY KEY,
                updated_at TEXT
            )
            "#,
            [],
        )
        .context("Failed to create pr_data table")?;
        Ok(Self { conn })
    }

    fn stored(&self, pr_id: u64) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT updated_at FROM pr_data WHERE pr_id = ?1",
                params![pr_id as i64],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read cache entry for PR id {pr_id}"))
    }

    pub fn last_seen(&self, pr_id: u64) -> Result<Option<DateTime<Utc>>> {
        self.stored(pr_id)?
            .map(|s| {
                parse_timestamp(&s)
                    .with_context(|| format!("Malformed cached timestamp '{s}' for PR id {pr_id}"))
            })
            .transpose()
    }

    /// Stores `updated_at` as the last seen time of `pr_id`.
    pub fn record(&self, pr_id: u64, updated_at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO pr_data (pr_id, updated_at) VALUES (?1, ?2)
                ON CONFLICT(pr_id) DO UPDATE SET updated_at = excluded.updated_at
                "#,
                params![pr_id as i64, updated_at.format(TIME_FORMAT).to_string()],
            )
            .with_context(|| format!("Failed to record PR id {pr_id}"))?;
        Ok(())
    }

    /// Whether `pr` is new or modified since it was last recorded.
    ///
    /// An entry that cannot be read back counts as changed, so the next
    /// successful record overwrites it.
    pub fn is_changed(&self, pr: &PullRequest) -> Result<bool> {
        let Some(stored) = self.stored(pr.id)? else {
            return Ok(true);
        };
        match parse_timestamp(&stored) {
            Ok(seen) => Ok(seen != pr.updated_at.trunc_subsecs(0)),
            Err(e) => {
                warn!(pr = pr.number, stored = %stored, "ignoring malformed cache entry: {}", e);
                Ok(true)
            }
        }
    }
}

fn parse_timestamp(s: &str) -> chrono::ParseResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT).map(|naive| naive.and_utc())
}
