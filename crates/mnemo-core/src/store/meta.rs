//! Metadata index
//!
//! Transactional SQLite mirror of every record header in the semantic store.
//! The partial unique index on `(target)` for active decisions keeps at most
//! one active decision per target at the database layer; violations surface
//! as [`MemoryError::Conflict`].
//! Connections are short-lived, one per operation, and never held across lock
//! acquisitions.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, warn};

use crate::error::{MemoryError, Result};
use crate::event::{EventKind, RecordStatus};
use crate::record;

/// One indexed record header.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRow {
    pub id: String,
    pub target: String,
    pub status: RecordStatus,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub superseded_by: Option<String>,
}

/// SQLite-backed metadata index over the semantic store.
pub struct MetaIndex {
    db_path: PathBuf,
}

impl MetaIndex {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let index = Self {
            db_path: db_path.into(),
        };
        index.init_schema()?;
        Ok(index)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS semantic_meta (
                 id TEXT PRIMARY KEY,
                 target TEXT NOT NULL,
                 status TEXT NOT NULL,
                 kind TEXT NOT NULL,
                 timestamp TEXT NOT NULL,
                 superseded_by TEXT
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_active_target
                 ON semantic_meta(target) WHERE status = 'active' AND kind = 'decision';
             CREATE INDEX IF NOT EXISTS idx_status ON semantic_meta(status);
             CREATE INDEX IF NOT EXISTS idx_target ON semantic_meta(target);",
        )?;
        Ok(())
    }

    /// Insert or replace one row. A duplicate active decision for a target
    /// is surfaced as a typed conflict.
    pub fn upsert(&self, row: &MetaRow) -> Result<()> {
        let conn = self.connect()?;
        let outcome = conn.execute(
            "INSERT INTO semantic_meta (id, target, status, kind, timestamp, superseded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 superseded_by = excluded.superseded_by",
            params![
                row.id,
                row.target,
                row.status.as_str(),
                row.kind.as_str(),
                row.timestamp.to_rfc3339(),
                row.superseded_by,
            ],
        );
        match outcome {
            Ok(_) => Ok(()),
            Err(err) if is_active_target_violation(&err) => Err(MemoryError::Conflict {
                target: row.target.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// Record id of the active decision for a target, if any.
    pub fn get_active(&self, target: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        let id = conn
            .query_row(
                "SELECT id FROM semantic_meta
                 WHERE target = ?1 AND status = 'active' AND kind = 'decision'",
                params![target],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn list_all(&self) -> Result<Vec<MetaRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, target, status, kind, timestamp, superseded_by
             FROM semantic_meta ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, target, status, kind, timestamp, superseded_by) in rows {
            let Some(status) = RecordStatus::parse_name(&status) else {
                warn!(%id, %status, "skipping meta row with unknown status");
                continue;
            };
            let Some(kind) = EventKind::parse_name(&kind) else {
                warn!(%id, %kind, "skipping meta row with unknown kind");
                continue;
            };
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| MemoryError::Schema(format!("bad timestamp in index: {}", e)))?
                .with_timezone(&Utc);
            out.push(MetaRow {
                id,
                target,
                status,
                kind,
                timestamp,
                superseded_by,
            });
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM semantic_meta", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM semantic_meta WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM semantic_meta", [])?;
        Ok(())
    }

    /// Truncate and reinsert from the parsed header of every record file.
    ///
    /// Called at start-up when the row count disagrees with the file count.
    pub fn rebuild_from_disk(&self, root: &Path) -> Result<()> {
        info!(root = %root.display(), "rebuilding semantic meta index from disk");
        self.clear()?;
        for id in super::record_files(root)? {
            let path = root.join(&id);
            let text = std::fs::read_to_string(&path)?;
            match record::decode_event(&text) {
                Ok((event, _)) => {
                    if let Some(decision) = event.context.as_decision() {
                        let row = MetaRow {
                            id: id.clone(),
                            target: decision.target.clone(),
                            status: decision.effective_status(event.kind),
                            kind: event.kind,
                            timestamp: event.timestamp,
                            superseded_by: decision.superseded_by.clone(),
                        };
                        // Constraint violations are left for the integrity
                        // checker to report against the corpus.
                        if let Err(err) = self.upsert(&row) {
                            warn!(%id, %err, "failed to index record during rebuild");
                        }
                    }
                }
                Err(err) => {
                    warn!(%id, %err, "failed to index record during rebuild");
                }
            }
        }
        Ok(())
    }
}

fn is_active_target_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("idx_active_target")
    )
}
