//! Episodic store
//!
//! Bounded append log of ingested events over SQLite. Rows are append-only
//! with an `active`/`archived` status, an optional link to the semantic
//! record their event produced, and time-range queries ordered newest first.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::event::{EventKind, MemoryEvent, Source};

/// Row lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Active,
    Archived,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Active => "active",
            RowStatus::Archived => "archived",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RowStatus::Active),
            "archived" => Some(RowStatus::Archived),
            _ => None,
        }
    }
}

/// One episodic row: the ingested event plus log bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicRow {
    pub id: i64,
    pub source: Source,
    pub kind: EventKind,
    pub content: String,
    pub context: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub status: RowStatus,
    pub linked_semantic_id: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

impl EpisodicRow {
    /// Target named by this row's context, if any.
    pub fn target(&self) -> Option<&str> {
        self.context.get("target").and_then(|v| v.as_str())
    }
}

/// SQLite-backed append log.
pub struct EpisodicStore {
    conn: Mutex<Connection>,
}

impl EpisodicStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let conn = Connection::open(db_path.into())?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS episodic_events (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 schema_version INTEGER NOT NULL DEFAULT 1,
                 source TEXT NOT NULL,
                 kind TEXT NOT NULL,
                 content TEXT NOT NULL,
                 context TEXT NOT NULL DEFAULT '{}',
                 timestamp TEXT NOT NULL,
                 status TEXT NOT NULL DEFAULT 'active',
                 linked_semantic_id TEXT,
                 ingested_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_episodic_timestamp
                 ON episodic_events(timestamp);
             CREATE INDEX IF NOT EXISTS idx_episodic_status
                 ON episodic_events(status);
             CREATE INDEX IF NOT EXISTS idx_episodic_linked
                 ON episodic_events(linked_semantic_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MemoryError::Schema("episodic connection poisoned".into()))
    }

    /// Append one event; returns the new row id.
    pub fn append(&self, event: &MemoryEvent, linked_id: Option<&str>) -> Result<i64> {
        let context = serde_json::to_value(&event.context)
            .map_err(|e| MemoryError::Codec(format!("unserializable context: {}", e)))?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO episodic_events
                 (schema_version, source, kind, content, context, timestamp,
                  status, linked_semantic_id, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8)",
            params![
                event.schema_version,
                event.source.as_str(),
                event.kind.as_str(),
                event.content,
                context.to_string(),
                event.timestamp.to_rfc3339(),
                linked_id,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Query rows, newest first; ties on timestamp break by id so the order
    /// is stable.
    pub fn query(
        &self,
        limit: usize,
        status: Option<RowStatus>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<EpisodicRow>> {
        let mut sql = String::from(
            "SELECT id, source, kind, content, context, timestamp, status,
                    linked_semantic_id, ingested_at
             FROM episodic_events WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            args.push(Box::new(status.as_str().to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(since.to_rfc3339()));
        }
        if let Some(until) = until {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(until.to_rfc3339()));
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(hydrate_row).collect()
    }

    /// Set the semantic back-pointer on a row. Idempotent.
    pub fn link_to_semantic(&self, row_id: i64, semantic_id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE episodic_events SET linked_semantic_id = ?1 WHERE id = ?2",
            params![semantic_id, row_id],
        )?;
        if changed == 0 {
            return Err(MemoryError::NotFound(format!("episodic row {}", row_id)));
        }
        Ok(())
    }

    /// Transition rows to `archived`.
    pub fn mark_archived(&self, ids: &[i64]) -> Result<()> {
        let conn = self.lock_conn()?;
        for id in ids {
            conn.execute(
                "UPDATE episodic_events SET status = 'archived' WHERE id = ?1",
                params![id],
            )?;
        }
        Ok(())
    }

    /// Physically delete rows. Only the decay engine calls this, and only for
    /// archived, unreferenced rows.
    pub fn physical_prune(&self, ids: &[i64]) -> Result<()> {
        let conn = self.lock_conn()?;
        for id in ids {
            conn.execute("DELETE FROM episodic_events WHERE id = ?1", params![id])?;
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM episodic_events", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

type RawRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
);

fn hydrate_row(raw: RawRow) -> Result<EpisodicRow> {
    let (id, source, kind, content, context, timestamp, status, linked_semantic_id, ingested_at) =
        raw;
    Ok(EpisodicRow {
        id,
        source: Source::parse_name(&source),
        kind: EventKind::parse_name(&kind)
            .ok_or_else(|| MemoryError::Schema(format!("unknown kind '{}' in row {}", kind, id)))?,
        content,
        context: serde_json::from_str(&context).unwrap_or(serde_json::Value::Null),
        timestamp: parse_ts(&timestamp)?,
        status: RowStatus::parse_name(&status)
            .ok_or_else(|| MemoryError::Schema(format!("unknown status '{}' in row {}", status, id)))?,
        linked_semantic_id,
        ingested_at: parse_ts(&ingested_at)?,
    })
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| MemoryError::Schema(format!("bad timestamp '{}': {}", s, e)))?
        .with_timezone(&Utc))
}
