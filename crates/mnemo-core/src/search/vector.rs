//! Vector index over decision records
//!
//! Read-mostly similarity layer: one embedding per record id, stored as a
//! JSON blob next to the metadata index, scanned with cosine similarity.
//! Relevance may shift when the embedder changes; stored records are never
//! touched by a swap.

use std::path::PathBuf;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::search::cosine_similarity;

/// One scored search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub preview: String,
    /// Filled by the façade from the metadata index.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

/// SQLite-backed embedding index.
pub struct VectorStore {
    db_path: PathBuf,
}

impl VectorStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            db_path: db_path.into(),
        };
        let conn = store.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vector_index (
                 decision_id TEXT PRIMARY KEY,
                 embedding TEXT NOT NULL,
                 preview TEXT NOT NULL
             );",
        )?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(conn)
    }

    /// Insert or replace one record's embedding.
    pub fn upsert(&self, decision_id: &str, embedding: &[f32], preview: &str) -> Result<()> {
        let blob = serde_json::to_string(embedding)
            .map_err(|e| MemoryError::Codec(format!("unserializable embedding: {}", e)))?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO vector_index (decision_id, embedding, preview)
             VALUES (?1, ?2, ?3)",
            params![decision_id, blob, preview],
        )?;
        Ok(())
    }

    pub fn remove(&self, decision_id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM vector_index WHERE decision_id = ?1",
            params![decision_id],
        )?;
        Ok(())
    }

    /// Ids currently indexed.
    pub fn indexed_ids(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT decision_id FROM vector_index")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Cosine-similarity scan, best first.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT decision_id, embedding, preview FROM vector_index")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter_map(|(id, blob, preview)| {
                let embedding: Vec<f32> = serde_json::from_str(&blob).ok()?;
                Some(SearchHit {
                    id,
                    score: cosine_similarity(query, &embedding),
                    preview,
                    status: None,
                    target: None,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }
}
