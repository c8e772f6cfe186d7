//! Decay engine
//!
//! Pure classifier over episodic rows: given a TTL policy, the current time
//! and the set of rows referenced by semantic records, partitions rows into
//! archive / prune / retain. No I/O happens here; the façade applies the
//! partition.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::episodic::{EpisodicRow, RowStatus};

/// Outcome counts of one decay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayReport {
    pub archived_count: usize,
    pub pruned_count: usize,
    pub retained_count: usize,
}

/// The rows each decay action applies to.
#[derive(Debug, Clone, Default)]
pub struct DecayPartition {
    pub to_archive: Vec<i64>,
    pub to_prune: Vec<i64>,
    pub retained: usize,
}

impl DecayPartition {
    pub fn report(&self) -> DecayReport {
        DecayReport {
            archived_count: self.to_archive.len(),
            pruned_count: self.to_prune.len(),
            retained_count: self.retained,
        }
    }
}

/// TTL-based classifier for episodic rows.
#[derive(Debug, Clone, Copy)]
pub struct DecayEngine {
    ttl: Duration,
}

impl DecayEngine {
    pub fn new(ttl_days: i64) -> Self {
        Self {
            ttl: Duration::days(ttl_days),
        }
    }

    /// Partition `rows`:
    /// - archive: active, older than the TTL, unreferenced
    /// - prune: already archived, older than twice the TTL, unreferenced
    /// - retain: everything else
    ///
    /// Rows carrying a semantic link or appearing in `referenced` never
    /// decay (immortal link).
    pub fn evaluate(
        &self,
        rows: &[EpisodicRow],
        referenced: &HashSet<i64>,
        now: DateTime<Utc>,
    ) -> DecayPartition {
        let mut partition = DecayPartition::default();
        for row in rows {
            let age = now - row.timestamp;
            let is_referenced = row.linked_semantic_id.is_some() || referenced.contains(&row.id);

            if is_referenced {
                partition.retained += 1;
            } else if row.status == RowStatus::Active && age > self.ttl {
                partition.to_archive.push(row.id);
            } else if row.status == RowStatus::Archived && age > self.ttl * 2 {
                partition.to_prune.push(row.id);
            } else {
                partition.retained += 1;
            }
        }
        partition
    }
}
