//! Conflict engine
//!
//! Identifies the active decisions a candidate event collides with. Only
//! decision-kind events can conflict; the conflict set is every active
//! decision record governing the same target.

use crate::error::Result;
use crate::event::{EventKind, MemoryEvent};
use crate::store::SemanticStore;

/// Detects active-decision conflicts for candidate events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictEngine;

impl ConflictEngine {
    /// Record ids of active decisions sharing the event's target.
    pub fn conflict_ids(&self, event: &MemoryEvent, store: &SemanticStore) -> Result<Vec<String>> {
        if event.kind != EventKind::Decision {
            return Ok(Vec::new());
        }
        let Some(target) = event.target() else {
            return Ok(Vec::new());
        };
        store.list_active_conflicts(target)
    }

    /// Human-readable conflict summary, if any conflicts exist.
    pub fn describe_conflicts(
        &self,
        event: &MemoryEvent,
        store: &SemanticStore,
    ) -> Result<Option<String>> {
        let conflicts = self.conflict_ids(event, store)?;
        if conflicts.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!(
                "Conflict detected with: {}",
                conflicts.join(", ")
            )))
        }
    }
}
