//! Routing engine
//!
//! Given an event, the persistence policy, the detected conflict set and an
//! optional resolution intent, decides the persistence outcome. The routing
//! decision is pure; the façade executes semantic writes inside a single
//! store transaction so supersede rewrites land as one commit.

use tracing::debug;

use crate::error::Result;
use crate::event::{EventKind, MemoryDecision, MemoryEvent, ResolutionIntent, StoreType};
use crate::reasoning::conflict::ConflictEngine;
use crate::reasoning::policy::MemoryPolicy;
use crate::reasoning::resolution::ResolutionEngine;
use crate::store::SemanticStore;

/// Routes events to a store (or to oblivion).
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryRouter {
    policy: MemoryPolicy,
    conflicts: ConflictEngine,
    resolution: ResolutionEngine,
}

impl MemoryRouter {
    pub fn new(
        policy: MemoryPolicy,
        conflicts: ConflictEngine,
        resolution: ResolutionEngine,
    ) -> Self {
        Self {
            policy,
            conflicts,
            resolution,
        }
    }

    /// Decide whether and where to persist `event`.
    pub fn route(
        &self,
        event: &MemoryEvent,
        intent: Option<&ResolutionIntent>,
        store: &SemanticStore,
    ) -> Result<MemoryDecision> {
        if !self.policy.should_persist(event) {
            debug!(kind = %event.kind, "event filtered by persistence policy");
            return Ok(MemoryDecision::skip(format!(
                "{} events are not persisted by policy",
                event.kind
            )));
        }

        if !event.kind.is_semantic() {
            return Ok(MemoryDecision::persist(
                StoreType::Episodic,
                format!("{} recorded in the episodic log", event.kind),
                1,
            ));
        }

        let conflict_ids = self.conflicts.conflict_ids(event, store)?;
        if !conflict_ids.is_empty() {
            let covered = intent
                .map(|i| self.resolution.validate_intent(i, &conflict_ids))
                .unwrap_or(false);
            if !covered {
                debug!(?conflict_ids, "refusing semantic persist without valid intent");
                return Ok(MemoryDecision::skip(format!(
                    "Conflict detected with: {}; a valid resolution intent is required",
                    conflict_ids.join(", ")
                )));
            }
        }

        let priority = match event.kind {
            EventKind::Decision | EventKind::Constraint => 5,
            _ => 3,
        };
        Ok(MemoryDecision::persist(
            StoreType::Semantic,
            format!("{} recorded in the semantic store", event.kind),
            priority,
        ))
    }
}
