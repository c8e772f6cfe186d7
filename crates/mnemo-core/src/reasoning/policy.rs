//! Persistence policy
//!
//! Deterministic rule for whether an incoming event is worth keeping at all.

use crate::event::{EventKind, MemoryEvent};

/// Decides which events persist.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryPolicy;

impl MemoryPolicy {
    /// Persist decisions, constraints and configuration changes always, and
    /// results only when their context marks them as reused knowledge.
    pub fn should_persist(&self, event: &MemoryEvent) -> bool {
        match event.kind {
            EventKind::Decision | EventKind::Constraint | EventKind::ConfigChange => true,
            EventKind::Result => event
                .context
                .get("reused")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            _ => false,
        }
    }
}
