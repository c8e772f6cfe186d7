//! Resolution engine
//!
//! Validates that a caller's resolution intent actually covers the detected
//! conflict set before any persistence is attempted.

use crate::event::{ResolutionIntent, ResolutionType};

/// Validates resolution intents against detected conflicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionEngine;

impl ResolutionEngine {
    /// An `abort` intent never authorizes persistence. Supersede and
    /// deprecate are valid iff every detected conflict is addressed by the
    /// intent.
    pub fn validate_intent(&self, intent: &ResolutionIntent, conflicts: &[String]) -> bool {
        if intent.resolution_type == ResolutionType::Abort {
            return false;
        }
        conflicts
            .iter()
            .all(|c| intent.target_decision_ids.contains(c))
    }
}
