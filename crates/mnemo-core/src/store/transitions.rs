//! Transition validator
//!
//! Per-record update legality: immutable fields and the status
//! transition matrix. Runs on the (old, proposed) header pair before any
//! bytes hit disk.

use crate::error::{MemoryError, Result};
use crate::event::{MemoryEvent, RecordStatus};

/// Validate a proposed update of one record.
pub fn validate_update(old: &MemoryEvent, new: &MemoryEvent) -> Result<()> {
    // Kind and timestamp never change
    if old.kind != new.kind {
        return Err(MemoryError::Transition(format!(
            "kind is immutable ({} -> {})",
            old.kind, new.kind
        )));
    }
    if old.timestamp != new.timestamp {
        return Err(MemoryError::Transition("timestamp is immutable".into()));
    }

    let (Some(old_ctx), Some(new_ctx)) = (old.context.as_decision(), new.context.as_decision())
    else {
        // Only decision-shaped contexts carry updatable semantics.
        return Err(MemoryError::Transition(
            "record context is not updatable".into(),
        ));
    };

    // The governed target never changes
    if old_ctx.target != new_ctx.target {
        return Err(MemoryError::Transition(format!(
            "target is immutable ('{}' -> '{}')",
            old_ctx.target, new_ctx.target
        )));
    }

    let from = old_ctx.effective_status(old.kind);
    let to = new_ctx.effective_status(new.kind);
    if from != to && !allowed(from, to) {
        return Err(MemoryError::Transition(format!(
            "illegal status transition {} -> {}",
            from, to
        )));
    }

    // Activation of a draft requires the full decision shape.
    if from == RecordStatus::Draft && to == RecordStatus::Active {
        for (name, value) in [
            ("title", &new_ctx.title),
            ("target", &new_ctx.target),
            ("rationale", &new_ctx.rationale),
        ] {
            if value.trim().is_empty() {
                return Err(MemoryError::Transition(format!(
                    "draft activation requires a non-empty {}",
                    name
                )));
            }
        }
    }

    Ok(())
}

fn allowed(from: RecordStatus, to: RecordStatus) -> bool {
    use RecordStatus::*;
    match from {
        Active => matches!(to, Superseded | Deprecated),
        Draft => matches!(to, Active | Rejected | Falsified),
        Superseded | Deprecated | Rejected | Falsified => false,
    }
}
