//! Routing and trust-boundary scenarios: store selection, policy filtering,
//! the immortal link, and the human-only boundary.

use mnemo_core::{
    EventContext, EventKind, Memory, MemoryConfig, Source, StoreType, TrustBoundary,
};
use mnemo_e2e_tests::{evidence_context, open_memory};
use tempfile::TempDir;

#[test]
fn errors_are_logged_but_not_persisted() {
    let t = open_memory();
    let decision = t
        .memory
        .process_event(
            Source::System,
            EventKind::Error,
            "timeout calling upstream",
            evidence_context("net"),
            None,
        )
        .unwrap();
    assert!(!decision.should_persist);

    // The event still landed in the episodic log.
    let rows = t.memory.get_recent_events(10, false).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, EventKind::Error);
    assert!(rows[0].linked_semantic_id.is_none());
}

#[test]
fn config_changes_stay_episodic() {
    let t = open_memory();
    let decision = t
        .memory
        .process_event(
            Source::System,
            EventKind::ConfigChange,
            "raised pool size to 32",
            EventContext::default(),
            None,
        )
        .unwrap();
    assert!(decision.should_persist);
    assert_eq!(decision.store_type, StoreType::Episodic);
    assert!(t.memory.get_decisions().unwrap().is_empty());
}

#[test]
fn reused_results_persist_plain_results_do_not() {
    let t = open_memory();

    let serde_json::Value::Object(reused) = serde_json::json!({"reused": true}) else {
        unreachable!()
    };
    let decision = t
        .memory
        .process_event(
            Source::Agent,
            EventKind::Result,
            "cached migration plan applied",
            EventContext::Free(reused),
            None,
        )
        .unwrap();
    assert!(decision.should_persist);
    assert_eq!(decision.store_type, StoreType::Episodic);

    let decision = t
        .memory
        .process_event(
            Source::Agent,
            EventKind::Result,
            "one-off run finished",
            EventContext::default(),
            None,
        )
        .unwrap();
    assert!(!decision.should_persist);
}

#[test]
fn immortal_link_binds_semantic_writes() {
    let t = open_memory();
    let decision = t
        .memory
        .record_decision("Auth V1", "auth", "Initial", vec![])
        .unwrap();
    let file_id = decision.file_id.unwrap();

    let rows = t.memory.get_recent_events(10, false).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].linked_semantic_id.as_deref(), Some(file_id.as_str()));
}

#[test]
fn constraints_route_to_semantic() {
    let t = open_memory();
    let ctx = mnemo_core::DecisionContent::new(
        "No sync IO on the event loop",
        "runtime",
        "Blocking stalls every session",
    );
    let decision = t
        .memory
        .process_event(
            Source::User,
            EventKind::Constraint,
            "No sync IO on the event loop",
            ctx.into(),
            None,
        )
        .unwrap();
    assert!(decision.should_persist);
    assert_eq!(decision.store_type, StoreType::Semantic);
    assert!(decision.file_id.is_some());
}

#[test]
fn trust_boundary_blocks_agent_decisions() {
    let dir = TempDir::new().unwrap();
    let config = MemoryConfig::new(dir.path().join("memory"))
        .with_trust_boundary(TrustBoundary::HumanOnly);
    let memory = Memory::new(config, Box::new(mnemo_core::HashEmbedder::default())).unwrap();

    let decision = memory
        .record_decision("Agent coup", "governance", "should not land", vec![])
        .unwrap();
    assert!(!decision.should_persist);
    assert_eq!(decision.reason, "Trust Boundary Violation");

    // Nothing written anywhere.
    assert!(memory.get_decisions().unwrap().is_empty());
    assert!(memory.get_recent_events(10, true).unwrap().is_empty());

    // Human decisions still pass.
    let ctx = mnemo_core::DecisionContent::new("Human rule", "governance", "humans decide");
    let decision = memory
        .process_event(
            Source::User,
            EventKind::Decision,
            "Human rule",
            ctx.into(),
            None,
        )
        .unwrap();
    assert!(decision.should_persist);
}

#[test]
fn schema_violations_reject_without_side_effects() {
    let t = open_memory();
    let err = t
        .memory
        .process_event(
            Source::Agent,
            EventKind::Decision,
            "missing context",
            EventContext::default(),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, mnemo_core::MemoryError::Schema(_)));
    assert!(t.memory.get_recent_events(10, true).unwrap().is_empty());
    assert!(t.memory.get_decisions().unwrap().is_empty());
}
