//! Semantic store scenarios: basic recording, target collisions, supersede
//! chains and immutability.

use mnemo_core::{ContextPatch, MemoryError, RecordStatus, StoreType};
use mnemo_e2e_tests::open_memory;

#[test]
fn basic_record() {
    let t = open_memory();
    let decision = t
        .memory
        .record_decision("Auth V1", "auth", "Initial", vec![])
        .unwrap();

    assert!(decision.should_persist);
    assert_eq!(decision.store_type, StoreType::Semantic);
    let file_id = decision.file_id.expect("file id");

    let decisions = t.memory.get_decisions().unwrap();
    assert_eq!(decisions, vec![file_id.clone()]);

    let rows = t.memory.semantic().meta_rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].target, "auth");
    assert_eq!(rows[0].status, RecordStatus::Active);
}

#[test]
fn target_collision() {
    let t = open_memory();
    t.memory
        .record_decision("Auth V1", "auth", "Initial", vec![])
        .unwrap();

    // The router refuses the second decision without an intent.
    let refused = t
        .memory
        .record_decision("Auth V2", "auth", "Competing", vec![])
        .unwrap();
    assert!(!refused.should_persist);
    assert!(refused.reason.contains("Conflict detected with"));

    // Bypassing the router hits the index constraint instead.
    let ctx = mnemo_core::DecisionContent::new("Auth V3", "auth", "Competing harder");
    let event = mnemo_core::MemoryEvent::new(
        mnemo_core::Source::Agent,
        mnemo_core::EventKind::Decision,
        "Auth V3",
        ctx.into(),
    )
    .unwrap();
    let err = t.memory.semantic().save(&event).unwrap_err();
    assert!(matches!(err, MemoryError::Conflict { .. }));

    assert_eq!(t.memory.get_decisions().unwrap().len(), 1);
}

#[test]
fn supersede_chain_stays_linear() {
    let t = open_memory();
    t.memory
        .record_decision("v0", "T", "initial", vec![])
        .unwrap();

    for i in 1..=5 {
        let active = t.memory.semantic().list_active_conflicts("T").unwrap();
        assert_eq!(active.len(), 1);
        t.memory
            .supersede_decision(&format!("v{i}"), "T", "evolution", active, vec![])
            .unwrap();
    }

    let all = t.memory.get_decisions().unwrap();
    assert_eq!(all.len(), 6);

    let active = t.memory.semantic().list_active_conflicts("T").unwrap();
    assert_eq!(active.len(), 1);

    // Walk the chain from the oldest record: five forward hops, each
    // acknowledged by a backlink, ending at the sole active record.
    let rows = t.memory.semantic().meta_rows().unwrap();
    let mut current = rows
        .iter()
        .filter(|r| r.status == RecordStatus::Superseded)
        .min_by_key(|r| r.timestamp)
        .map(|r| r.id.clone())
        .expect("oldest superseded record");
    let mut hops = 0;
    loop {
        let (event, _) = t.memory.semantic().read_record(&current).unwrap();
        let decision = event.context.as_decision().unwrap();
        match &decision.superseded_by {
            Some(next) => {
                let (next_event, _) = t.memory.semantic().read_record(next).unwrap();
                let next_decision = next_event.context.as_decision().unwrap();
                assert!(next_decision.supersedes.contains(&current));
                current = next.clone();
                hops += 1;
            }
            None => break,
        }
    }
    assert_eq!(hops, 5);
    assert_eq!(current, active[0]);
}

#[test]
fn supersede_rejects_inactive_ids() {
    let t = open_memory();
    t.memory
        .record_decision("v0", "T", "initial", vec![])
        .unwrap();
    let err = t
        .memory
        .supersede_decision("v1", "T", "bad", vec!["ghost.md".into()], vec![])
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[test]
fn immutable_field_update_refused() {
    let t = open_memory();
    let decision = t
        .memory
        .record_decision("v0", "T", "initial", vec![])
        .unwrap();
    let id = decision.file_id.unwrap();
    let before = std::fs::read_to_string(t.semantic_root().join(&id)).unwrap();

    let mut patch = ContextPatch::new();
    patch.insert("target".into(), serde_json::json!("U"));
    let err = t
        .memory
        .semantic()
        .update_decision(&id, &patch, "Illegal")
        .unwrap_err();
    assert!(matches!(err, MemoryError::Transition(_)));

    let after = std::fs::read_to_string(t.semantic_root().join(&id)).unwrap();
    assert_eq!(before, after);
}

#[test]
fn store_reopens_cleanly_after_chain() {
    let t = open_memory();
    t.memory
        .record_decision("v0", "T", "initial", vec![])
        .unwrap();
    let active = t.memory.semantic().list_active_conflicts("T").unwrap();
    t.memory
        .supersede_decision("v1", "T", "evolution", active, vec![])
        .unwrap();
    let path = t.storage_path();
    let mnemo_e2e_tests::TestMemory { dir: _dir, memory } = t;
    drop(memory);

    // Reopen over the same directory: recovery, index sync and integrity all
    // pass.
    let memory = mnemo_core::Memory::open(&path).unwrap();
    assert_eq!(memory.get_decisions().unwrap().len(), 2);
    assert_eq!(memory.semantic().list_active_conflicts("T").unwrap().len(), 1);
}
