//! Proposal lifecycle scenarios: drafts, acceptance, supersede wiring.

use mnemo_core::{
    DecisionContent, EventKind, MemoryError, MemoryEvent, RecordStatus, Source,
};
use mnemo_e2e_tests::open_memory;

fn draft_proposal(target: &str, suggested: Vec<String>) -> MemoryEvent {
    let mut ctx = DecisionContent::new(
        format!("Proposal for {target}"),
        target,
        "recurring failures need a rule",
    );
    ctx.suggested_supersedes = suggested;
    MemoryEvent::new(
        Source::System,
        EventKind::Proposal,
        format!("Proposal for {target}"),
        ctx.into(),
    )
    .unwrap()
}

#[test]
fn accepting_a_draft_activates_it() {
    let t = open_memory();
    let proposal_id = t
        .memory
        .semantic()
        .save(&draft_proposal("ci", vec![]))
        .unwrap();

    let decision = t.memory.accept_proposal(&proposal_id).unwrap();
    assert_eq!(decision.file_id.as_deref(), Some(proposal_id.as_str()));

    let (event, _) = t.memory.semantic().read_record(&proposal_id).unwrap();
    // The kind never changes; only the status flips.
    assert_eq!(event.kind, EventKind::Proposal);
    assert_eq!(event.status(), Some(RecordStatus::Active));
}

#[test]
fn acceptance_supersedes_suggested_decisions() {
    let t = open_memory();
    let old_id = t
        .memory
        .record_decision("Old rule", "ci", "first attempt", vec![])
        .unwrap()
        .file_id
        .unwrap();

    let proposal_id = t
        .memory
        .semantic()
        .save(&draft_proposal("ci", vec![old_id.clone()]))
        .unwrap();
    t.memory.accept_proposal(&proposal_id).unwrap();

    let (old_event, _) = t.memory.semantic().read_record(&old_id).unwrap();
    let old_ctx = old_event.context.as_decision().unwrap();
    assert_eq!(
        old_ctx.effective_status(old_event.kind),
        RecordStatus::Superseded
    );
    assert_eq!(old_ctx.superseded_by.as_deref(), Some(proposal_id.as_str()));

    let (new_event, _) = t.memory.semantic().read_record(&proposal_id).unwrap();
    let new_ctx = new_event.context.as_decision().unwrap();
    assert_eq!(new_ctx.supersedes, vec![old_id]);
}

#[test]
fn only_drafts_can_be_accepted() {
    let t = open_memory();
    let proposal_id = t
        .memory
        .semantic()
        .save(&draft_proposal("ci", vec![]))
        .unwrap();
    t.memory.accept_proposal(&proposal_id).unwrap();

    // A second acceptance finds an active record, not a draft.
    let err = t.memory.accept_proposal(&proposal_id).unwrap_err();
    assert!(matches!(err, MemoryError::Transition(_)));

    // Decisions are not acceptable either.
    let decision_id = t
        .memory
        .record_decision("A rule", "area", "why", vec![])
        .unwrap()
        .file_id
        .unwrap();
    let err = t.memory.accept_proposal(&decision_id).unwrap_err();
    assert!(matches!(err, MemoryError::Transition(_)));

    // Unknown ids are rejected outright.
    let err = t.memory.accept_proposal("ghost.md").unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[test]
fn find_proposal_locates_drafts_by_target() {
    let t = open_memory();
    let proposal_id = t
        .memory
        .semantic()
        .save(&draft_proposal("ci", vec![]))
        .unwrap();

    assert_eq!(
        t.memory.semantic().find_proposal("ci").unwrap(),
        Some(proposal_id.clone())
    );
    assert_eq!(t.memory.semantic().find_proposal("other").unwrap(), None);

    // Accepted proposals are no longer drafts.
    t.memory.accept_proposal(&proposal_id).unwrap();
    assert_eq!(t.memory.semantic().find_proposal("ci").unwrap(), None);
}
