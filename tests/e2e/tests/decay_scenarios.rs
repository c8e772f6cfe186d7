//! Decay scenarios: archive, prune, retention of referenced rows, dry runs.

use chrono::{Duration, Utc};
use mnemo_core::{EventContext, EventKind, MemoryEvent, RowStatus, Source};
use mnemo_e2e_tests::{open_memory, open_memory_with};

fn aged_event(kind: EventKind, content: &str, age_days: i64) -> MemoryEvent {
    let mut event =
        MemoryEvent::new(Source::System, kind, content, EventContext::default()).unwrap();
    event.timestamp = Utc::now() - Duration::days(age_days);
    event
}

#[test]
fn stale_rows_archive_then_prune() {
    let t = open_memory_with(|c| c.with_ttl_days(30));

    t.memory
        .episodic()
        .append(&aged_event(EventKind::Error, "ancient", 40), None)
        .unwrap();
    t.memory
        .episodic()
        .append(&aged_event(EventKind::Error, "fresh", 1), None)
        .unwrap();

    let report = t.memory.run_decay(false).unwrap();
    assert_eq!(report.archived_count, 1);
    assert_eq!(report.pruned_count, 0);
    assert_eq!(report.retained_count, 1);

    // Second pass: the archived row is not yet past 2x TTL, so it stays.
    let report = t.memory.run_decay(false).unwrap();
    assert_eq!(report.archived_count, 0);
    assert_eq!(report.pruned_count, 0);

    // Inject a row old enough to prune once archived.
    let id = t
        .memory
        .episodic()
        .append(&aged_event(EventKind::Error, "fossil", 90), None)
        .unwrap();
    t.memory.episodic().mark_archived(&[id]).unwrap();
    let report = t.memory.run_decay(false).unwrap();
    assert_eq!(report.pruned_count, 1);
}

#[test]
fn dry_run_changes_nothing() {
    let t = open_memory_with(|c| c.with_ttl_days(30));
    t.memory
        .episodic()
        .append(&aged_event(EventKind::Error, "ancient", 40), None)
        .unwrap();

    let report = t.memory.run_decay(true).unwrap();
    assert_eq!(report.archived_count, 1);

    let active = t
        .memory
        .episodic()
        .query(10, Some(RowStatus::Active), None, None)
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[test]
fn linked_rows_survive_decay() {
    let t = open_memory_with(|c| c.with_ttl_days(30));
    let decision = t
        .memory
        .record_decision("Keep me", "anchor", "linked forever", vec![])
        .unwrap();
    let file_id = decision.file_id.unwrap();

    // Age the breadcrumb far past both thresholds.
    let rows = t.memory.get_recent_events(10, true).unwrap();
    assert_eq!(rows[0].linked_semantic_id.as_deref(), Some(file_id.as_str()));
    let id = rows[0].id;

    let old = aged_event(EventKind::Error, "ancient unlinked", 365);
    t.memory.episodic().append(&old, None).unwrap();

    let report = t.memory.run_decay(false).unwrap();
    assert_eq!(report.archived_count, 1);

    let active = t
        .memory
        .episodic()
        .query(10, Some(RowStatus::Active), None, None)
        .unwrap();
    assert!(active.iter().any(|r| r.id == id));
}

#[test]
fn evidence_referenced_rows_survive_pruning() {
    let t = open_memory();

    let row_id = t
        .memory
        .episodic()
        .append(&aged_event(EventKind::Error, "cited evidence", 365), None)
        .unwrap();
    t.memory.episodic().mark_archived(&[row_id]).unwrap();

    // A proposal citing the row as evidence protects it.
    let mut ctx = mnemo_core::DecisionContent::new(
        "Hypothesis about old failures",
        "legacy",
        "errors cited below",
    );
    ctx.evidence_event_ids = vec![row_id];
    let event = MemoryEvent::new(
        Source::System,
        EventKind::Proposal,
        "Hypothesis about old failures",
        ctx.into(),
    )
    .unwrap();
    t.memory.semantic().save(&event).unwrap();

    let report = t.memory.run_decay(false).unwrap();
    assert_eq!(report.pruned_count, 0);
    assert_eq!(t.memory.episodic().count().unwrap(), 1);
}
