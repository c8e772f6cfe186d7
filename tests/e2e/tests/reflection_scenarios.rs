//! Reflection scenarios: hypothesis generation, confidence evolution,
//! falsification and decay.

use mnemo_core::{EventKind, RecordStatus, Source};
use mnemo_e2e_tests::{evidence_context, open_memory};

fn inject(t: &mnemo_e2e_tests::TestMemory, kind: EventKind, target: &str, count: usize) {
    for i in 0..count {
        t.memory
            .process_event(
                Source::System,
                kind,
                &format!("{kind} {i} on {target}"),
                evidence_context(target),
                None,
            )
            .unwrap();
    }
}

#[test]
fn error_cluster_spawns_competing_drafts() {
    let t = open_memory();
    inject(&t, EventKind::Error, "ci", 4);

    let touched = t.memory.run_reflection().unwrap();
    assert_eq!(touched.len(), 2);

    let mut confidences = Vec::new();
    for id in &touched {
        let (event, _) = t.memory.semantic().read_record(id).unwrap();
        assert_eq!(event.kind, EventKind::Proposal);
        let ctx = event.context.as_decision().unwrap();
        assert_eq!(ctx.effective_status(event.kind), RecordStatus::Draft);
        assert_eq!(ctx.target, "ci");
        assert_eq!(ctx.evidence_event_ids.len(), 4);
        // The drafts point at each other as competitors.
        let other = touched.iter().find(|o| *o != id).unwrap();
        assert_eq!(ctx.competing_proposal_ids, vec![other.clone()]);
        confidences.push(ctx.confidence.unwrap());
    }
    confidences.sort_by(f64::total_cmp);
    assert_eq!(confidences, vec![0.4, 0.5]);
}

#[test]
fn few_errors_spawn_nothing() {
    let t = open_memory();
    inject(&t, EventKind::Error, "ci", 2);
    let touched = t.memory.run_reflection().unwrap();
    assert!(touched.is_empty());
}

#[test]
fn confidence_rises_with_uncontradicted_errors() {
    let t = open_memory();
    inject(&t, EventKind::Error, "ci", 10);

    let drafts = t.memory.run_reflection().unwrap();
    // Second cycle re-evaluates the drafts against the standing evidence.
    t.memory.run_reflection().unwrap();

    let (event, _) = t.memory.semantic().read_record(&drafts[0]).unwrap();
    let ctx = event.context.as_decision().unwrap();
    // 10 errors, 0 successes: (10 - 0) / 11
    let confidence = ctx.confidence.unwrap();
    assert!((confidence - 10.0 / 11.0).abs() < 1e-9);
    assert_eq!(ctx.hit_count, Some(10));
    assert_eq!(ctx.miss_count, Some(0));
    // High confidence, but the observation window has not elapsed.
    assert_eq!(ctx.ready_for_review, Some(false));
}

#[test]
fn falsification_downgrades_contradicted_hypotheses() {
    let t = open_memory();
    inject(&t, EventKind::Error, "ci", 10);

    // Cycle 1 generates the competing drafts; cycle 2 raises their
    // confidence above the falsification bar.
    let drafts = t.memory.run_reflection().unwrap();
    t.memory.run_reflection().unwrap();

    // A wave of successes contradicts the error pattern.
    inject(&t, EventKind::Result, "ci", 25);
    t.memory.run_reflection().unwrap();

    for id in &drafts {
        let (event, _) = t.memory.semantic().read_record(id).unwrap();
        let ctx = event.context.as_decision().unwrap();
        assert_eq!(ctx.effective_status(event.kind), RecordStatus::Falsified);
        assert_eq!(ctx.confidence, Some(0.1));
        assert!(ctx.rationale.starts_with("FALSIFIED"));
    }
}

#[test]
fn untouched_drafts_decay_to_rejection() {
    let t = open_memory();
    inject(&t, EventKind::Error, "ci", 4);
    let drafts = t.memory.run_reflection().unwrap();

    // Archive the evidence so later cycles see no cluster for the target.
    let rows = t.memory.get_recent_events(100, false).unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    t.memory.episodic().mark_archived(&ids).unwrap();

    // Confidence drops 0.05 per untouched cycle; both drafts (0.5 and 0.4)
    // fall below the 0.3 floor within five cycles.
    for _ in 0..5 {
        t.memory.run_reflection().unwrap();
    }

    for id in &drafts {
        let (event, _) = t.memory.semantic().read_record(id).unwrap();
        let ctx = event.context.as_decision().unwrap();
        assert_eq!(ctx.effective_status(event.kind), RecordStatus::Rejected);
    }
}

#[test]
fn counter_evidence_ids_accumulate() {
    let t = open_memory();
    inject(&t, EventKind::Error, "ci", 5);
    let drafts = t.memory.run_reflection().unwrap();

    inject(&t, EventKind::Result, "ci", 2);
    t.memory.run_reflection().unwrap();

    let (event, _) = t.memory.semantic().read_record(&drafts[0]).unwrap();
    let ctx = event.context.as_decision().unwrap();
    assert_eq!(ctx.counter_evidence_event_ids.len(), 2);
}
