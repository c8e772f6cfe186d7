//! Property-based invariants over operation sequences.

use mnemo_core::{Memory, RecordStatus};
use proptest::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Op {
    Record(usize),
    Supersede(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize).prop_map(Op::Record),
        (0..3usize).prop_map(Op::Supersede),
    ]
}

proptest! {
    // Each case drives a fresh store through a sequence of record/supersede
    // operations and then checks the corpus-level invariants. Kept small:
    // every write is a real commit.
    #![proptest_config(ProptestConfig { cases: 8, ..ProptestConfig::default() })]
    #[test]
    fn target_uniqueness_and_backlinks_hold(ops in proptest::collection::vec(op_strategy(), 1..8)) {
        let targets = ["auth", "db", "ui"];
        let dir = TempDir::new().unwrap();
        let memory = Memory::open(dir.path().join("memory")).unwrap();

        for (step, op) in ops.iter().enumerate() {
            match op {
                Op::Record(t) => {
                    // Refused (not an error) when an active decision exists.
                    memory
                        .record_decision(
                            &format!("rec {step}"),
                            targets[*t],
                            "generated",
                            vec![],
                        )
                        .unwrap();
                }
                Op::Supersede(t) => {
                    let active = memory.semantic().list_active_conflicts(targets[*t]).unwrap();
                    if active.is_empty() {
                        memory
                            .record_decision(
                                &format!("rec {step}"),
                                targets[*t],
                                "generated",
                                vec![],
                            )
                            .unwrap();
                    } else {
                        memory
                            .supersede_decision(
                                &format!("sup {step}"),
                                targets[*t],
                                "generated",
                                active,
                                vec![],
                            )
                            .unwrap();
                    }
                }
            }
        }

        // At most one active decision per target.
        for target in targets {
            let active = memory.semantic().list_active_conflicts(target).unwrap();
            prop_assert!(active.len() <= 1, "target {target} has {} active decisions", active.len());
        }

        // Every superseded_by edge is acknowledged by a supersedes backlink,
        // and the evolution graph is a DAG (walking forward terminates).
        let ids = memory.get_decisions().unwrap();
        let record_count = ids.len();
        for id in ids {
            let (event, _) = memory.semantic().read_record(&id).unwrap();
            let Some(decision) = event.context.as_decision() else { continue };
            if decision.status == Some(RecordStatus::Superseded) {
                if let Some(successor) = &decision.superseded_by {
                    let (next, _) = memory.semantic().read_record(successor).unwrap();
                    let next_ctx = next.context.as_decision().unwrap();
                    prop_assert!(next_ctx.supersedes.contains(&id));
                }
            }
            let mut hops = 0;
            let mut cursor = decision.superseded_by.clone();
            while let Some(next_id) = cursor {
                hops += 1;
                prop_assert!(hops <= record_count, "supersede walk did not terminate");
                let (next, _) = memory.semantic().read_record(&next_id).unwrap();
                cursor = next
                    .context
                    .as_decision()
                    .and_then(|d| d.superseded_by.clone());
            }
        }
    }
}
