//! Search scenarios: mode filtering over a superseded history.

use mnemo_core::SearchMode;
use mnemo_e2e_tests::open_memory;

#[test]
fn strict_search_returns_only_the_active_record() {
    let t = open_memory();
    t.memory
        .record_decision("Version 1", "policy", "Old rule", vec![])
        .unwrap();
    let active = t.memory.semantic().list_active_conflicts("policy").unwrap();
    let superseding = t
        .memory
        .supersede_decision("Version 2", "policy", "New rule", active, vec![])
        .unwrap()
        .file_id
        .unwrap();

    let hits = t
        .memory
        .search_decisions("rule", 10, SearchMode::Strict)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, superseding);
    assert_eq!(hits[0].status.as_deref(), Some("active"));
}

#[test]
fn audit_search_returns_the_full_history() {
    let t = open_memory();
    t.memory
        .record_decision("Version 1", "policy", "Old rule", vec![])
        .unwrap();
    let active = t.memory.semantic().list_active_conflicts("policy").unwrap();
    t.memory
        .supersede_decision("Version 2", "policy", "New rule", active, vec![])
        .unwrap();

    let hits = t
        .memory
        .search_decisions("rule", 10, SearchMode::Audit)
        .unwrap();
    assert_eq!(hits.len(), 2);
    let statuses: Vec<_> = hits.iter().filter_map(|h| h.status.as_deref()).collect();
    assert!(statuses.contains(&"active"));
    assert!(statuses.contains(&"superseded"));
}

#[test]
fn balanced_search_dedupes_each_target_to_its_active_record() {
    let t = open_memory();
    t.memory
        .record_decision("Version 1", "policy", "Old rule", vec![])
        .unwrap();
    let active = t.memory.semantic().list_active_conflicts("policy").unwrap();
    let superseding = t
        .memory
        .supersede_decision("Version 2", "policy", "New rule", active, vec![])
        .unwrap()
        .file_id
        .unwrap();
    t.memory
        .record_decision("Cache rule", "cache", "Fresh area", vec![])
        .unwrap();

    let hits = t
        .memory
        .search_decisions("rule", 10, SearchMode::Balanced)
        .unwrap();
    assert_eq!(hits.len(), 2);
    let policy_hit = hits
        .iter()
        .find(|h| h.target.as_deref() == Some("policy"))
        .unwrap();
    assert_eq!(policy_hit.id, superseding);
}

#[test]
fn limit_truncates_after_filtering() {
    let t = open_memory();
    for i in 0..5 {
        t.memory
            .record_decision(&format!("rule {i}"), &format!("area_{i}"), "r", vec![])
            .unwrap();
    }
    let hits = t
        .memory
        .search_decisions("rule", 2, SearchMode::Strict)
        .unwrap();
    assert_eq!(hits.len(), 2);
}
