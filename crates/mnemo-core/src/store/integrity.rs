//! Integrity checker
//!
//! Pure whole-corpus validator of the structural invariants:
//! bidirectional supersede links, a single active decision per target,
//! and an acyclic evolution graph. Success is memoized per process
//! against a fingerprint of the sorted `(filename, mtime)` pairs so repeated
//! reads stay cheap; any write changes the fingerprint and `force` bypasses
//! the cache outright.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

use crate::error::{IntegrityViolation, MemoryError, Result};
use crate::event::{EventKind, MemoryEvent, RecordStatus};
use crate::record;

static FINGERPRINTS: LazyLock<Mutex<HashMap<PathBuf, u64>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Validate the whole corpus under `root`.
///
/// Returns the first violation found. `force` bypasses the memoization.
pub fn validate(root: &Path, force: bool) -> Result<()> {
    let fingerprint = state_fingerprint(root)?;
    if !force {
        let cache = FINGERPRINTS.lock().unwrap_or_else(|e| e.into_inner());
        if cache.get(root) == Some(&fingerprint) {
            return Ok(());
        }
    }

    let corpus = load_corpus(root)?;
    check_invariants(&corpus)?;

    FINGERPRINTS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(root.to_path_buf(), fingerprint);
    Ok(())
}

/// Drop the memoized state for a store root.
pub fn invalidate(root: &Path) {
    FINGERPRINTS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(root);
}

fn state_fingerprint(root: &Path) -> Result<u64> {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for name in super::record_files(root)? {
        let Ok(meta) = std::fs::metadata(root.join(&name)) else {
            continue;
        };
        name.hash(&mut hasher);
        if let Ok(mtime) = meta.modified() {
            mtime.hash(&mut hasher);
        }
    }
    Ok(hasher.finish())
}

fn load_corpus(root: &Path) -> Result<HashMap<String, MemoryEvent>> {
    let mut corpus = HashMap::new();
    for name in super::record_files(root)? {
        let text = std::fs::read_to_string(root.join(&name))?;
        let (event, _) = record::decode_event(&text).map_err(|_| {
            MemoryError::Integrity(IntegrityViolation::for_record(
                "Corrupted or empty frontmatter",
                name.clone(),
            ))
        })?;
        corpus.insert(name, event);
    }
    Ok(corpus)
}

fn check_invariants(corpus: &HashMap<String, MemoryEvent>) -> Result<()> {
    let mut active_targets: HashMap<&str, &str> = HashMap::new();

    for (id, event) in corpus {
        let Some(decision) = event.context.as_decision() else {
            continue;
        };
        let status = decision.effective_status(event.kind);

        // Single active decision per target
        if event.kind == EventKind::Decision && status == RecordStatus::Active {
            if let Some(other) = active_targets.insert(decision.target.as_str(), id) {
                return Err(IntegrityViolation::for_record(
                    format!(
                        "Multiple active decisions for target '{}'",
                        decision.target
                    ),
                    id.clone(),
                )
                .with_detail(other)
                .into());
            }
        }

        // Forward edge exists and is acknowledged by the remote end
        if let Some(successor) = &decision.superseded_by {
            let Some(remote) = corpus.get(successor) else {
                return Err(IntegrityViolation::for_record(
                    format!("Dangling reference: superseded by non-existent record '{successor}'"),
                    id.clone(),
                )
                .with_detail(successor)
                .into());
            };
            let acknowledged = remote
                .context
                .as_decision()
                .is_some_and(|r| r.supersedes.iter().any(|s| s == id));
            if !acknowledged {
                return Err(IntegrityViolation::for_record(
                    format!("Broken backlink: '{successor}' does not list this record in supersedes"),
                    id.clone(),
                )
                .with_detail(successor)
                .into());
            }
        }

        // Reverse edges must point at existing records
        for old in &decision.supersedes {
            if !corpus.contains_key(old) {
                return Err(IntegrityViolation::for_record(
                    format!("Dangling reference: claims to supersede non-existent record '{old}'"),
                    id.clone(),
                )
                .with_detail(old)
                .into());
            }
        }
    }

    check_cycles(corpus)
}

// DFS over the superseded_by relation with an explicit on-path set.
fn check_cycles(corpus: &HashMap<String, MemoryEvent>) -> Result<()> {
    let mut visited: HashSet<&str> = HashSet::new();

    for start in corpus.keys() {
        if visited.contains(start.as_str()) {
            continue;
        }
        let mut on_path: Vec<&str> = Vec::new();
        let mut current = Some(start.as_str());
        while let Some(id) = current {
            if on_path.contains(&id) {
                return Err(IntegrityViolation::for_record(
                    "Cycle detected in knowledge evolution",
                    id.to_string(),
                )
                .into());
            }
            if visited.contains(id) {
                break;
            }
            on_path.push(id);
            current = corpus
                .get(id)
                .and_then(|e| e.context.as_decision())
                .and_then(|d| d.superseded_by.as_deref());
        }
        visited.extend(on_path);
    }
    Ok(())
}
