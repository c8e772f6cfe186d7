//! Semantic store
//!
//! The orchestrator tying codec, metadata index, integrity checker,
//! transition validator and version log together behind the cross-process
//! lock. All write paths are compensating: any failure after the file write
//! and before a successful commit deletes or restores the bytes, repairs the
//! index and resets the version log, so only committed state is ever
//! observable.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::event::{
    EventContext, EventKind, MemoryEvent, RecordStatus, Source, TrustBoundary,
};
use crate::record;
use crate::store::lock::{LockMode, StoreLock};
use crate::store::meta::{MetaIndex, MetaRow};
use crate::store::version_log::GitLog;
use crate::store::{integrity, transitions};

/// Subtree holding invalid files set aside by crash recovery. Never indexed,
/// never auto-readmitted.
pub const QUARANTINE_DIR: &str = ".quarantine";

/// Free-form patch merged into a record's context by
/// [`SemanticStore::update_decision`].
pub type ContextPatch = serde_json::Map<String, serde_json::Value>;

/// Store for semantic memory (long-lived decisions) using a git-backed
/// version log and SQLite for transactional metadata indexing.
pub struct SemanticStore {
    root: PathBuf,
    trust_boundary: TrustBoundary,
    meta: MetaIndex,
    log: GitLog,
    lock: StoreLock,
    in_transaction: AtomicBool,
    txn_files: Mutex<Vec<String>>,
}

impl SemanticStore {
    /// Open (or create) the store at `root`.
    ///
    /// Under the exclusive lock: ensures the version log exists, runs crash
    /// recovery, rebuilds the metadata index when it disagrees with disk,
    /// then validates whole-corpus integrity. Construction fails on any
    /// violation.
    pub fn new(root: impl Into<PathBuf>, trust_boundary: TrustBoundary) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let store = Self {
            meta: MetaIndex::new(root.join("semantic_meta.db"))?,
            log: GitLog::new(&root),
            lock: StoreLock::new(root.join(".lock")),
            trust_boundary,
            root,
            in_transaction: AtomicBool::new(false),
            txn_files: Mutex::new(Vec::new()),
        };

        {
            let _guard = store.lock.acquire(LockMode::Exclusive)?;
            store.log.ensure_initialized()?;
            store.recover_dirty_state()?;
            store.sync_meta_index()?;
        }

        integrity::validate(&store.root, false)?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trust_boundary(&self) -> TrustBoundary {
        self.trust_boundary
    }

    /// Current head hash of the version log.
    pub fn head_hash(&self) -> Result<Option<String>> {
        self.log.head_hash()
    }

    // ========================================================================
    // CRASH RECOVERY
    // ========================================================================

    /// Re-admit valid dirty files, quarantine the rest.
    fn recover_dirty_state(&self) -> Result<()> {
        let entries = self.log.status_short()?;
        if entries.is_empty() {
            return Ok(());
        }
        warn!(count = entries.len(), "dirty state detected in semantic store");

        let mut quarantined_tracked = false;
        for entry in entries {
            // Dotfiles (lock, quarantine, git internals) are not records.
            if entry.path.starts_with('.') || entry.path.contains('/') {
                continue;
            }
            let full = self.root.join(&entry.path);
            if !full.exists() {
                continue;
            }

            let valid = entry.path.ends_with(".md")
                && std::fs::read_to_string(&full)
                    .ok()
                    .is_some_and(|text| record::decode_event(&text).is_ok());

            if valid {
                info!(path = %entry.path, "auto-recovering valid record");
                self.log.add(Path::new(&entry.path))?;
                self.log
                    .commit(&format!("Recovery: restore valid record {}", entry.path))?;
            } else {
                error!(path = %entry.path, "quarantining invalid file");
                let quarantine = self.root.join(QUARANTINE_DIR);
                std::fs::create_dir_all(&quarantine)?;
                std::fs::rename(&full, quarantine.join(&entry.path))?;
                if entry.modified && !entry.untracked {
                    quarantined_tracked = true;
                }
            }
        }

        // A quarantined tracked file leaves a hole in the working tree;
        // restore the last committed bytes.
        if quarantined_tracked {
            self.log.reset_hard()?;
        }
        Ok(())
    }

    /// Rebuild the metadata index when its row count disagrees with disk.
    fn sync_meta_index(&self) -> Result<()> {
        let files = super::record_files(&self.root)?;
        if files.len() != self.meta.count()? {
            self.meta.rebuild_from_disk(&self.root)?;
        }
        Ok(())
    }

    fn enforce_trust(&self, event: &MemoryEvent) -> Result<()> {
        if self.trust_boundary == TrustBoundary::HumanOnly
            && event.source == Source::Agent
            && event.kind == EventKind::Decision
        {
            return Err(MemoryError::Permission("Trust Boundary Violation".into()));
        }
        Ok(())
    }

    fn meta_row(id: &str, event: &MemoryEvent) -> Result<MetaRow> {
        let decision = event.context.as_decision().ok_or_else(|| {
            MemoryError::Schema("semantic records require a decision-shaped context".into())
        })?;
        Ok(MetaRow {
            id: id.to_string(),
            target: decision.target.clone(),
            status: decision.effective_status(event.kind),
            kind: event.kind,
            timestamp: event.timestamp,
            superseded_by: decision.superseded_by.clone(),
        })
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Persist one event as a new record; returns the record id.
    pub fn save(&self, event: &MemoryEvent) -> Result<String> {
        self.enforce_trust(event)?;
        let _guard = self.lock.acquire(LockMode::Exclusive)?;

        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}_{}_{}.md",
            event.kind,
            event.timestamp.format("%Y%m%d_%H%M%S_%6f"),
            &suffix[..8]
        );
        let path = self.root.join(&id);
        let row = Self::meta_row(&id, event)?;

        let text = record::encode_event(event, &record::render_body(event))?;
        std::fs::write(&path, text)?;

        // Atomic metadata update: the unique index turns a duplicate-active into
        // a typed conflict before anything is committed.
        if let Err(err) = self.meta.upsert(&row) {
            let _ = std::fs::remove_file(&path);
            return Err(err);
        }

        if let Err(err) = self.log.add(Path::new(&id)) {
            let _ = std::fs::remove_file(&path);
            let _ = self.meta.delete(&id);
            return Err(err);
        }

        if self.in_transaction.load(Ordering::SeqCst) {
            self.txn_files
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(id.clone());
        } else {
            let commit_message = format!("Add {}: {}", event.kind, truncate(&event.content, 50));
            let outcome = integrity::validate(&self.root, true)
                .and_then(|()| self.log.commit(&commit_message));
            if let Err(err) = outcome {
                let _ = std::fs::remove_file(&path);
                let _ = self.meta.delete(&id);
                let _ = self.log.reset_hard();
                integrity::invalidate(&self.root);
                return Err(err);
            }
        }

        Ok(id)
    }

    /// Apply a context patch to an existing record.
    ///
    /// The transition validator gates the change before any bytes hit disk;
    /// failures after the write restore the original bytes and index row.
    pub fn update_decision(&self, id: &str, patch: &ContextPatch, message: &str) -> Result<()> {
        let _guard = self.lock.acquire(LockMode::Exclusive)?;

        let path = self.root.join(id);
        if !path.exists() {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        let original_text = std::fs::read_to_string(&path)?;
        let (old_event, body) = record::decode_event(&original_text)?;

        let new_event = apply_patch(&old_event, patch)?;
        transitions::validate_update(&old_event, &new_event)?;
        let new_row = Self::meta_row(id, &new_event)?;

        let new_text = record::encode_event(&new_event, &body)?;
        std::fs::write(&path, new_text)?;

        let restore = |err: MemoryError| -> MemoryError {
            let _ = std::fs::write(&path, &original_text);
            if let Ok(old_row) = Self::meta_row(id, &old_event) {
                let _ = self.meta.upsert(&old_row);
            }
            integrity::invalidate(&self.root);
            err
        };

        if let Err(err) = self.meta.upsert(&new_row) {
            return Err(restore(err));
        }
        if let Err(err) = self.log.add(Path::new(id)) {
            return Err(restore(err));
        }

        if !self.in_transaction.load(Ordering::SeqCst) {
            let outcome =
                integrity::validate(&self.root, true).and_then(|()| self.log.commit(message));
            if let Err(err) = outcome {
                return Err(restore(err));
            }
        }
        Ok(())
    }

    /// Group multiple saves/updates into one validation and one commit.
    ///
    /// On any failure the version log is reset, files created inside the
    /// scope are deleted and the metadata index is rebuilt, so the whole edit
    /// is all-or-nothing.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        if self.in_transaction.load(Ordering::SeqCst) {
            // Already inside a scope: flatten.
            return f(self);
        }

        let _guard = self.lock.acquire(LockMode::Exclusive)?;
        self.txn_files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.in_transaction.store(true, Ordering::SeqCst);
        let result = f(self);
        self.in_transaction.store(false, Ordering::SeqCst);

        let committed = match result {
            Ok(value) => integrity::validate(&self.root, true)
                .and_then(|()| self.log.commit("Atomic transaction commit"))
                .map(|()| value),
            Err(err) => Err(err),
        };

        match committed {
            Ok(value) => Ok(value),
            Err(err) => {
                error!(%err, "transaction failed, rolling back");
                let created: Vec<String> = self
                    .txn_files
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .drain(..)
                    .collect();
                for id in created {
                    let _ = std::fs::remove_file(self.root.join(id));
                }
                let _ = self.log.reset_hard();
                let _ = self.meta.rebuild_from_disk(&self.root);
                integrity::invalidate(&self.root);
                Err(err)
            }
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// All record ids in the store, sorted.
    pub fn list_decisions(&self) -> Result<Vec<String>> {
        let _guard = self.lock.acquire(LockMode::Shared)?;
        super::record_files(&self.root)
    }

    /// Ids of active decision records governing `target`.
    pub fn list_active_conflicts(&self, target: &str) -> Result<Vec<String>> {
        let _guard = self.lock.acquire(LockMode::Shared)?;
        Ok(self
            .meta
            .list_all()?
            .into_iter()
            .filter(|row| {
                row.kind == EventKind::Decision
                    && row.status == RecordStatus::Active
                    && row.target == target
            })
            .map(|row| row.id)
            .collect())
    }

    /// First draft proposal governing `target`, if any.
    pub fn find_proposal(&self, target: &str) -> Result<Option<String>> {
        let _guard = self.lock.acquire(LockMode::Shared)?;
        Ok(self
            .meta
            .list_all()?
            .into_iter()
            .find(|row| {
                row.kind == EventKind::Proposal
                    && row.status == RecordStatus::Draft
                    && row.target == target
            })
            .map(|row| row.id))
    }

    /// Parse one record into its event and body.
    pub fn read_record(&self, id: &str) -> Result<(MemoryEvent, String)> {
        let _guard = self.lock.acquire(LockMode::Shared)?;
        let path = self.root.join(id);
        if !path.exists() {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        record::decode_event(&std::fs::read_to_string(path)?)
    }

    /// Snapshot of the metadata index.
    pub fn meta_rows(&self) -> Result<Vec<MetaRow>> {
        let _guard = self.lock.acquire(LockMode::Shared)?;
        self.meta.list_all()
    }
}

fn apply_patch(old: &MemoryEvent, patch: &ContextPatch) -> Result<MemoryEvent> {
    let decision = old
        .context
        .as_decision()
        .ok_or_else(|| MemoryError::Transition("record context is not updatable".into()))?;

    let mut value = serde_json::to_value(decision)
        .map_err(|e| MemoryError::Codec(format!("unserializable context: {}", e)))?;
    let Some(object) = value.as_object_mut() else {
        return Err(MemoryError::Codec(
            "decision context did not serialize to an object".into(),
        ));
    };
    for (key, patch_value) in patch {
        object.insert(key.clone(), patch_value.clone());
    }

    let patched = serde_json::from_value(value)
        .map_err(|e| MemoryError::Schema(format!("invalid context patch: {}", e)))?;
    let mut new_event = old.clone();
    new_event.context = EventContext::Decision(patched);
    Ok(new_event)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
