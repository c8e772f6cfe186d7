//! Storage Module
//!
//! The two coupled stores and their supporting parts:
//! - Semantic store: git-versioned decision records behind a cross-process
//!   advisory lock, with a transactional SQLite metadata index
//! - Episodic store: bounded SQLite append log
//! - Integrity checker, transition validator, version log, lock

pub mod episodic;
pub mod integrity;
pub mod lock;
pub mod meta;
pub mod semantic;
pub mod transitions;
pub mod version_log;

pub use episodic::{EpisodicRow, EpisodicStore, RowStatus};
pub use lock::{LockGuard, LockMode, StoreLock};
pub use meta::{MetaIndex, MetaRow};
pub use semantic::{ContextPatch, SemanticStore};
pub use version_log::{GitLog, StatusEntry};

use std::path::Path;

use crate::error::Result;

/// Record file names directly under a store root, sorted, dotfiles and
/// subdirectories excluded.
pub(crate) fn record_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !name.ends_with(".md") {
            continue;
        }
        files.push(name);
    }
    files.sort();
    Ok(files)
}
