//! Version log
//!
//! Append-only, commit-oriented history of the semantic tree over a local
//! git repository (libgit2). Repositories are opened per operation and never
//! held across lock acquisitions. Transient index-lock errors from concurrent
//! commits are retried with exponential back-off; "nothing to commit" is
//! success.

use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::{ErrorCode, Repository, ResetType, Signature, StatusOptions, build::CheckoutBuilder};
use tracing::{debug, info};

use crate::error::{MemoryError, Result};

const MAX_RETRIES: u32 = 10;
const BASE_DELAY: Duration = Duration::from_millis(100);
const BACKOFF_FACTOR: f64 = 1.5;

const DEFAULT_AUTHOR: &str = "mnemo";
const DEFAULT_EMAIL: &str = "memory@mnemo.local";

/// One dirty entry reported by the working tree.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub path: String,
    pub untracked: bool,
    pub modified: bool,
}

/// Thin abstraction over the git backend for one store directory.
pub struct GitLog {
    root: PathBuf,
}

impl GitLog {
    /// Bind a version log handle to `root`. No disk work happens here;
    /// repositories are opened per operation.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Initialize the repository (identity, ignore rules, initial commit) on
    /// first use. Idempotent; callers serialize through the store lock.
    pub fn ensure_initialized(&self) -> Result<()> {
        if self.root.join(".git").exists() {
            return Ok(());
        }
        info!(root = %self.root.display(), "initializing version log");
        let repo = Repository::init(&self.root)?;

        let mut config = repo.config()?;
        let name = std::env::var("GIT_AUTHOR_NAME").unwrap_or_else(|_| DEFAULT_AUTHOR.to_string());
        let email = std::env::var("GIT_AUTHOR_EMAIL").unwrap_or_else(|_| DEFAULT_EMAIL.to_string());
        config.set_str("user.name", &name)?;
        config.set_str("user.email", &email)?;
        drop(config);
        drop(repo);

        // Lock, quarantine and the derivable index stay out of history.
        std::fs::write(
            self.root.join(".gitignore"),
            ".lock\n.quarantine/\nsemantic_meta.db\nsemantic_meta.db-wal\nsemantic_meta.db-shm\n",
        )?;
        self.add(Path::new(".gitignore"))?;
        self.commit("Initial commit: ignore lock and index artifacts")?;
        Ok(())
    }

    /// Open the version log at `root`, initializing the repository on first
    /// use.
    pub fn open_or_init(root: impl Into<PathBuf>) -> Result<Self> {
        let log = Self::new(root);
        log.ensure_initialized()?;
        Ok(log)
    }

    /// Stage one path (relative to the store root).
    pub fn add(&self, rel: &Path) -> Result<()> {
        let rel = rel.to_path_buf();
        self.with_retry(move |repo| {
            let mut index = repo.index()?;
            index.add_path(&rel)?;
            index.write()?;
            Ok(())
        })
    }

    /// Commit the staged tree. An empty diff against HEAD is success.
    pub fn commit(&self, message: &str) -> Result<()> {
        let message = message.to_string();
        self.with_retry(move |repo| {
            let mut index = repo.index()?;
            let tree_id = index.write_tree()?;
            let tree = repo.find_tree(tree_id)?;

            let parent = match repo.head() {
                Ok(head) => Some(head.peel_to_commit()?),
                Err(_) => None,
            };
            if let Some(parent) = &parent {
                if parent.tree_id() == tree_id {
                    debug!("nothing to commit");
                    return Ok(());
                }
            }

            let sig = repo
                .signature()
                .or_else(|_| Signature::now(DEFAULT_AUTHOR, DEFAULT_EMAIL))?;
            let parents: Vec<&git2::Commit> = parent.iter().collect();
            repo.commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)?;
            Ok(())
        })
    }

    /// Discard index and working-tree changes to tracked files, back to HEAD.
    pub fn reset_hard(&self) -> Result<()> {
        self.with_retry(|repo| {
            let Ok(head) = repo.head() else {
                // Empty history: nothing to reset to.
                return Ok(());
            };
            let target = head.peel(git2::ObjectType::Commit)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            repo.reset(&target, ResetType::Hard, Some(&mut checkout))?;
            Ok(())
        })
    }

    /// Restore one tracked file's bytes from HEAD.
    pub fn restore_file(&self, rel: &Path) -> Result<()> {
        let rel = rel.to_path_buf();
        self.with_retry(move |repo| {
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            checkout.path(&rel);
            repo.checkout_head(Some(&mut checkout))?;
            Ok(())
        })
    }

    /// Current HEAD commit hash, if any commit exists.
    pub fn head_hash(&self) -> Result<Option<String>> {
        let repo = Repository::open(&self.root)?;
        match repo.head() {
            Ok(head) => Ok(head.peel_to_commit().ok().map(|c| c.id().to_string())),
            Err(_) => Ok(None),
        }
    }

    /// Untracked and modified entries in the working tree.
    pub fn status_short(&self) -> Result<Vec<StatusEntry>> {
        let repo = Repository::open(&self.root)?;
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;

        let mut entries = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let status = entry.status();
            let untracked = status.is_wt_new();
            let modified = status.is_wt_modified()
                || status.is_index_modified()
                || status.is_index_new();
            if untracked || modified {
                entries.push(StatusEntry {
                    path: path.to_string(),
                    untracked,
                    modified,
                });
            }
        }
        Ok(entries)
    }

    fn with_retry<F>(&self, op: F) -> Result<()>
    where
        F: Fn(&Repository) -> std::result::Result<(), git2::Error>,
    {
        let mut delay = BASE_DELAY;
        let mut last_message = String::new();
        for attempt in 0..MAX_RETRIES {
            let repo = Repository::open(&self.root)?;
            match op(&repo) {
                Ok(()) => return Ok(()),
                Err(err) if is_transient(&err) => {
                    debug!(attempt, message = err.message(), "transient version log error");
                    last_message = err.message().to_string();
                    std::thread::sleep(delay);
                    delay = delay.mul_f64(BACKOFF_FACTOR);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(MemoryError::VersionLog(format!(
            "gave up after {MAX_RETRIES} retries: {last_message}"
        )))
    }
}

fn is_transient(err: &git2::Error) -> bool {
    err.code() == ErrorCode::Locked
        || err.message().contains("index.lock")
        || err.message().contains("failed to lock")
}
