//! Error types for the memory engine.
//!
//! Every failure mode is a typed variant; callers pattern-match instead of
//! inspecting sentinel strings.

use std::path::PathBuf;

/// Violation of a structural invariant across the semantic corpus.
///
/// Carries the offending record id (when one can be named) and a free-form
/// detail naming the other end of the broken edge.
#[derive(Debug, Clone)]
pub struct IntegrityViolation {
    /// Human-readable description of the broken invariant.
    pub message: String,
    /// Record the violation was detected on, if attributable.
    pub record_id: Option<String>,
    /// The other record involved (conflicting file, dangling target, ...).
    pub detail: Option<String>,
}

impl IntegrityViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            record_id: None,
            detail: None,
        }
    }

    pub fn for_record(message: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            record_id: Some(record_id.into()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.record_id {
            Some(id) => write!(f, "[{}] {}", id, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for IntegrityViolation {}

/// Memory engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Event or record header violates its schema
    #[error("Schema violation: {0}")]
    Schema(String),
    /// Trust boundary or role check failed
    #[error("{0}")]
    Permission(String),
    /// Metadata index uniqueness violated (one active decision per target)
    #[error("Conflict: target '{target}' already has an active decision; use supersede")]
    Conflict {
        /// Target the active decision already exists for
        target: String,
    },
    /// Whole-corpus integrity check failed
    #[error("Integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),
    /// Illegal field or status change on update
    #[error("Transition error: {0}")]
    Transition(String),
    /// Advisory lock acquisition exceeded its timeout
    #[error("Could not acquire {mode} lock on {path} after {seconds}s")]
    LockTimeout {
        mode: &'static str,
        path: PathBuf,
        seconds: u64,
    },
    /// Version log backend failed after bounded retries
    #[error("Version log error: {0}")]
    VersionLog(String),
    /// Reference to a non-existent record
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Record file could not be parsed or serialized
    #[error("Record codec error: {0}")]
    Codec(String),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<git2::Error> for MemoryError {
    fn from(err: git2::Error) -> Self {
        Self::VersionLog(err.message().to_string())
    }
}

/// Memory engine result type
pub type Result<T> = std::result::Result<T, MemoryError>;
