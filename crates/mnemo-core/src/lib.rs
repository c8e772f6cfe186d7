//! # Mnemo Core
//!
//! Durable, versioned knowledge memory for autonomous agents. Ingests a
//! stream of heterogeneous events and maintains two coupled stores:
//!
//! - **Episodic log**: bounded SQLite append log with decay
//! - **Semantic store**: content-addressed, git-versioned decision records
//!   behind a cross-process advisory lock, a transactional metadata index,
//!   a whole-corpus integrity checker and crash recovery
//!
//! On top of the stores sit the routing pipeline (policy, conflict detection,
//! resolution-intent validation) and the reflection engine (evidence
//! clustering, competing hypotheses, falsification, decay).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mnemo_core::Memory;
//!
//! let memory = Memory::open("./memory")?;
//!
//! // Record a decision
//! let decision = memory.record_decision(
//!     "Use SQLite",
//!     "storage",
//!     "Embedded and zero-ops",
//!     vec![],
//! )?;
//!
//! // Evolve it later
//! let active = memory.semantic().list_active_conflicts("storage")?;
//! memory.supersede_decision("Use Postgres", "storage", "Outgrew SQLite", active, vec![])?;
//!
//! // Search what is currently in force
//! let hits = memory.search_decisions("storage engine", 5, mnemo_core::SearchMode::Strict)?;
//! ```

// ============================================================================
// MODULES
// ============================================================================

pub mod error;
pub mod event;
pub mod memory;
pub mod reasoning;
pub mod record;
pub mod search;
pub mod store;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Errors
pub use error::{IntegrityViolation, MemoryError, Result};

// Event model
pub use event::{
    DecisionContent, EventContext, EventKind, MemoryDecision, MemoryEvent, RecordStatus,
    ResolutionIntent, ResolutionType, Source, StoreType, TrustBoundary, SEMANTIC_KINDS,
};

// Stores
pub use store::{
    ContextPatch, EpisodicRow, EpisodicStore, GitLog, LockMode, MetaIndex, MetaRow, RowStatus,
    SemanticStore, StoreLock,
};

// Reasoning
pub use reasoning::{
    ConflictEngine, DecayEngine, DecayPartition, DecayReport, Distiller, MemoryPolicy,
    MemoryRouter, NullDistiller, ReflectionEngine, ReflectionPolicy, ResolutionEngine,
};

// Search
pub use search::{cosine_similarity, Embedder, HashEmbedder, SearchHit, SearchMode, VectorStore};

// Façade
pub use memory::{Memory, MemoryConfig};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Record schema version written into every event header
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        DecisionContent, EventContext, EventKind, Memory, MemoryConfig, MemoryDecision,
        MemoryError, MemoryEvent, RecordStatus, ResolutionIntent, Result, SearchMode, Source,
        StoreType, TrustBoundary,
    };
}
