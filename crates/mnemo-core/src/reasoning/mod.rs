//! Reasoning Module
//!
//! The decision pipeline around the stores: persistence policy, conflict
//! detection, resolution-intent validation, routing, episodic decay and the
//! reflection engine.

pub mod conflict;
pub mod decay;
pub mod policy;
pub mod reflection;
pub mod resolution;
pub mod router;

pub use conflict::ConflictEngine;
pub use decay::{DecayEngine, DecayPartition, DecayReport};
pub use policy::MemoryPolicy;
pub use reflection::{Distiller, NullDistiller, ReflectionEngine, ReflectionPolicy};
pub use resolution::ResolutionEngine;
pub use router::MemoryRouter;
