//! Shared harness for the end-to-end scenarios.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mnemo_core::{
    DecisionContent, EventContext, EventKind, Memory, MemoryConfig, MemoryEvent, RecordStatus,
    Source, record,
};

/// A memory instance rooted in a temp directory that lives as long as the
/// harness value.
pub struct TestMemory {
    pub dir: TempDir,
    pub memory: Memory,
}

impl TestMemory {
    pub fn storage_path(&self) -> PathBuf {
        self.dir.path().join("memory")
    }

    pub fn semantic_root(&self) -> PathBuf {
        self.storage_path().join("semantic")
    }
}

/// Open a fresh memory with default configuration.
pub fn open_memory() -> TestMemory {
    let dir = TempDir::new().expect("temp dir");
    let memory = Memory::open(dir.path().join("memory")).expect("open memory");
    TestMemory { dir, memory }
}

/// Open a fresh memory with a customized configuration.
pub fn open_memory_with(configure: impl FnOnce(MemoryConfig) -> MemoryConfig) -> TestMemory {
    let dir = TempDir::new().expect("temp dir");
    let config = configure(MemoryConfig::new(dir.path().join("memory")));
    let memory = Memory::new(config, Box::new(mnemo_core::HashEmbedder::default()))
        .expect("open memory");
    TestMemory { dir, memory }
}

/// Hand-craft a decision record file, bypassing the store (for corruption
/// and invariant-injection scenarios).
pub fn write_decision_file(
    root: &Path,
    id: &str,
    target: &str,
    status: RecordStatus,
    supersedes: Vec<String>,
    superseded_by: Option<String>,
) {
    std::fs::create_dir_all(root).expect("create semantic root");
    let mut ctx = DecisionContent::new(format!("decision {id}"), target, "hand-crafted");
    ctx.status = Some(status);
    ctx.supersedes = supersedes;
    ctx.superseded_by = superseded_by;
    let event = MemoryEvent::new(
        Source::Agent,
        EventKind::Decision,
        format!("decision {id}"),
        EventContext::Decision(ctx),
    )
    .expect("event");
    let text = record::encode_event(&event, &record::render_body(&event)).expect("encode");
    std::fs::write(root.join(id), text).expect("write record");
}

/// An error or result event carrying a target in its free-form context.
pub fn evidence_context(target: &str) -> EventContext {
    let serde_json::Value::Object(map) = serde_json::json!({ "target": target }) else {
        unreachable!()
    };
    EventContext::Free(map)
}
