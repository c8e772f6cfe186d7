//! Search Module
//!
//! Semantic search over decision records through a pluggable [`Embedder`].
//! The engine stores fixed-dimension vectors per record and scans them with
//! cosine similarity; ranking beyond that is the embedder's problem.

mod vector;

pub use vector::{SearchHit, VectorStore};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Search result filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Only active decisions.
    Strict,
    /// One hit per target: its latest active record.
    Balanced,
    /// The full history, superseded records included.
    Audit,
}

impl SearchMode {
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Some(SearchMode::Strict),
            "balanced" => Some(SearchMode::Balanced),
            "audit" => Some(SearchMode::Audit),
            _ => None,
        }
    }
}

/// Embedding provider contract: a fixed-length vector per text, deterministic
/// for identical inputs.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
}

/// Deterministic embedder derived from a SHA-256 digest of the input.
///
/// Stands in where no real provider is wired up (tests, offline use). Close
/// texts do not land close together; only exact-text determinism is
/// guaranteed.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimensions)
            .map(|i| {
                let byte = digest[i % digest.len()] as i64;
                (((byte * (i as i64 + 1)) % 2000 - 1000) as f32) / 1000.0
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity of two vectors; 0.0 when either is degenerate.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
