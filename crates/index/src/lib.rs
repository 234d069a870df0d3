use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod error;
mod manager;
#[cfg(any(test, feature = "memory"))]
mod memory;
mod pinecone;

pub use error::{IndexError, Result};
pub use manager::{ensure_index, wait_until_ready, EnsureOutcome, ReadinessPolicy};
#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryIndex;
pub use pinecone::{PineconeConfig, PineconeIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Euclidean,
    Dotproduct,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclidean => "euclidean",
            Metric::Dotproduct => "dotproduct",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "cosine" => Some(Metric::Cosine),
            "euclidean" => Some(Metric::Euclidean),
            "dotproduct" => Some(Metric::Dotproduct),
            _ => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub cloud: String,
    pub region: String,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, dimension: usize, metric: Metric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
    pub ready: bool,
    pub host: Option<String>,
}

/// Vector plus the metadata stored with it; the id is its identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVector {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

/// Remote (or in-process) vector database addressed by index name.
pub trait VectorIndex: Send + Sync {
    /// `None` when no index with that name exists.
    fn describe(&self, name: &str) -> Result<Option<IndexDescription>>;

    fn create(&self, spec: &IndexSpec) -> Result<()>;

    fn delete(&self, name: &str) -> Result<()>;

    /// Insert-or-overwrite by id. The batch is accepted whole or rejected whole.
    fn upsert(&self, name: &str, vectors: &[StoredVector]) -> Result<usize>;

    /// Up to `top_k` nearest vectors, best first. An empty index yields no matches.
    fn query(&self, name: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredVector>>;
}
