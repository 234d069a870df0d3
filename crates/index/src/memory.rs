use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::error::{IndexError, Result};
use crate::{IndexDescription, IndexSpec, Metric, ScoredVector, StoredVector, VectorIndex};

/// In-process stand-in for the managed vector database, used by tests.
#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<MemoryState>,
    ready_delay: usize,
}

#[derive(Default)]
struct MemoryState {
    indexes: HashMap<String, Collection>,
    creates: usize,
    deletes: usize,
}

struct Collection {
    spec: IndexSpec,
    vectors: BTreeMap<String, StoredVector>,
    pending_polls: usize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// New indexes report not-ready for the first `polls` describe calls.
    pub fn with_ready_delay(polls: usize) -> Self {
        Self {
            ready_delay: polls,
            ..Self::default()
        }
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().creates
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().deletes
    }

    pub fn vector_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .indexes
            .get(name)
            .map(|collection| collection.vectors.len())
            .unwrap_or(0)
    }

    pub fn get(&self, name: &str, id: &str) -> Option<StoredVector> {
        self.state
            .lock()
            .indexes
            .get(name)
            .and_then(|collection| collection.vectors.get(id).cloned())
    }
}

impl VectorIndex for MemoryIndex {
    fn describe(&self, name: &str) -> Result<Option<IndexDescription>> {
        let mut state = self.state.lock();
        Ok(state.indexes.get_mut(name).map(|collection| {
            let ready = collection.pending_polls == 0;
            collection.pending_polls = collection.pending_polls.saturating_sub(1);
            IndexDescription {
                name: collection.spec.name.clone(),
                dimension: collection.spec.dimension,
                metric: collection.spec.metric,
                ready,
                host: None,
            }
        }))
    }

    fn create(&self, spec: &IndexSpec) -> Result<()> {
        let mut state = self.state.lock();
        if state.indexes.contains_key(&spec.name) {
            return Err(IndexError::Api {
                status: 409,
                body: format!("index '{}' already exists", spec.name),
            });
        }
        state.creates += 1;
        state.indexes.insert(
            spec.name.clone(),
            Collection {
                spec: spec.clone(),
                vectors: BTreeMap::new(),
                pending_polls: self.ready_delay,
            },
        );
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.deletes += 1;
        state.indexes.remove(name);
        Ok(())
    }

    fn upsert(&self, name: &str, vectors: &[StoredVector]) -> Result<usize> {
        let mut state = self.state.lock();
        let collection = state
            .indexes
            .get_mut(name)
            .ok_or_else(|| IndexError::Missing(name.to_string()))?;
        if let Some(bad) = vectors
            .iter()
            .find(|vector| vector.values.len() != collection.spec.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                name: name.to_string(),
                expected: collection.spec.dimension,
                found: bad.values.len(),
            });
        }
        for vector in vectors {
            collection.vectors.insert(vector.id.clone(), vector.clone());
        }
        Ok(vectors.len())
    }

    fn query(&self, name: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredVector>> {
        let state = self.state.lock();
        let collection = state
            .indexes
            .get(name)
            .ok_or_else(|| IndexError::Missing(name.to_string()))?;
        let metric = collection.spec.metric;
        let mut hits: Vec<ScoredVector> = collection
            .vectors
            .values()
            .map(|stored| ScoredVector {
                id: stored.id.clone(),
                score: score(metric, vector, &stored.values),
                metadata: stored.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::Dotproduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        Metric::Euclidean => -a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}
