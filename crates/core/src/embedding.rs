use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const BLANK_TOKEN: &str = "\u{0}blank";

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            seed: 1337,
        }
    }
}

/// Bag-of-tokens embedder: each lowercased token bumps one hashed bucket,
/// then the vector is L2-normalized. Deterministic across processes.
///
/// Text without tokens maps to a fixed unit vector rather than all zeros,
/// which managed indexes reject on upsert.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let dims = self.dimensions();
        let mut vector = vec![0f32; dims];
        for token in text.split_whitespace() {
            let bucket = self.bucket_for(token);
            vector[bucket] += 1.0;
        }
        if vector.iter().all(|v| *v == 0.0) {
            vector[self.bucket_for(BLANK_TOKEN)] = 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.config.seed);
        token.to_lowercase().hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions()
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_unit_length_and_stable() {
        let embedder = HashEmbedder::new(HashEmbedderConfig {
            dimensions: 32,
            seed: 7,
        });
        let a = embedder.embed_text("10m Copper wire");
        let b = embedder.embed_text("10m copper WIRE");
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blank_text_is_never_the_zero_vector() {
        let embedder = HashEmbedder::new(HashEmbedderConfig::default());
        for text in ["", "   ", "\t\n"] {
            let vector = embedder.embed_text(text);
            assert!(vector.iter().any(|v| *v != 0.0));
            let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
        assert_eq!(embedder.embed_text(""), embedder.embed_text("  "));
    }
}
