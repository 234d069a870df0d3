use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use boq_core::{HashEmbedder, HashEmbedderConfig};

use crate::config::{EmbeddingConfig, EmbeddingProvider};

#[derive(Clone)]
pub enum EmbeddingBackend {
    Hash(HashEmbedder),
    OpenAi(OpenAiEmbeddingClient),
    Tei(TeiEmbeddingClient),
}

/// Text to fixed-length vector. Built once per process and shared by reference.
#[derive(Clone)]
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
    dimensions: usize,
}

impl EmbeddingClient {
    pub fn from_config(config: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        let backend = match config.provider {
            EmbeddingProvider::OpenAi => {
                EmbeddingBackend::OpenAi(OpenAiEmbeddingClient::new(&config.model, timeout)?)
            }
            EmbeddingProvider::Tei => EmbeddingBackend::Tei(TeiEmbeddingClient::new(
                &config.url,
                &config.model,
                timeout,
            )?),
            EmbeddingProvider::Hash => EmbeddingBackend::Hash(HashEmbedder::new(
                HashEmbedderConfig {
                    dimensions: config.dimensions,
                    seed: 1337,
                },
            )),
        };
        Ok(Self {
            backend,
            dimensions: config.dimensions,
        })
    }

    pub fn hash(dimensions: usize) -> Self {
        let embedder = HashEmbedder::new(HashEmbedderConfig {
            dimensions,
            ..HashEmbedderConfig::default()
        });
        Self {
            dimensions: embedder.dimensions(),
            backend: EmbeddingBackend::Hash(embedder),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn backend(&self) -> &EmbeddingBackend {
        &self.backend
    }

    /// One vector per input, in input order.
    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match &self.backend {
            EmbeddingBackend::Hash(embedder) => inputs
                .iter()
                .map(|text| embedder.embed_text(text))
                .collect(),
            EmbeddingBackend::OpenAi(client) => client.embed_batch(inputs)?,
            EmbeddingBackend::Tei(client) => client.embed_batch(inputs)?,
        };
        if vectors.len() != inputs.len() {
            return Err(anyhow!(
                "embedding backend returned {} vectors for {} inputs",
                vectors.len(),
                inputs.len()
            ));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(anyhow!(
                "embedding has dimension {}, index expects {}",
                bad.len(),
                self.dimensions
            ));
        }
        Ok(vectors)
    }

    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = vec![text.to_string()];
        let mut output = self.embed_batch(&inputs)?;
        Ok(output.pop().unwrap_or_default())
    }
}

#[derive(Clone)]
pub struct OpenAiEmbeddingClient {
    http: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiEmbeddingClient {
    pub fn new(model: &str, timeout: Duration) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY is required for openai embeddings"))?;
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            model: model.to_string(),
            api_key,
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        })
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.model,
            "input": inputs,
        });
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .context("openai embeddings request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "openai embeddings request failed: {}",
                response.status()
            ));
        }
        let mut parsed: OpenAiEmbeddingResponse = response.json()?;
        parsed.data.sort_by_key(|data| data.index);
        Ok(parsed.data.into_iter().map(|data| data.embedding).collect())
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for a text-embeddings-inference server hosting a sentence-transformers model.
#[derive(Clone)]
pub struct TeiEmbeddingClient {
    http: Client,
    url: String,
    model: String,
}

impl TeiEmbeddingClient {
    pub fn new(url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(timeout).build()?,
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "inputs": inputs,
            "normalize": true,
        });
        let response = self
            .http
            .post(format!("{}/embed", self.url))
            .json(&payload)
            .send()
            .with_context(|| format!("embedding request to {} failed", self.url))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "embedding server ({}) returned {}",
                self.model,
                response.status()
            ));
        }
        Ok(response.json()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_matches_individual_calls() {
        let client = EmbeddingClient::hash(64);
        let texts = vec![
            "10m copper wire".to_string(),
            "5 switches".to_string(),
            "".to_string(),
        ];
        let batch = client.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(batch.iter()) {
            assert_eq!(&client.embed(text).unwrap(), vector);
        }
    }

    #[test]
    fn hash_backend_reports_its_dimension() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hash,
            model: "hash".into(),
            url: String::new(),
            dimensions: 16,
        };
        let client = EmbeddingClient::from_config(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(client.dimensions(), 16);
        assert_eq!(client.embed("copper").unwrap().len(), 16);
    }

    #[test]
    fn empty_batch_makes_no_call() {
        let client = EmbeddingClient::hash(8);
        assert!(client.embed_batch(&[]).unwrap().is_empty());
    }
}
