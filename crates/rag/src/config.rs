use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use boq_core::BoqError;
use boq_index::{IndexSpec, Metric, PineconeConfig, ReadinessPolicy};
use boq_llm::LlmProvider;

pub const DEFAULT_CONFIG_FILE: &str = "boq.toml";
pub const DEFAULT_DIMENSION: usize = 768;
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";
pub const DEFAULT_TOP_K: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Tei,
    OpenAi,
    Hash,
}

impl EmbeddingProvider {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "tei" => Some(EmbeddingProvider::Tei),
            "openai" => Some(EmbeddingProvider::OpenAi),
            "hash" => Some(EmbeddingProvider::Hash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub url: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct BoqConfig {
    pub pinecone_api_key: String,
    pub index_name: String,
    pub pinecone_cloud: String,
    pub pinecone_region: String,
    pub pinecone_controller_url: String,
    pub dimension: usize,
    pub metric: Metric,
    pub embedding: EmbeddingConfig,
    pub llm_provider: LlmProvider,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub output_dir: PathBuf,
    pub price_file: PathBuf,
    pub top_k: usize,
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
}

impl BoqConfig {
    /// Defaults for everything except the two required settings.
    pub fn new(pinecone_api_key: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            pinecone_api_key: pinecone_api_key.into(),
            index_name: index_name.into(),
            pinecone_cloud: "aws".to_string(),
            pinecone_region: "us-east-1".to_string(),
            pinecone_controller_url: "https://api.pinecone.io".to_string(),
            dimension: DEFAULT_DIMENSION,
            metric: Metric::Cosine,
            embedding: EmbeddingConfig {
                provider: EmbeddingProvider::Tei,
                model: DEFAULT_EMBEDDING_MODEL.to_string(),
                url: "http://localhost:8080".to_string(),
                dimensions: DEFAULT_DIMENSION,
            },
            llm_provider: LlmProvider::OpenAi,
            llm_model: LlmProvider::OpenAi.default_model().to_string(),
            llm_timeout: Duration::from_secs(60),
            output_dir: PathBuf::from("outputs"),
            price_file: PathBuf::from("data/price_list.xlsx"),
            top_k: DEFAULT_TOP_K,
            ready_timeout: Duration::from_secs(120),
            ready_poll: Duration::from_millis(1000),
        }
    }

    /// Defaults, then the TOML file (if present), then the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let file = FileConfig::read(path)?;
        Self::from_sources(file, |key| env::var(key).ok())
    }

    pub fn from_sources(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let api_key = get("PINECONE_API_KEY").ok_or_else(|| {
            BoqError::Config("PINECONE_API_KEY is not set".to_string())
        })?;
        let index_name = get("PINECONE_INDEX_NAME")
            .or(file.pinecone.index_name)
            .ok_or_else(|| BoqError::Config("PINECONE_INDEX_NAME is not set".to_string()))?;
        let mut cfg = Self::new(api_key, index_name);

        if let Some(cloud) = get("PINECONE_CLOUD").or(file.pinecone.cloud) {
            cfg.pinecone_cloud = cloud;
        }
        if let Some(region) = get("PINECONE_REGION").or(file.pinecone.region) {
            cfg.pinecone_region = region;
        }
        if let Some(url) = get("PINECONE_CONTROLLER_URL").or(file.pinecone.controller_url) {
            cfg.pinecone_controller_url = url;
        }
        if let Some(dimension) = parsed(get("BOQ_INDEX_DIMENSION"), "BOQ_INDEX_DIMENSION")?
            .or(file.index.dimension)
        {
            cfg.dimension = dimension;
        }
        if let Some(metric) = get("BOQ_INDEX_METRIC").or(file.index.metric) {
            cfg.metric = Metric::from_str(&metric)
                .ok_or_else(|| BoqError::Config(format!("unknown index metric {metric}")))?;
        }

        if let Some(provider) = get("EMBEDDING_PROVIDER").or(file.embedding.provider) {
            cfg.embedding.provider = EmbeddingProvider::from_str(&provider).ok_or_else(|| {
                BoqError::Config(format!("unknown embedding provider {provider}"))
            })?;
        }
        if let Some(model) = get("EMBEDDING_MODEL").or(file.embedding.model) {
            cfg.embedding.model = model;
        }
        if let Some(url) = get("EMBEDDING_URL").or(file.embedding.url) {
            cfg.embedding.url = url;
        }
        cfg.embedding.dimensions = cfg.dimension;

        if let Some(provider) = get("BOQ_LLM_PROVIDER").or(file.llm.provider) {
            cfg.llm_provider = LlmProvider::from_str(&provider)
                .ok_or_else(|| BoqError::Config(format!("unknown llm provider {provider}")))?;
            cfg.llm_model = cfg.llm_provider.default_model().to_string();
        }
        if let Some(model) = get("BOQ_LLM_MODEL").or(file.llm.model) {
            cfg.llm_model = model;
        }
        if let Some(secs) =
            parsed(get("BOQ_LLM_TIMEOUT_SECS"), "BOQ_LLM_TIMEOUT_SECS")?.or(file.llm.timeout_secs)
        {
            cfg.llm_timeout = Duration::from_secs(secs);
        }

        if let Some(dir) = get("BOQ_OUTPUT_DIR").or(file.paths.output_dir) {
            cfg.output_dir = PathBuf::from(dir);
        }
        if let Some(prices) = get("BOQ_PRICE_FILE").or(file.paths.price_file) {
            cfg.price_file = PathBuf::from(prices);
        }
        if let Some(top_k) = parsed(get("BOQ_TOP_K"), "BOQ_TOP_K")?.or(file.query.top_k) {
            cfg.top_k = top_k;
        }
        if let Some(secs) = parsed(get("BOQ_READY_TIMEOUT_SECS"), "BOQ_READY_TIMEOUT_SECS")?
            .or(file.readiness.timeout_secs)
        {
            cfg.ready_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) =
            parsed(get("BOQ_READY_POLL_MS"), "BOQ_READY_POLL_MS")?.or(file.readiness.poll_ms)
        {
            cfg.ready_poll = Duration::from_millis(ms);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(BoqError::Config("index dimension must be positive".to_string()).into());
        }
        if self.embedding.dimensions != self.dimension {
            return Err(BoqError::Config(format!(
                "embedding dimension {} does not match index dimension {}",
                self.embedding.dimensions, self.dimension
            ))
            .into());
        }
        if self.top_k == 0 {
            return Err(BoqError::Config("top_k must be at least 1".to_string()).into());
        }
        Ok(())
    }

    pub fn index_spec(&self) -> IndexSpec {
        IndexSpec {
            name: self.index_name.clone(),
            dimension: self.dimension,
            metric: self.metric,
            cloud: self.pinecone_cloud.clone(),
            region: self.pinecone_region.clone(),
        }
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::new(self.ready_timeout, self.ready_poll)
    }

    pub fn pinecone(&self) -> PineconeConfig {
        PineconeConfig {
            controller_url: self.pinecone_controller_url.clone(),
            ..PineconeConfig::new(self.pinecone_api_key.clone())
        }
    }
}

fn parsed<T: std::str::FromStr>(value: Option<String>, key: &str) -> Result<Option<T>> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| BoqError::Config(format!("{key} has an invalid value: {raw}")).into()),
        None => Ok(None),
    }
}

/// Optional `boq.toml`; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub pinecone: PineconeSection,
    pub index: IndexSection,
    pub embedding: EmbeddingSection,
    pub llm: LlmSection,
    pub paths: PathsSection,
    pub query: QuerySection,
    pub readiness: ReadinessSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PineconeSection {
    pub index_name: Option<String>,
    pub cloud: Option<String>,
    pub region: Option<String>,
    pub controller_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    pub dimension: Option<usize>,
    pub metric: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub output_dir: Option<String>,
    pub price_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    pub top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReadinessSection {
    pub timeout_secs: Option<u64>,
    pub poll_ms: Option<u64>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_credentials_refuse_to_start() {
        let err = BoqConfig::from_sources(FileConfig::default(), env_of(&[])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoqError>(),
            Some(BoqError::Config(msg)) if msg.contains("PINECONE_API_KEY")
        ));
        let err = BoqConfig::from_sources(
            FileConfig::default(),
            env_of(&[("PINECONE_API_KEY", "pk-test")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("PINECONE_INDEX_NAME"));
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileConfig::parse(
            r#"
            [pinecone]
            index_name = "from-file"
            [index]
            dimension = 384
            [query]
            top_k = 3
            "#,
        )
        .unwrap();
        let cfg = BoqConfig::from_sources(
            file,
            env_of(&[
                ("PINECONE_API_KEY", "pk-test"),
                ("PINECONE_INDEX_NAME", "from-env"),
                ("EMBEDDING_PROVIDER", "hash"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.index_name, "from-env");
        assert_eq!(cfg.dimension, 384);
        assert_eq!(cfg.embedding.dimensions, 384);
        assert_eq!(cfg.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(cfg.top_k, 3);
        assert_eq!(cfg.metric, Metric::Cosine);
    }

    #[test]
    fn invalid_numbers_are_configuration_errors() {
        let err = BoqConfig::from_sources(
            FileConfig::default(),
            env_of(&[
                ("PINECONE_API_KEY", "pk-test"),
                ("PINECONE_INDEX_NAME", "boq"),
                ("BOQ_TOP_K", "many"),
            ]),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BoqError>(),
            Some(BoqError::Config(_))
        ));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileConfig::read(&dir.path().join("boq.toml")).unwrap();
        assert!(file.pinecone.index_name.is_none());
    }
}
