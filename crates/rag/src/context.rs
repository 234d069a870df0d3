use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use boq_index::{PineconeIndex, VectorIndex};
use boq_llm::{ChatModel, LlmClient};

use crate::config::BoqConfig;
use crate::embedding::EmbeddingClient;
use crate::pricing::CostCalculator;

/// Long-lived collaborators, built once at startup and passed by reference
/// into every pipeline call.
pub struct Services {
    pub config: BoqConfig,
    pub embeddings: EmbeddingClient,
    pub index: Arc<dyn VectorIndex>,
    pub model: Arc<dyn ChatModel>,
}

impl Services {
    pub fn from_config(config: BoqConfig) -> Result<Self> {
        config.validate()?;
        let embeddings = EmbeddingClient::from_config(&config.embedding, config.llm_timeout)
            .context("failed to initialise embedding encoder")?;
        let index = PineconeIndex::new(config.pinecone())
            .context("failed to initialise vector database client")?;
        let model = LlmClient::with_timeout(
            config.llm_provider,
            config.llm_model.clone(),
            config.llm_timeout,
        )
        .context("failed to initialise language model client")?;
        info!(
            index = %config.index_name,
            dimension = config.dimension,
            llm = config.llm_provider.as_str(),
            "services ready"
        );
        Ok(Self::new(config, embeddings, Arc::new(index), Arc::new(model)))
    }

    pub fn new(
        config: BoqConfig,
        embeddings: EmbeddingClient,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            config,
            embeddings,
            index,
            model,
        }
    }

    pub fn cost_calculator(&self) -> CostCalculator {
        CostCalculator::new(&self.config.price_file, &self.config.output_dir)
    }

    /// Drops the shared clients; nothing outlives this call.
    pub fn shutdown(self) {
        info!(index = %self.config.index_name, "shutting down services");
        drop(self);
    }
}
