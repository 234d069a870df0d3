pub mod config;
pub mod context;
pub mod embedding;
pub mod extractor;
pub mod pipeline;
pub mod pricing;

pub use config::{BoqConfig, EmbeddingConfig, EmbeddingProvider, FileConfig, DEFAULT_CONFIG_FILE};
pub use context::Services;
pub use embedding::{EmbeddingBackend, EmbeddingClient};
pub use extractor::ItemExtractor;
pub use pipeline::{
    compute_cost, ingest_bytes, ingest_file, list_cached, prepare_index, query, CostReport,
    IngestMode, IngestOptions, IngestReport, QueryOutcome,
};
pub use pricing::{
    compute_costs, CostCalculator, CostSummary, MaterialQuery, PriceTable, GRAND_TOTAL_LABEL,
};
pub use boq_llm::{ChatModel, LlmClient, LlmProvider, LlmRequest, LlmResponse};
