use std::time::Duration;

use thiserror::Error;

use crate::Metric;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vector database returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("index '{name}' has dimension {found}, expected {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("index '{name}' uses metric {found}, expected {expected}")]
    MetricMismatch {
        name: String,
        expected: Metric,
        found: Metric,
    },
    #[error("index '{name}' not ready after {waited:?}")]
    NotReady { name: String, waited: Duration },
    #[error("index '{0}' does not exist")]
    Missing(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
