use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoqError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("xlsx writer error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("unsupported file format: {0:?}")]
    UnsupportedFormat(String),
    #[error("input file must contain a '{0}' column")]
    MissingColumn(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BoqError>;

impl BoqError {
    /// True for failures caused by the caller's input rather than the environment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BoqError::UnsupportedFormat(_) | BoqError::MissingColumn(_)
        )
    }
}

impl From<anyhow::Error> for BoqError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
