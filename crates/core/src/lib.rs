mod cache;
mod embedding;
mod error;
mod model;
mod normalization;
mod spreadsheet;

pub use cache::{MetadataCache, VectorIdLog, METADATA_FILE, VECTOR_IDS_FILE};
pub use embedding::{HashEmbedder, HashEmbedderConfig};
pub use error::{BoqError, Result};
pub use model::{
    item_id, row_id, CostLine, ExtractedItem, ItemMetadata, PriceEntry, Quantity, QueryMatch,
    SourceRow,
};
pub use normalization::{normalize_material_name, parse_amount};
pub use spreadsheet::{
    read_table, read_table_path, SpreadsheetFormat, Table, DESCRIPTION_COLUMN,
};
