use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use boq_core::{
    item_id, read_table, read_table_path, row_id, ItemMetadata, MetadataCache, QueryMatch,
    SourceRow, Table, VectorIdLog, DESCRIPTION_COLUMN,
};
use boq_index::{ensure_index, EnsureOutcome, IndexError, StoredVector};

use crate::context::Services;
use crate::extractor::ItemExtractor;
use crate::pricing::{CostSummary, MaterialQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// One vector per extracted item, metadata mirrored into the local cache.
    #[default]
    Extract,
    /// One vector per row built from all of its cells; ids go to the id log.
    Concatenate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub mode: IngestMode,
    pub recreate: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            mode: IngestMode::Extract,
            recreate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub rows: usize,
    pub vectors: usize,
    pub ids: Vec<String>,
    #[serde(skip)]
    pub outcome: EnsureOutcome,
}

impl IngestReport {
    pub fn message(&self) -> String {
        format!("Upserted {} vectors.", self.vectors)
    }
}

pub fn ingest_file(services: &Services, path: &Path, options: IngestOptions) -> Result<IngestReport> {
    let table = read_table_path(path)?;
    info!(path = %path.display(), rows = table.len(), "loaded input file");
    ingest_table(services, &table, options)
}

pub fn ingest_bytes(
    services: &Services,
    filename: &str,
    bytes: &[u8],
    options: IngestOptions,
) -> Result<IngestReport> {
    let table = read_table(filename, bytes)?;
    info!(file = filename, rows = table.len(), "loaded input upload");
    ingest_table(services, &table, options)
}

struct Prepared {
    rows: usize,
    vectors: Vec<StoredVector>,
    metadata: Vec<ItemMetadata>,
}

fn ingest_table(services: &Services, table: &Table, options: IngestOptions) -> Result<IngestReport> {
    // Everything that can reject the input runs before the index is touched.
    let prepared = match options.mode {
        IngestMode::Extract => {
            let rows = table.source_rows(DESCRIPTION_COLUMN)?;
            prepare_extracted(services, &rows)?
        }
        IngestMode::Concatenate => prepare_concatenated(services, &table.concatenated_rows())?,
    };

    let outcome = ensure_index(
        services.index.as_ref(),
        &services.config.index_spec(),
        options.recreate,
        &services.config.readiness_policy(),
    )?;

    let vectors = if prepared.vectors.is_empty() {
        0
    } else {
        services
            .index
            .upsert(&services.config.index_name, &prepared.vectors)
            .context("upsert failed")?
    };
    info!(index = %services.config.index_name, vectors, rows = prepared.rows, "upserted vectors");

    let ids: Vec<String> = prepared.vectors.iter().map(|v| v.id.clone()).collect();
    let output_dir = &services.config.output_dir;
    match options.mode {
        IngestMode::Extract => MetadataCache::in_dir(output_dir)
            .write_all(&prepared.metadata)
            .context("failed to write metadata cache")?,
        IngestMode::Concatenate => VectorIdLog::in_dir(output_dir)
            .write(&ids)
            .context("failed to write vector id log")?,
    }

    Ok(IngestReport {
        rows: prepared.rows,
        vectors,
        ids,
        outcome,
    })
}

fn prepare_extracted(services: &Services, rows: &[SourceRow]) -> Result<Prepared> {
    let texts: Vec<String> = rows.iter().map(|row| row.text.clone()).collect();
    let embeddings = services
        .embeddings
        .embed_batch(&texts)
        .context("failed to embed descriptions")?;
    let extractor = ItemExtractor::new(services.model.as_ref());

    let mut vectors = Vec::new();
    let mut metadata = Vec::new();
    for (row, embedding) in rows.iter().zip(embeddings) {
        let items = extractor.extract(&row.text);
        if items.is_empty() {
            let meta = ItemMetadata::placeholder(&row.text);
            vectors.push(stored(row_id(row.index), embedding, &meta)?);
            metadata.push(meta);
            continue;
        }
        for (j, item) in items.iter().enumerate() {
            let meta = ItemMetadata::for_item(&row.text, item);
            vectors.push(stored(item_id(row.index, j), embedding.clone(), &meta)?);
            metadata.push(meta);
        }
    }
    debug!(rows = rows.len(), vectors = vectors.len(), "prepared extracted vectors");
    Ok(Prepared {
        rows: rows.len(),
        vectors,
        metadata,
    })
}

fn prepare_concatenated(services: &Services, texts: &[String]) -> Result<Prepared> {
    let embeddings = services
        .embeddings
        .embed_batch(texts)
        .context("failed to embed rows")?;
    let mut vectors = Vec::with_capacity(texts.len());
    let mut metadata = Vec::with_capacity(texts.len());
    for (i, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
        let meta = ItemMetadata::text_only(text);
        vectors.push(stored(row_id(i), embedding, &meta)?);
        metadata.push(meta);
    }
    Ok(Prepared {
        rows: texts.len(),
        vectors,
        metadata,
    })
}

fn stored(id: String, values: Vec<f32>, metadata: &ItemMetadata) -> Result<StoredVector> {
    Ok(StoredVector {
        id,
        values,
        metadata: serde_json::to_value(metadata)?,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutcome {
    pub matches: Vec<QueryMatch>,
    pub cost: CostSummary,
    pub summary_path: Option<PathBuf>,
}

impl QueryOutcome {
    pub fn top(&self) -> Option<&QueryMatch> {
        self.matches.first()
    }

    pub fn headline(&self) -> String {
        match self.top() {
            Some(m) => format!("{} — (score {:.3})", m.text, m.score),
            None => "No results found.".to_string(),
        }
    }
}

/// Nearest stored items for `text`, priced against the configured price file.
pub fn query(services: &Services, text: &str, top_k: usize) -> Result<QueryOutcome> {
    let vector = services
        .embeddings
        .embed(text)
        .context("failed to embed query")?;
    let scored = match services
        .index
        .query(&services.config.index_name, &vector, top_k.max(1))
    {
        Ok(scored) => scored,
        Err(IndexError::Missing(name)) => {
            warn!(index = %name, "index does not exist yet, nothing to match");
            Vec::new()
        }
        Err(err) => return Err(err).context("vector query failed"),
    };
    let matches: Vec<QueryMatch> = scored
        .into_iter()
        .map(|hit| QueryMatch::from_metadata(hit.id, hit.score, metadata_of(hit.metadata)))
        .collect();
    info!(query = text, matches = matches.len(), "query answered");

    let queries: Vec<MaterialQuery> = matches
        .iter()
        .filter(|m| !m.material.trim().is_empty())
        .map(|m| MaterialQuery::new(m.material.clone(), m.quantity.clone()))
        .collect();
    if queries.is_empty() {
        return Ok(QueryOutcome {
            matches,
            ..QueryOutcome::default()
        });
    }
    let (cost, summary_path) = price_and_persist(services, &queries);
    Ok(QueryOutcome {
        matches,
        cost,
        summary_path,
    })
}

fn metadata_of(value: Value) -> ItemMetadata {
    match serde_json::from_value::<ItemMetadata>(value.clone()) {
        Ok(metadata) => metadata,
        Err(_) => ItemMetadata::text_only(value.get("text").and_then(Value::as_str).unwrap_or("")),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CostReport {
    pub summary: CostSummary,
    pub path: Option<PathBuf>,
}

/// Prices a hand-written list of materials without touching the index.
pub fn compute_cost(services: &Services, queries: &[MaterialQuery]) -> Result<CostReport> {
    let (summary, path) = price_and_persist(services, queries);
    Ok(CostReport { summary, path })
}

/// A failed summary write keeps the computed summary and reports no path.
fn price_and_persist(
    services: &Services,
    queries: &[MaterialQuery],
) -> (CostSummary, Option<PathBuf>) {
    let calculator = services.cost_calculator();
    let summary = calculator.compute(queries);
    if summary.is_empty() {
        return (summary, None);
    }
    match calculator.write_summary(&summary) {
        Ok(path) => (summary, Some(path)),
        Err(err) => {
            error!(error = %err, "failed to persist cost summary");
            (summary, None)
        }
    }
}

/// Everything the last extraction ingest upserted, read from the local cache.
pub fn list_cached(services: &Services) -> Vec<ItemMetadata> {
    MetadataCache::in_dir(&services.config.output_dir).load_or_empty()
}

pub fn prepare_index(services: &Services, recreate: bool) -> Result<EnsureOutcome> {
    Ok(ensure_index(
        services.index.as_ref(),
        &services.config.index_spec(),
        recreate,
        &services.config.readiness_policy(),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn headline_formats_top_match() {
        let outcome = QueryOutcome {
            matches: vec![QueryMatch {
                id: "id-0-0".into(),
                material: "copper wire".into(),
                quantity: 10.0.into(),
                text: "10m copper wire".into(),
                score: 0.87312,
            }],
            ..QueryOutcome::default()
        };
        assert_eq!(outcome.headline(), "10m copper wire — (score 0.873)");
        assert_eq!(QueryOutcome::default().headline(), "No results found.");
    }

    #[test]
    fn unknown_metadata_keeps_its_text() {
        let meta = metadata_of(json!({"text": "5 switches", "Sub QTY": [1, 2]}));
        assert_eq!(meta.text, "5 switches");
        assert!(meta.material.is_none());
    }

    #[test]
    fn default_ingest_recreates_and_extracts() {
        let options = IngestOptions::default();
        assert!(options.recreate);
        assert_eq!(options.mode, IngestMode::Extract);
    }
}
