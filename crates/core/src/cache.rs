use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{const_mutex, Mutex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::ItemMetadata;

pub const METADATA_FILE: &str = "pinecone_metadata.json";
pub const VECTOR_IDS_FILE: &str = "vector_ids.json";

// Serializes writers inside one process; other processes are not coordinated.
static WRITE_LOCK: Mutex<()> = const_mutex(());

/// Local mirror of the metadata most recently upserted by an extraction ingest.
#[derive(Debug, Clone)]
pub struct MetadataCache {
    path: PathBuf,
}

impl MetadataCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(METADATA_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the whole file; earlier ingestions are not kept.
    pub fn write_all(&self, records: &[ItemMetadata]) -> Result<()> {
        write_json_atomic(&self.path, records)?;
        debug!(path = %self.path.display(), records = records.len(), "metadata cache written");
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<ItemMetadata>> {
        read_json(&self.path)
    }

    pub fn load_or_empty(&self) -> Vec<ItemMetadata> {
        match self.load() {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "no local metadata found or failed to load");
                Vec::new()
            }
        }
    }
}

/// Ids written by the concatenated-columns ingestion.
#[derive(Debug, Clone)]
pub struct VectorIdLog {
    path: PathBuf,
}

impl VectorIdLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(VECTOR_IDS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, ids: &[String]) -> Result<()> {
        write_json_atomic(&self.path, ids)
    }

    pub fn load(&self) -> Result<Vec<String>> {
        read_json(&self.path)
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let _guard = WRITE_LOCK.lock();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let body = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}
