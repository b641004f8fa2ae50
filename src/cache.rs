//! Memoization of loaded datasets and their derivations, keyed by input identity

use crate::config::{AppConfig, FieldsConfig, InputConfig};
use crate::data::{load_dataset, RfmDataset};
use crate::error::RfmResult;
use crate::model::{derive, Derivation};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Identity of an input file: where it is, how big it is and when it last changed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub path: PathBuf,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl DatasetKey {
    /// Read the identity of `path` from the filesystem
    pub fn for_path(path: &Path) -> RfmResult<Self> {
        let path = fs::canonicalize(path)?;
        let metadata = fs::metadata(&path)?;
        Ok(Self {
            path,
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// A loaded dataset and the derivation computed from it
#[derive(Debug)]
pub struct CachedDerivation {
    pub key: DatasetKey,
    /// Separator and columns the dataset was read with
    pub input: InputConfig,
    pub fields: FieldsConfig,
    pub dataset: RfmDataset,
    pub derivation: Derivation,
}

impl CachedDerivation {
    /// Whether this entry was derived with the settings in `config`
    fn matches(&self, config: &AppConfig) -> bool {
        self.input == config.input
            && self.fields == config.fields
            && self.derivation.scoring == config.scoring
    }
}

/// Load-once cache of derivations
///
/// Entries are shared read-only through `Arc`. An entry is replaced when the
/// file behind its path changes size or modification time, or when it is
/// requested with a different separator, field list or scoring policy.
#[derive(Debug, Default)]
pub struct DerivationCache {
    entries: HashMap<PathBuf, Arc<CachedDerivation>>,
}

impl DerivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached derivation for `path`, loading and deriving on a miss
    pub fn get_or_load(&mut self, path: &Path, config: &AppConfig) -> RfmResult<Arc<CachedDerivation>> {
        let key = DatasetKey::for_path(path)?;

        if let Some(entry) = self.entries.get(&key.path) {
            if entry.key == key && entry.matches(config) {
                debug!(path = %key.path.display(), "Derivation cache hit");
                return Ok(Arc::clone(entry));
            }
            info!(path = %key.path.display(), "Input or configuration changed, recomputing derivation");
        }

        let dataset = load_dataset(&key.path, config)?;
        let derivation = derive(&dataset.records, &config.scoring)?;
        let entry = Arc::new(CachedDerivation {
            key: key.clone(),
            input: config.input.clone(),
            fields: config.fields.clone(),
            dataset,
            derivation,
        });
        self.entries.insert(key.path, Arc::clone(&entry));
        Ok(entry)
    }

    /// Whether the file behind a cached entry has changed since it was loaded
    pub fn is_stale(&self, path: &Path) -> RfmResult<bool> {
        let key = DatasetKey::for_path(path)?;
        Ok(match self.entries.get(&key.path) {
            Some(entry) => entry.key != key,
            None => true,
        })
    }

    /// Drop the entry for `path`; returns whether one existed
    pub fn invalidate(&mut self, path: &Path) -> bool {
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.entries.remove(&path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
