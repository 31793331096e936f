//! Configuration of the similarity subsystem.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{LuminaError, Result};
use crate::storage::StorageConfig;
use crate::storage::file::FileStorageConfig;
use crate::vector::EMBEDDING_DIMENSION;

/// Default similarity threshold for suggestions.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.70;

/// I/O tuning of the index directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Buffer size for I/O operations.
    pub buffer_size: usize,
    /// Whether to flush after every write call.
    pub sync_writes: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            buffer_size: 65536,
            sync_writes: false,
        }
    }
}

/// Settings of a [`SimilarityService`](crate::service::SimilarityService).
///
/// Every field has a default, so a JSON file only needs the values it
/// overrides:
///
/// ```
/// use lumina::config::LuminaConfig;
///
/// let config: LuminaConfig = serde_json::from_str(r#"{"similarity_threshold": 0.8}"#).unwrap();
/// assert_eq!(config.dimension, 768);
/// assert_eq!(config.similarity_threshold, 0.8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuminaConfig {
    /// Directory holding the persisted index.
    pub index_dir: PathBuf,
    /// Embedding dimension.
    pub dimension: usize,
    /// Minimum similarity of a suggestion.
    pub similarity_threshold: f32,
    /// Number of results when the caller does not say.
    pub default_max_results: usize,
    /// Upper bound on a single model inference, in milliseconds.
    pub inference_timeout_ms: u64,
    /// HuggingFace identifier of the vision model.
    pub model_name: String,
    pub storage: StorageOptions,
}

impl Default for LuminaConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./vector_index"),
            dimension: EMBEDDING_DIMENSION,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            default_max_results: 10,
            inference_timeout_ms: 30_000,
            model_name: "openai/clip-vit-base-patch32".to_string(),
            storage: StorageOptions::default(),
        }
    }
}

impl LuminaConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: LuminaConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(LuminaError::invalid_argument(
                "dimension must be greater than zero",
            ));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(LuminaError::invalid_argument(format!(
                "similarity_threshold {} is outside [-1, 1]",
                self.similarity_threshold
            )));
        }
        if self.inference_timeout_ms == 0 {
            return Err(LuminaError::invalid_argument(
                "inference_timeout_ms must be greater than zero",
            ));
        }
        if self.storage.buffer_size == 0 {
            return Err(LuminaError::invalid_argument(
                "storage.buffer_size must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Timeout applied to each model inference.
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    /// File storage rooted at [`LuminaConfig::index_dir`].
    pub fn storage_config(&self) -> StorageConfig {
        let mut file_config = FileStorageConfig::new(&self.index_dir);
        file_config.buffer_size = self.storage.buffer_size;
        file_config.sync_writes = self.storage.sync_writes;
        StorageConfig::File(file_config)
    }
}
