//! Similarity service: embedding extractor and vector index behind one API.
//!
//! The service is built once at startup and shared by request handlers. When
//! the feature extractor cannot be loaded the service still starts, in a
//! degraded mode where every model-backed operation fails with
//! [`LuminaError::ModelUnavailable`] while [`SimilarityService::health`]
//! keeps reporting the state of the index.
//!
//! Extraction and index work run on the blocking thread pool so the async
//! executor never stalls on inference or disk writes.

use std::collections::HashSet;
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tokio::task;

use crate::config::LuminaConfig;
use crate::embedding::extractor::FeatureExtractor;
use crate::embedding::image_embedder::{ImageEmbedder, ImageInput};
use crate::error::{LuminaError, Result};
use crate::storage::{Storage, StorageFactory};
use crate::vector::{Embedding, ImageId, IndexHealth, InsertOutcome, SearchRequest, VectorIndexStore};

/// A similarity query understood by [`SimilarityService::suggest`].
#[derive(Debug, Clone)]
pub enum SimilarityQuery {
    /// Images that look like the given one.
    ByImage {
        image: ImageInput,
        exclude_ids: Vec<ImageId>,
        max_results: Option<usize>,
    },
    /// Images that look like an already indexed image.
    ById {
        id: ImageId,
        max_results: Option<usize>,
    },
    /// Images matching the average look of a set of indexed images.
    ByIdsAverage {
        ids: Vec<ImageId>,
        exclude_ids: Vec<ImageId>,
        max_results: Option<usize>,
    },
}

/// Health snapshot of the service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub model_available: bool,
    pub model_name: Option<String>,
    pub model_error: Option<String>,
    pub index: IndexHealth,
}

enum ModelState {
    Ready(ImageEmbedder),
    Unavailable(String),
}

/// Image similarity service.
pub struct SimilarityService {
    config: LuminaConfig,
    store: Arc<VectorIndexStore>,
    model: ModelState,
}

impl std::fmt::Debug for SimilarityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityService")
            .field("index_dir", &self.config.index_dir)
            .field("available", &self.is_available())
            .field("store", &self.store)
            .finish()
    }
}

impl SimilarityService {
    /// Open the index under `config.index_dir` and attach `extractor`.
    ///
    /// An `Err` extractor does not fail construction; the service starts in
    /// degraded mode instead.
    pub fn new(
        config: LuminaConfig,
        extractor: Result<Arc<dyn FeatureExtractor>>,
    ) -> Result<Self> {
        config.validate()?;
        let storage = StorageFactory::create(config.storage_config())?;
        Self::with_storage(config, storage, extractor)
    }

    /// Like [`SimilarityService::new`], with an explicit storage backend.
    pub fn with_storage(
        config: LuminaConfig,
        storage: Arc<dyn Storage>,
        extractor: Result<Arc<dyn FeatureExtractor>>,
    ) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(VectorIndexStore::open(storage, config.dimension)?);

        let model = match extractor {
            Ok(extractor) if extractor.dimension() == config.dimension => {
                info!("Feature extractor {} ready", extractor.name());
                ModelState::Ready(ImageEmbedder::new(extractor))
            }
            Ok(extractor) => {
                let reason = format!(
                    "extractor {} produces {} features, index expects {}",
                    extractor.name(),
                    extractor.dimension(),
                    config.dimension
                );
                error!("Similarity features disabled: {reason}");
                ModelState::Unavailable(reason)
            }
            Err(e) => {
                error!("Similarity features disabled, model failed to load: {e}");
                ModelState::Unavailable(e.to_string())
            }
        };

        Ok(Self {
            config,
            store,
            model,
        })
    }

    pub fn config(&self) -> &LuminaConfig {
        &self.config
    }

    /// The underlying index.
    pub fn store(&self) -> &Arc<VectorIndexStore> {
        &self.store
    }

    /// Whether a feature extractor is loaded.
    pub fn is_available(&self) -> bool {
        matches!(self.model, ModelState::Ready(_))
    }

    pub fn health(&self) -> ServiceHealth {
        let (model_name, model_error) = match &self.model {
            ModelState::Ready(embedder) => (Some(embedder.name().to_string()), None),
            ModelState::Unavailable(reason) => (None, Some(reason.clone())),
        };
        ServiceHealth {
            model_available: self.is_available(),
            model_name,
            model_error,
            index: self.store.health(),
        }
    }

    fn embedder(&self) -> Result<&ImageEmbedder> {
        match &self.model {
            ModelState::Ready(embedder) => Ok(embedder),
            ModelState::Unavailable(reason) => Err(LuminaError::model_unavailable(reason.clone())),
        }
    }

    /// Compute the embedding of `image`.
    pub async fn embed(&self, image: ImageInput) -> Result<Embedding> {
        let embedder = self.embedder()?.clone();
        let handle = task::spawn_blocking(move || embedder.embed(&image));

        match tokio::time::timeout(self.config.inference_timeout(), handle).await {
            Ok(joined) => joined.map_err(|e| LuminaError::TaskJoin(e.to_string()))?,
            Err(_) => Err(LuminaError::timeout(format!(
                "inference exceeded {} ms",
                self.config.inference_timeout_ms
            ))),
        }
    }

    /// Embed `image` and store it under `id`.
    ///
    /// An id that is already indexed is acknowledged without running the
    /// model.
    pub async fn insert(&self, id: ImageId, image: ImageInput) -> Result<InsertOutcome> {
        self.embedder()?;
        if self.store.contains(id) {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        let embedding = self.embed(image).await?;
        let store = Arc::clone(&self.store);
        task::spawn_blocking(move || store.insert(id, &embedding))
            .await
            .map_err(|e| LuminaError::TaskJoin(e.to_string()))?
    }

    /// Indexed images similar to `image`.
    pub async fn search_by_image(
        &self,
        image: ImageInput,
        exclude_ids: &[ImageId],
        max_results: usize,
    ) -> Result<Vec<ImageId>> {
        let query = self.embed(image).await?;
        self.search_embedding(query, exclude_ids.iter().copied().collect(), max_results)
            .await
    }

    /// Indexed images similar to the image stored under `id`.
    ///
    /// An unknown id yields no results.
    pub async fn search_by_id(&self, id: ImageId, max_results: usize) -> Result<Vec<ImageId>> {
        self.embedder()?;
        let Some(query) = self.store.get(id) else {
            return Ok(Vec::new());
        };
        self.search_embedding(query, HashSet::from([id]), max_results)
            .await
    }

    /// Indexed images close to the average look of `ids`.
    ///
    /// The stored vectors of `ids` are averaged and normalized; the result is
    /// searched while excluding both `ids` and `exclude_ids`.
    pub async fn search_by_ids_average(
        &self,
        ids: &[ImageId],
        exclude_ids: &[ImageId],
        max_results: usize,
    ) -> Result<Vec<ImageId>> {
        self.embedder()?;
        let Some(embeddings) = self.store.reconstruct(ids) else {
            return Ok(Vec::new());
        };
        if embeddings.is_empty() {
            return Ok(Vec::new());
        }

        let query = Embedding::mean_direction(&embeddings)?;
        let exclude = ids.iter().chain(exclude_ids).copied().collect();
        self.search_embedding(query, exclude, max_results).await
    }

    /// Run `query`, returning an empty list when anything goes wrong.
    pub async fn suggest(&self, query: SimilarityQuery) -> Vec<ImageId> {
        let result = match query {
            SimilarityQuery::ByImage {
                image,
                exclude_ids,
                max_results,
            } => {
                let limit = self.limit(max_results);
                self.search_by_image(image, &exclude_ids, limit).await
            }
            SimilarityQuery::ById { id, max_results } => {
                self.search_by_id(id, self.limit(max_results)).await
            }
            SimilarityQuery::ByIdsAverage {
                ids,
                exclude_ids,
                max_results,
            } => {
                let limit = self.limit(max_results);
                self.search_by_ids_average(&ids, &exclude_ids, limit).await
            }
        };

        result.unwrap_or_else(|e| {
            warn!("No suggestions available: {e}");
            Vec::new()
        })
    }

    fn limit(&self, max_results: Option<usize>) -> usize {
        max_results.unwrap_or(self.config.default_max_results)
    }

    async fn search_embedding(
        &self,
        query: Embedding,
        exclude_ids: HashSet<ImageId>,
        max_results: usize,
    ) -> Result<Vec<ImageId>> {
        let request = SearchRequest::new(query)
            .exclude(exclude_ids)
            .max_results(max_results)
            .min_similarity(self.config.similarity_threshold);

        let store = Arc::clone(&self.store);
        let results = task::spawn_blocking(move || store.search(&request))
            .await
            .map_err(|e| LuminaError::TaskJoin(e.to_string()))??;
        Ok(results.ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use image::RgbImage;

    use crate::storage::memory::MemoryStorage;

    struct Constant(Vec<f32>);

    impl FeatureExtractor for Constant {
        fn extract(&self, _image: &RgbImage) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimension(&self) -> usize {
            self.0.len()
        }
    }

    fn config(dimension: usize) -> LuminaConfig {
        LuminaConfig {
            dimension,
            ..Default::default()
        }
    }

    #[test]
    fn test_dimension_mismatch_degrades() {
        let extractor: Arc<dyn FeatureExtractor> = Arc::new(Constant(vec![1.0; 3]));
        let service = SimilarityService::with_storage(
            config(4),
            Arc::new(MemoryStorage::new_default()),
            Ok(extractor),
        )
        .unwrap();

        assert!(!service.is_available());
        let health = service.health();
        assert!(!health.model_available);
        assert!(health.model_error.unwrap().contains("expects 4"));
    }

    #[test]
    fn test_load_failure_degrades() {
        let service = SimilarityService::with_storage(
            config(4),
            Arc::new(MemoryStorage::new_default()),
            Err(LuminaError::model_unavailable("weights missing")),
        )
        .unwrap();

        assert!(!service.is_available());
        assert_eq!(service.health().index.entries, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let extractor: Arc<dyn FeatureExtractor> = Arc::new(Constant(vec![1.0; 3]));
        let invalid = LuminaConfig {
            similarity_threshold: 2.0,
            ..config(3)
        };
        let result = SimilarityService::with_storage(
            invalid,
            Arc::new(MemoryStorage::new_default()),
            Ok(extractor),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_search_by_id_unknown_is_empty() {
        let extractor: Arc<dyn FeatureExtractor> = Arc::new(Constant(vec![1.0, 0.0]));
        let service = SimilarityService::with_storage(
            config(2),
            Arc::new(MemoryStorage::new_default()),
            Ok(extractor),
        )
        .unwrap();

        assert!(service.search_by_id(42, 10).await.unwrap().is_empty());
        assert!(service.search_by_ids_average(&[], &[], 10).await.unwrap().is_empty());
    }
}
