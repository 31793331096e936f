//! Resident vector index backed by a [`Storage`].
//!
//! The index is loaded once when the store is opened and served from memory
//! afterwards. Inserts hold the write lock for the whole check, append and
//! persist sequence, so concurrent inserts of the same id store it once and a
//! failed persist never leaves a half-applied entry visible to readers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::Serialize;

use crate::error::{LuminaError, Result};
use crate::storage::Storage;
use crate::vector::core::embedding::{Embedding, ImageId};
use crate::vector::index::flat::{FlatIndex, InsertOutcome};
use crate::vector::index::io::{self, IndexManifest};
use crate::vector::search::{self, SearchRequest, SearchResults};

/// Why and when the index was reset to empty on load.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryEvent {
    pub reason: String,
    pub recovered_at: DateTime<Utc>,
}

/// Snapshot of the store state, for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct IndexHealth {
    pub entries: usize,
    pub dimension: usize,
    pub generation: u64,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub recovered_from_corruption: bool,
    pub recovery_reason: Option<String>,
    pub recovered_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct StoreState {
    index: FlatIndex,
    generation: u64,
    last_commit_at: Option<DateTime<Utc>>,
    recovery: Option<RecoveryEvent>,
}

impl StoreState {
    fn empty(dimension: usize) -> Self {
        Self {
            index: FlatIndex::new(dimension),
            generation: 0,
            last_commit_at: None,
            recovery: None,
        }
    }

    fn from_manifest(index: FlatIndex, manifest: &IndexManifest) -> Self {
        Self {
            index,
            generation: manifest.generation,
            last_commit_at: Some(manifest.written_at),
            recovery: None,
        }
    }
}

/// Persistent exact inner-product index keyed by [`ImageId`].
pub struct VectorIndexStore {
    storage: Arc<dyn Storage>,
    dimension: usize,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for VectorIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndexStore")
            .field("dimension", &self.dimension)
            .field("entries", &self.len())
            .finish()
    }
}

impl VectorIndexStore {
    /// Open the store, loading whatever was last committed to `storage`.
    ///
    /// Unreadable artifacts do not fail the open: the store starts empty and
    /// the event is reported through [`VectorIndexStore::health`].
    pub fn open(storage: Arc<dyn Storage>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(LuminaError::invalid_argument(
                "index dimension must be greater than zero",
            ));
        }

        let state = load_state(storage.as_ref(), dimension)?;
        info!(
            "Opened vector index: {} entries, dimension {}, generation {}",
            state.index.len(),
            dimension,
            state.generation
        );

        Ok(Self {
            storage,
            dimension,
            state: RwLock::new(state),
        })
    }

    /// Add `embedding` under `id` and persist the index.
    ///
    /// An id that is already stored is left untouched. When the persist step
    /// fails the entry is rolled back and [`LuminaError::StorageWrite`] is
    /// returned.
    pub fn insert(&self, id: ImageId, embedding: &Embedding) -> Result<InsertOutcome> {
        embedding.validate(self.dimension)?;

        let mut state = self.state.write();
        let position = match state.index.add(id, embedding)? {
            InsertOutcome::AlreadyPresent => return Ok(InsertOutcome::AlreadyPresent),
            InsertOutcome::Inserted { position } => position,
        };

        let generation = state.generation + 1;
        match io::write_index(self.storage.as_ref(), &state.index, generation) {
            Ok(manifest) => {
                state.generation = manifest.generation;
                state.last_commit_at = Some(manifest.written_at);
                info!("Added image {id} to index at position {position}");
                Ok(InsertOutcome::Inserted { position })
            }
            Err(e) => {
                state.index.truncate(position);
                error!("Failed to persist image {id}, insert rolled back: {e}");
                Err(e)
            }
        }
    }

    /// Rank stored vectors against the request.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResults> {
        let state = self.state.read();
        search::search(&state.index, request)
    }

    /// Stored vectors for the given ids, skipping unknown ones.
    ///
    /// Returns `None` when `ids` is empty or the index holds nothing.
    pub fn reconstruct(&self, ids: &[ImageId]) -> Option<Vec<Embedding>> {
        self.state.read().index.reconstruct(ids)
    }

    /// Stored vector of a single id.
    pub fn get(&self, id: ImageId) -> Option<Embedding> {
        self.state
            .read()
            .index
            .get(id)
            .map(|values| Embedding::new(values.to_vec()))
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.state.read().index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Current health snapshot.
    pub fn health(&self) -> IndexHealth {
        let state = self.state.read();
        IndexHealth {
            entries: state.index.len(),
            dimension: self.dimension,
            generation: state.generation,
            last_commit_at: state.last_commit_at,
            recovered_from_corruption: state.recovery.is_some(),
            recovery_reason: state.recovery.as_ref().map(|r| r.reason.clone()),
            recovered_at: state.recovery.as_ref().map(|r| r.recovered_at),
        }
    }

    /// Re-read the committed state from storage, replacing the resident index.
    ///
    /// A recovery event recorded earlier is kept.
    pub fn reload(&self) -> Result<()> {
        let mut state = self.state.write();
        let mut fresh = load_state(self.storage.as_ref(), self.dimension)?;
        if fresh.recovery.is_none() {
            fresh.recovery = state.recovery.take();
        }
        *state = fresh;
        Ok(())
    }
}

fn load_state(storage: &dyn Storage, dimension: usize) -> Result<StoreState> {
    io::remove_scratch_files(storage);

    match io::read_index(storage, dimension) {
        Ok(Some((index, manifest))) => Ok(StoreState::from_manifest(index, &manifest)),
        Ok(None) => Ok(StoreState::empty(dimension)),
        Err(LuminaError::StorageUnreadable(reason)) => {
            error!("Vector index is unreadable, starting with an empty index: {reason}");
            warn!("Previously indexed images must be inserted again");
            let mut state = StoreState::empty(dimension);
            state.recovery = Some(RecoveryEvent {
                reason,
                recovered_at: Utc::now(),
            });
            Ok(state)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn unit(values: &[f32]) -> Embedding {
        Embedding::normalized(values.to_vec())
    }

    fn memory_store(dimension: usize) -> (Arc<MemoryStorage>, VectorIndexStore) {
        let storage = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let store = VectorIndexStore::open(storage.clone(), dimension).unwrap();
        (storage, store)
    }

    #[test]
    fn test_insert_and_search() {
        let (_, store) = memory_store(2);
        store.insert(1, &unit(&[1.0, 0.0])).unwrap();
        store.insert(2, &unit(&[0.0, 1.0])).unwrap();

        let request = SearchRequest::new(unit(&[1.0, 0.1]));
        let results = store.search(&request).unwrap();
        assert_eq!(results.ids(), vec![1, 2]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.health().generation, 2);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let (_, store) = memory_store(2);
        assert_eq!(
            store.insert(7, &unit(&[1.0, 0.0])).unwrap(),
            InsertOutcome::Inserted { position: 0 }
        );
        assert_eq!(
            store.insert(7, &unit(&[0.0, 1.0])).unwrap(),
            InsertOutcome::AlreadyPresent
        );

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(7).unwrap().as_slice(), &[1.0, 0.0]);
        assert_eq!(store.health().generation, 1);
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let (_, store) = memory_store(3);
        let result = store.insert(1, &unit(&[1.0, 0.0]));
        assert!(matches!(result, Err(LuminaError::DimensionMismatch { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let (storage, store) = memory_store(2);
        store.insert(1, &unit(&[1.0, 0.0])).unwrap();

        storage.set_read_only(true);
        let result = store.insert(2, &unit(&[0.0, 1.0]));
        assert!(matches!(result, Err(LuminaError::StorageWrite(_))));
        assert!(!store.contains(2));
        assert_eq!(store.len(), 1);

        storage.set_read_only(false);
        store.insert(2, &unit(&[0.0, 1.0])).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_reopen_restores_entries() {
        let (storage, store) = memory_store(2);
        store.insert(4, &unit(&[1.0, 0.0])).unwrap();
        store.insert(5, &unit(&[0.6, 0.8])).unwrap();
        drop(store);

        let reopened = VectorIndexStore::open(storage, 2).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains(5));
        assert!(!reopened.health().recovered_from_corruption);
    }

    #[test]
    fn test_corrupted_manifest_recovers_empty() {
        let storage = Arc::new(MemoryStorage::new_default());
        storage.put_file(io::MANIFEST_FILE, b"{ not json");

        let store = VectorIndexStore::open(storage, 2).unwrap();
        assert!(store.is_empty());

        let health = store.health();
        assert!(health.recovered_from_corruption);
        assert!(health.recovery_reason.is_some());
        assert!(health.recovered_at.is_some());
    }

    #[test]
    fn test_reload_picks_up_external_changes() {
        let storage = Arc::new(MemoryStorage::new_default());
        let reader = VectorIndexStore::open(storage.clone(), 2).unwrap();
        let writer = VectorIndexStore::open(storage, 2).unwrap();

        writer.insert(1, &unit(&[1.0, 0.0])).unwrap();
        assert!(reader.is_empty());

        reader.reload().unwrap();
        assert!(reader.contains(1));
    }

    #[test]
    fn test_reconstruct() {
        let (_, store) = memory_store(2);
        assert!(store.reconstruct(&[1]).is_none());

        store.insert(1, &unit(&[1.0, 0.0])).unwrap();
        assert!(store.reconstruct(&[]).is_none());
        assert_eq!(store.reconstruct(&[1, 99]).unwrap().len(), 1);
        assert!(store.reconstruct(&[99]).unwrap().is_empty());
    }

    #[test]
    fn test_zero_dimension_is_rejected() {
        let storage = Arc::new(MemoryStorage::new_default());
        assert!(VectorIndexStore::open(storage, 0).is_err());
    }
}
