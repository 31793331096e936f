use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use lumina::error::{LuminaError, Result};
use lumina::storage::{Storage, StorageError, StorageInput, StorageOutput};
use lumina::storage::file::{FileStorage, FileStorageConfig};
use lumina::storage::memory::MemoryStorage;
use lumina::vector::index::io::MANIFEST_FILE;
use lumina::vector::{
    EMBEDDING_DIMENSION, Embedding, ImageId, InsertOutcome, SearchRequest, VectorIndexStore,
};

/// Memory storage whose directory sync can be made to fail.
#[derive(Debug, Default)]
struct UnsyncedStorage {
    inner: MemoryStorage,
    fail_sync: AtomicBool,
}

impl Storage for UnsyncedStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(name)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(name)
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.inner.list_files()
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.inner.rename_file(old_name, new_name)
    }

    fn sync(&self) -> Result<()> {
        if self.fail_sync.load(Ordering::SeqCst) {
            Err(StorageError::IoError("sync failed".to_string()).into())
        } else {
            Ok(())
        }
    }
}

fn file_storage(dir: &TempDir) -> Result<Arc<dyn Storage>> {
    let config = FileStorageConfig::new(dir.path());
    Ok(Arc::new(FileStorage::new(dir.path(), config)?))
}

fn random_unit(rng: &mut StdRng, dimension: usize) -> Embedding {
    let raw: Vec<f32> = (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect();
    Embedding::normalized(raw)
}

/// Three vectors with v1·v2 = 0.95 and v1·v3 = 0.10.
fn known_vectors() -> [Embedding; 3] {
    [
        Embedding::new(vec![1.0, 0.0, 0.0, 0.0]),
        Embedding::new(vec![0.95, (1.0f32 - 0.95 * 0.95).sqrt(), 0.0, 0.0]),
        Embedding::new(vec![0.10, 0.0, (1.0f32 - 0.10 * 0.10).sqrt(), 0.0]),
    ]
}

#[test]
fn test_known_vectors_search_returns_close_neighbour() -> Result<()> {
    let store = VectorIndexStore::open(Arc::new(MemoryStorage::new_default()), 4)?;
    let vectors = known_vectors();
    for (id, vector) in (1..=3).zip(&vectors) {
        store.insert(id, vector)?;
    }

    let request = SearchRequest::new(vectors[0].clone())
        .exclude([1])
        .max_results(10)
        .min_similarity(0.5);
    let results = store.search(&request)?;

    assert_eq!(results.ids(), vec![2]);
    assert!((results.hits[0].similarity - 0.95).abs() < 1e-5);
    Ok(())
}

#[test]
fn test_search_properties_over_random_gallery() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let store = VectorIndexStore::open(
        Arc::new(MemoryStorage::new_default()),
        EMBEDDING_DIMENSION,
    )?;
    for id in 0..200 {
        store.insert(id, &random_unit(&mut rng, EMBEDDING_DIMENSION))?;
    }

    for _ in 0..10 {
        let query = random_unit(&mut rng, EMBEDDING_DIMENSION);
        let exclude: HashSet<ImageId> = (0..200).filter(|_| rng.random_bool(0.2)).collect();
        let threshold = 0.02;

        let request = SearchRequest::new(query.clone())
            .exclude(exclude.iter().copied())
            .max_results(25)
            .min_similarity(threshold);
        let results = store.search(&request)?;

        assert!(results.hits.len() <= 25);
        for hit in &results.hits {
            assert!(!exclude.contains(&hit.id));
            assert!(hit.similarity >= threshold);

            let stored = store.get(hit.id).unwrap();
            assert!((stored.dot(&query)? - hit.similarity).abs() < 1e-4);
        }
        assert!(
            results
                .hits
                .windows(2)
                .all(|pair| pair[0].similarity >= pair[1].similarity)
        );
    }
    Ok(())
}

#[test]
fn test_duplicate_insert_keeps_first_vector() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
    let [first, second, _] = known_vectors();

    assert!(matches!(
        store.insert(10, &first)?,
        InsertOutcome::Inserted { .. }
    ));
    assert_eq!(store.insert(10, &second)?, InsertOutcome::AlreadyPresent);

    let stored = store.reconstruct(&[10]).unwrap();
    assert_eq!(stored, vec![first]);
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn test_reconstruct_returns_inserted_vectors() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let store = VectorIndexStore::open(Arc::new(MemoryStorage::new_default()), 16)?;
    assert!(store.reconstruct(&[1, 2]).is_none());

    let vectors: Vec<Embedding> = (0..5).map(|_| random_unit(&mut rng, 16)).collect();
    for (id, vector) in vectors.iter().enumerate() {
        store.insert(id as ImageId, vector)?;
    }

    assert!(store.reconstruct(&[]).is_none());
    let reconstructed = store.reconstruct(&[3, 1, 99]).unwrap();
    assert_eq!(reconstructed, vec![vectors[3].clone(), vectors[1].clone()]);
    Ok(())
}

#[test]
fn test_index_survives_reopen() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let vectors = known_vectors();
    {
        let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
        for (id, vector) in (1..=3).zip(&vectors) {
            store.insert(id, vector)?;
        }
    }

    let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
    assert_eq!(store.len(), 3);
    assert_eq!(store.health().generation, 3);
    assert!(!store.health().recovered_from_corruption);

    let request = SearchRequest::new(vectors[0].clone())
        .exclude([1])
        .min_similarity(0.5);
    assert_eq!(store.search(&request)?.ids(), vec![2]);

    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 3, "only the manifest and the current generation remain");
    Ok(())
}

#[test]
fn test_corrupted_artifacts_reset_to_empty_index() -> Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
        store.insert(1, &known_vectors()[0])?;
    }
    std::fs::write(dir.path().join("vectors.1.bin"), b"garbage").unwrap();

    let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
    assert!(store.is_empty());
    let health = store.health();
    assert!(health.recovered_from_corruption);
    assert!(health.recovery_reason.is_some());

    store.insert(2, &known_vectors()[1])?;
    let reopened = VectorIndexStore::open(file_storage(&dir)?, 4)?;
    assert_eq!(reopened.len(), 1);
    assert!(reopened.contains(2));
    assert!(!reopened.health().recovered_from_corruption);
    Ok(())
}

#[test]
fn test_truncated_manifest_is_recovered() -> Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
        store.insert(1, &known_vectors()[0])?;
    }
    let manifest = dir.path().join(MANIFEST_FILE);
    let bytes = std::fs::read(&manifest).unwrap();
    std::fs::write(&manifest, &bytes[..bytes.len() / 2]).unwrap();

    let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
    assert!(store.is_empty());
    assert!(store.health().recovered_from_corruption);
    Ok(())
}

#[test]
fn test_dimension_change_is_treated_as_unreadable() -> Result<()> {
    let dir = TempDir::new().unwrap();
    {
        let store = VectorIndexStore::open(file_storage(&dir)?, 4)?;
        store.insert(1, &known_vectors()[0])?;
    }

    let store = VectorIndexStore::open(file_storage(&dir)?, 8)?;
    assert!(store.is_empty());
    assert!(store.health().recovered_from_corruption);
    Ok(())
}

#[test]
fn test_failed_write_leaves_index_unchanged() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let index_dir = dir.path().join("index");
    let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(
        &index_dir,
        FileStorageConfig::new(&index_dir),
    )?);
    let store = VectorIndexStore::open(storage, 4)?;
    let vectors = known_vectors();
    store.insert(1, &vectors[0])?;

    std::fs::remove_dir_all(&index_dir).unwrap();
    let result = store.insert(2, &vectors[1]);

    assert!(matches!(result, Err(LuminaError::StorageWrite(_))));
    assert_eq!(store.len(), 1);
    assert!(!store.contains(2));

    let request = SearchRequest::new(vectors[1].clone());
    assert_eq!(store.search(&request)?.ids(), vec![1]);
    Ok(())
}

#[test]
fn test_concurrent_inserts_are_not_lost() -> Result<()> {
    const THREADS: i64 = 8;
    const PER_THREAD: i64 = 25;

    let dir = TempDir::new().unwrap();
    let store = Arc::new(VectorIndexStore::open(file_storage(&dir)?, 32)?);

    thread::scope(|scope| {
        for worker in 0..THREADS {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker as u64);
                for i in 0..PER_THREAD {
                    let id = worker * PER_THREAD + i;
                    store.insert(id, &random_unit(&mut rng, 32)).unwrap();
                }
            });
        }
    });

    let expected = (THREADS * PER_THREAD) as usize;
    assert_eq!(store.len(), expected);
    drop(store);

    let reopened = VectorIndexStore::open(file_storage(&dir)?, 32)?;
    assert_eq!(reopened.len(), expected);
    Ok(())
}

#[test]
fn test_concurrent_inserts_of_same_id_store_it_once() -> Result<()> {
    let store = Arc::new(VectorIndexStore::open(
        Arc::new(MemoryStorage::new_default()),
        4,
    )?);
    let vectors = known_vectors();

    let outcomes: Vec<InsertOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = vectors
            .iter()
            .cycle()
            .take(12)
            .map(|vector| {
                let store = Arc::clone(&store);
                scope.spawn(move || store.insert(77, vector).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let inserted = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, InsertOutcome::Inserted { .. }))
        .count();
    assert_eq!(inserted, 1);
    assert_eq!(store.len(), 1);
    Ok(())
}

#[test]
fn test_failed_sync_after_manifest_replace_keeps_entries() -> Result<()> {
    let storage = Arc::new(UnsyncedStorage::default());
    let mut rng = StdRng::seed_from_u64(5);
    {
        let store = VectorIndexStore::open(storage.clone(), 8)?;
        for id in 0..5 {
            store.insert(id, &random_unit(&mut rng, 8))?;
        }

        storage.fail_sync.store(true, Ordering::SeqCst);
        let outcome = store.insert(99, &random_unit(&mut rng, 8))?;
        assert!(matches!(outcome, InsertOutcome::Inserted { position: 5 }));
        assert!(store.contains(99));
        storage.fail_sync.store(false, Ordering::SeqCst);
    }

    let files = storage.list_files()?;
    assert_eq!(
        files,
        vec!["manifest.json", "mapping.6.bin", "vectors.6.bin"],
        "the manifest and the generation it names stay on disk"
    );

    let reopened = VectorIndexStore::open(storage, 8)?;
    assert_eq!(reopened.len(), 6);
    assert!(reopened.contains(99));
    assert!((0..5).all(|id| reopened.contains(id)));
    assert!(!reopened.health().recovered_from_corruption);
    Ok(())
}
