//! # Lumina
//!
//! Visual similarity index for image galleries.
//!
//! Images are turned into unit-length embeddings by a visual feature
//! extractor and kept in a persistent flat index. The index answers exact
//! inner-product (cosine) queries, either for a new image, for an already
//! indexed image, or for the average look of a set of indexed images.
//!
//! ## Features
//!
//! - Exact search with SIMD scoring, parallel for large galleries
//! - Crash-consistent persistence with generation manifests
//! - Single-writer, multi-reader concurrency
//! - Recovery to an empty index when persisted data is unreadable
//! - Degraded mode when no model can be loaded
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use lumina::storage::memory::MemoryStorage;
//! use lumina::vector::{Embedding, SearchRequest, VectorIndexStore};
//!
//! # fn main() -> lumina::error::Result<()> {
//! let store = VectorIndexStore::open(Arc::new(MemoryStorage::new_default()), 3)?;
//! store.insert(1, &Embedding::normalized(vec![1.0, 0.0, 0.0]))?;
//! store.insert(2, &Embedding::normalized(vec![0.0, 1.0, 0.0]))?;
//!
//! let request = SearchRequest::new(Embedding::normalized(vec![0.9, 0.1, 0.0]))
//!     .min_similarity(0.5);
//! assert_eq!(store.search(&request)?.ids(), vec![1]);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod service;
pub mod storage;
pub mod vector;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
