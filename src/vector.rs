//! Visual similarity index over image embeddings.
//!
//! This module owns the growing set of `(id, embedding)` entries, the exact
//! inner-product search over them and their persistence. Embeddings are unit
//! length, so the inner product is the cosine similarity.
//!
//! # Module Structure
//!
//! - `core`: Core data structures (embedding, similarity kernels)
//! - `index`: Dense positional index and its on-disk artifacts
//! - `search`: Search requests, ranking and results
//! - `store`: Persistent store with a single-writer lock

pub mod core;
pub mod index;
pub mod search;
pub mod store;

pub use self::core::embedding::{EMBEDDING_DIMENSION, Embedding, ImageId};
pub use self::index::flat::{FlatIndex, InsertOutcome};
pub use self::search::{SearchHit, SearchRequest, SearchResults};
pub use self::store::{IndexHealth, VectorIndexStore};
