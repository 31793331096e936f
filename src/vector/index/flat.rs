//! Flat vector index for exact inner-product search.

use ahash::AHashMap;
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{LuminaError, Result};
use crate::vector::core::embedding::{Embedding, ImageId};
use crate::vector::core::similarity::dot_product;

/// Number of entries above which scoring is spread over the rayon pool.
const PARALLEL_SCORING_THRESHOLD: usize = 4096;

/// Outcome of adding an entry to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    /// The embedding was appended at `position`.
    Inserted { position: usize },
    /// The id was already indexed; nothing changed.
    AlreadyPresent,
}

/// Append-only flat index.
///
/// Vectors are stored contiguously in position order. `position_to_id` and
/// `id_to_position` always describe the same set of entries, one per stored
/// vector.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
    position_to_id: Vec<ImageId>,
    id_to_position: AHashMap<ImageId, usize>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
            position_to_id: Vec::new(),
            id_to_position: AHashMap::new(),
        }
    }

    /// Rebuild an index from persisted parts, checking every invariant.
    pub fn from_parts(
        dimension: usize,
        data: Vec<f32>,
        position_to_id: Vec<ImageId>,
        id_to_position: &[(ImageId, u64)],
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(LuminaError::storage_unreadable("index dimension is zero"));
        }
        if data.len() != position_to_id.len() * dimension {
            return Err(LuminaError::storage_unreadable(format!(
                "vector data holds {} values, expected {} entries of dimension {}",
                data.len(),
                position_to_id.len(),
                dimension
            )));
        }
        if id_to_position.len() != position_to_id.len() {
            return Err(LuminaError::storage_unreadable(format!(
                "id map has {} entries but position map has {}",
                id_to_position.len(),
                position_to_id.len()
            )));
        }

        let mut map = AHashMap::with_capacity(position_to_id.len());
        for (position, id) in position_to_id.iter().enumerate() {
            if map.insert(*id, position).is_some() {
                return Err(LuminaError::storage_unreadable(format!(
                    "id {id} is stored at more than one position"
                )));
            }
        }
        for (id, position) in id_to_position {
            if map.get(id).map(|p| *p as u64) != Some(*position) {
                return Err(LuminaError::storage_unreadable(format!(
                    "id {id} maps to position {position}, which does not map back to it"
                )));
            }
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(LuminaError::storage_unreadable(
                "vector data contains NaN or infinite values",
            ));
        }

        Ok(Self {
            dimension,
            data,
            position_to_id,
            id_to_position: map,
        })
    }

    /// Dimension of every stored vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.position_to_id.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.position_to_id.is_empty()
    }

    /// Whether `id` is indexed.
    pub fn contains(&self, id: ImageId) -> bool {
        self.id_to_position.contains_key(&id)
    }

    /// Position of `id`, if indexed.
    pub fn position_of(&self, id: ImageId) -> Option<usize> {
        self.id_to_position.get(&id).copied()
    }

    /// Id stored at `position`.
    pub fn id_at(&self, position: usize) -> Option<ImageId> {
        self.position_to_id.get(position).copied()
    }

    /// Vector stored at `position`.
    pub fn vector_at(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Vector stored for `id`.
    pub fn get(&self, id: ImageId) -> Option<&[f32]> {
        self.position_of(id).and_then(|position| self.vector_at(position))
    }

    /// Ids in position order.
    pub fn position_to_id(&self) -> &[ImageId] {
        &self.position_to_id
    }

    /// `(id, position)` pairs sorted by position.
    pub fn id_to_position_pairs(&self) -> Vec<(ImageId, u64)> {
        self.position_to_id
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position as u64))
            .collect()
    }

    /// All vector values in position order.
    pub fn raw_data(&self) -> &[f32] {
        &self.data
    }

    /// Append `embedding` under `id`. Re-adding an existing id is a no-op.
    pub fn add(&mut self, id: ImageId, embedding: &Embedding) -> Result<InsertOutcome> {
        embedding.validate(self.dimension)?;

        if self.contains(id) {
            return Ok(InsertOutcome::AlreadyPresent);
        }

        let position = self.position_to_id.len();
        self.data.extend_from_slice(embedding.as_slice());
        self.position_to_id.push(id);
        self.id_to_position.insert(id, position);

        Ok(InsertOutcome::Inserted { position })
    }

    /// Drop every entry at or after `len`.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        for id in self.position_to_id.drain(len..) {
            self.id_to_position.remove(&id);
        }
        self.data.truncate(len * self.dimension);
    }

    /// Stored vectors for the ids that are present, in input order.
    ///
    /// Returns `None` when `ids` is empty or the index has no entries.
    pub fn reconstruct(&self, ids: &[ImageId]) -> Option<Vec<Embedding>> {
        if ids.is_empty() || self.is_empty() {
            return None;
        }

        Some(
            ids.iter()
                .filter_map(|id| self.get(*id))
                .map(|values| Embedding::new(values.to_vec()))
                .collect(),
        )
    }

    /// Inner product of `query` with every stored vector, in position order.
    pub fn scores(&self, query: &[f32]) -> Vec<f32> {
        if self.is_empty() {
            return Vec::new();
        }

        if self.len() >= PARALLEL_SCORING_THRESHOLD {
            self.data
                .par_chunks_exact(self.dimension)
                .map(|vector| dot_product(query, vector))
                .collect()
        } else {
            self.data
                .chunks_exact(self.dimension)
                .map(|vector| dot_product(query, vector))
                .collect()
        }
    }
}
