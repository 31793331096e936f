//! Similarity search over a [`FlatIndex`].

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;

use log::debug;
use serde::Serialize;

use crate::error::{LuminaError, Result};
use crate::vector::core::embedding::{Embedding, ImageId};
use crate::vector::index::flat::FlatIndex;

/// Parameters of a similarity search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Query embedding; must have the index dimension.
    pub query: Embedding,
    /// Ids that must never appear in the results.
    pub exclude_ids: HashSet<ImageId>,
    /// Maximum number of hits to return.
    pub max_results: usize,
    /// Hits with a similarity strictly below this value are discarded.
    pub min_similarity: f32,
}

impl SearchRequest {
    /// Create a request returning up to 10 hits with no threshold.
    pub fn new(query: Embedding) -> Self {
        Self {
            query,
            exclude_ids: HashSet::new(),
            max_results: 10,
            min_similarity: -1.0,
        }
    }

    /// Set the exclusion set.
    pub fn exclude<I: IntoIterator<Item = ImageId>>(mut self, ids: I) -> Self {
        self.exclude_ids = ids.into_iter().collect();
        self
    }

    /// Set the maximum number of hits.
    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set the similarity threshold.
    pub fn min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    fn validate(&self, dimension: usize) -> Result<()> {
        if self.query.dimension() != dimension {
            return Err(LuminaError::dimension_mismatch(
                dimension,
                self.query.dimension(),
            ));
        }
        if !self.query.is_finite() {
            return Err(LuminaError::InvalidVector(
                "query contains NaN or infinite values".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(LuminaError::invalid_argument(format!(
                "similarity threshold {} is outside [-1, 1]",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

/// A single search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchHit {
    /// Id of the matched entry.
    pub id: ImageId,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// Ranked search results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    /// Hits ordered by non-increasing similarity.
    pub hits: Vec<SearchHit>,
    /// Number of stored vectors that were scored.
    pub candidates_examined: usize,
    /// Wall time spent searching.
    pub search_time_ms: f64,
}

impl SearchResults {
    /// Ids of the hits, in rank order.
    pub fn ids(&self) -> Vec<ImageId> {
        self.hits.iter().map(|hit| hit.id).collect()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Score every entry of `index`, filter and rank.
///
/// Equal similarities keep insertion order.
pub fn search(index: &FlatIndex, request: &SearchRequest) -> Result<SearchResults> {
    let start = Instant::now();
    request.validate(index.dimension())?;

    let mut results = SearchResults::default();
    if index.is_empty() || request.max_results == 0 {
        return Ok(results);
    }

    let scores = index.scores(request.query.as_slice());
    results.candidates_examined = scores.len();

    let mut candidates: Vec<(usize, f32)> = scores
        .into_iter()
        .enumerate()
        .filter(|(_, similarity)| *similarity >= request.min_similarity)
        .filter(|(position, _)| {
            index
                .id_at(*position)
                .is_some_and(|id| !request.exclude_ids.contains(&id))
        })
        .collect();

    let by_rank = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
        b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
    };
    if candidates.len() > request.max_results {
        candidates.select_nth_unstable_by(request.max_results - 1, by_rank);
        candidates.truncate(request.max_results);
    }
    candidates.sort_unstable_by(by_rank);

    results.hits = candidates
        .into_iter()
        .filter_map(|(position, similarity)| {
            index.id_at(position).map(|id| SearchHit { id, similarity })
        })
        .collect();

    for hit in &results.hits {
        debug!("Candidate ID: {}, similarity: {:.4}", hit.id, hit.similarity);
    }

    results.search_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    Ok(results)
}
