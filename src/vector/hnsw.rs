//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistCosine>` and keeps the raw vectors next to
//! the graph. Graph hits are re-scored exactly against the stored vectors,
//! so distances match the flat backend and ties order by position.
//!
//! # Persistence Strategy
//!
//! Only the vectors are persisted. The graph is rebuilt from them on load,
//! because `hnsw_rs::HnswIo::load_hnsw` ties the graph's lifetime to the
//! loader, which does not fit an owned, swappable index. The rebuilt graph
//! may differ from the original, so recall after reload is approximate.
//!
//! # Thread Safety
//!
//! The `hnsw_rs::Hnsw` graph uses `parking_lot::RwLock` internally, so
//! searches take `&self` and run concurrently.

use hnsw_rs::prelude::*;
use tracing::debug;

use crate::config::{HnswConfig, IndexKind};
use crate::error::Result;
use crate::types::{Embedding, Position};

use super::{check_query, cosine_distance, rank, VectorIndex};

/// HNSW vector index backed by `hnsw_rs`.
///
/// Internal hnsw_rs data ids are positions.
pub struct HnswIndex {
    /// The underlying HNSW graph. Uses `'static` lifetime because
    /// all data is heap-owned (not memory-mapped).
    hnsw: Hnsw<'static, f32, DistCosine>,

    /// Source vectors in position order.
    vectors: Vec<Embedding>,

    /// Candidate list size during search.
    ef_search: usize,

    dimension: usize,
}

impl HnswIndex {
    /// Builds the graph over `vectors`; the caller has checked their lengths.
    ///
    /// `config.max_elements` is raised to the corpus size when smaller.
    pub(crate) fn new(dimension: usize, config: &HnswConfig, vectors: Vec<Embedding>) -> Self {
        let hnsw = Hnsw::new(
            config.max_nb_connection,
            config.max_elements.max(vectors.len()),
            config.max_layer,
            config.ef_construction,
            DistCosine,
        );

        if !vectors.is_empty() {
            let batch: Vec<(&Vec<f32>, usize)> =
                vectors.iter().enumerate().map(|(i, v)| (v, i)).collect();
            // Parallel bulk insert (uses rayon internally)
            hnsw.parallel_insert(&batch);
        }

        debug!(
            count = vectors.len(),
            dimension,
            ef_search = config.ef_search,
            "HNSW graph built"
        );

        Self {
            hnsw,
            vectors,
            ef_search: config.ef_search,
            dimension,
        }
    }
}

impl VectorIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Position, f32)>> {
        check_query(self.dimension, query)?;
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let ef = self.ef_search.max(k);
        let candidates = self.hnsw.search(query, ef, ef);

        let scored = candidates
            .into_iter()
            .filter_map(|n| {
                self.vectors
                    .get(n.d_id)
                    .map(|v| (Position(n.d_id), cosine_distance(query, v)))
            })
            .collect();
        Ok(rank(scored, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HnswConfig {
        HnswConfig {
            max_nb_connection: 16,
            ef_construction: 100,
            ef_search: 50,
            max_layer: 8,
            max_elements: 1000,
        }
    }

    /// Generates a deterministic embedding from a seed.
    /// Vectors with close seeds produce similar embeddings.
    fn make_embedding(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
            .collect()
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = HnswIndex::new(4, &test_config(), Vec::new());
        assert!(index.is_empty());
        assert!(index.search(&make_embedding(1, 4), 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_sorted_and_bounded() {
        let dim = 8;
        let vectors = (0..50).map(|i| make_embedding(i, dim)).collect();
        let index = HnswIndex::new(dim, &test_config(), vectors);

        let results = index.search(&make_embedding(5, dim), 3).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        for w in results.windows(2) {
            assert!(w[0].1 <= w[1].1, "Results not sorted by distance");
        }
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let dim = 4;
        let index = HnswIndex::new(dim, &test_config(), vec![make_embedding(1, dim)]);
        let results = index.search(&make_embedding(1, dim), 100).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_identical_vector_found_at_zero_distance() {
        let dim = 8;
        let vectors: Vec<Embedding> = (0..20).map(|i| make_embedding(i * 11, dim)).collect();
        let index = HnswIndex::new(dim, &test_config(), vectors.clone());

        let results = index.search(&vectors[7], 1).unwrap();
        assert_eq!(results[0].0, Position(7));
        assert!(
            results[0].1 < 0.001,
            "Expected near-zero distance for identical vectors, got {}",
            results[0].1
        );
    }

    #[test]
    fn test_distances_match_exact_metric() {
        let dim = 8;
        let vectors: Vec<Embedding> = (0..10).map(|i| make_embedding(i, dim)).collect();
        let index = HnswIndex::new(dim, &test_config(), vectors.clone());

        let query = make_embedding(3, dim);
        for (position, distance) in index.search(&query, 5).unwrap() {
            let exact = cosine_distance(&query, &vectors[position.get()]);
            assert_eq!(distance, exact);
        }
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = HnswIndex::new(384, &test_config(), vec![vec![0.1; 384]]);
        let result = index.search(&[1.0f32; 128], 1);
        assert!(result.unwrap_err().is_validation());
    }
}
