//! Exact nearest-neighbor search by full scan.

use crate::config::IndexKind;
use crate::error::Result;
use crate::types::{Embedding, Position};

use super::{check_query, cosine_distance, rank, VectorIndex};

/// Brute-force index: every query is compared against every stored vector.
///
/// Results are exact, so a persisted and reloaded flat index returns the
/// same rankings as the one that was built.
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Embedding>,
}

impl FlatIndex {
    /// Wraps `vectors`; the caller has checked their lengths.
    pub(crate) fn new(dimension: usize, vectors: Vec<Embedding>) -> Self {
        Self { dimension, vectors }
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vectors(&self) -> &[Embedding] {
        &self.vectors
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Position, f32)>> {
        check_query(self.dimension, query)?;
        let scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (Position(i), cosine_distance(query, v)))
            .collect();
        Ok(rank(scored, k))
    }
}
