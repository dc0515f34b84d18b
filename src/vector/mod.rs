//! Vector index abstractions for nearest-neighbor search.
//!
//! This module provides a trait-based abstraction over vector indexes so the
//! exact and approximate backends are interchangeable behind the store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │         VectorIndex trait         │
//! └──────────┬───────────────────────┘
//!            │
//!    ┌───────┴────────┬────────────────┐
//!    │   FlatIndex    │   HnswIndex    │
//!    │  (exact scan)  │ (hnsw_rs wrap) │
//!    └────────────────┴────────────────┘
//! ```
//!
//! Both backends keep the raw vectors in position order. The vectors are
//! the persisted source of truth; an HNSW graph is derived from them and
//! rebuilt on load.
//!
//! # Metric
//!
//! Cosine distance, `1 - cos(a, b)`: 0.0 = identical direction, 2.0 =
//! opposite. Results are ordered by ascending distance, ties broken by
//! ascending position, so rankings are reproducible.

mod flat;
mod hnsw;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

use std::cmp::Ordering;

use anndists::dist::distances::{DistCosine, Distance};

use crate::config::{HnswConfig, IndexKind};
use crate::error::{Result, ValidationError};
use crate::types::{Embedding, Position};

/// Read-only nearest-neighbor index over vectors addressed by [`Position`].
///
/// Indexes are immutable once built: a rebuild produces a new index.
/// Implementations must be `Send + Sync` so one index can serve concurrent
/// queries.
pub trait VectorIndex: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> IndexKind;

    /// Length of every stored vector.
    fn dimension(&self) -> usize;

    /// Stored vectors, indexed by position.
    fn vectors(&self) -> &[Embedding];

    /// Returns up to `k` `(position, distance)` pairs, closest first.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if `query` has the wrong
    /// length.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Position, f32)>>;

    /// Number of stored vectors.
    fn len(&self) -> usize {
        self.vectors().len()
    }

    /// Returns true if the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the vector stored at `position`.
    fn vector(&self, position: Position) -> Option<&[f32]> {
        self.vectors().get(position.get()).map(Vec::as_slice)
    }
}

/// Builds an index of the requested kind over `vectors`.
///
/// Vector `i` is stored at `Position(i)`.
///
/// # Errors
///
/// Returns `ValidationError::DimensionMismatch` if any vector's length
/// differs from `dimension`.
pub fn build_index(
    kind: IndexKind,
    dimension: usize,
    hnsw: &HnswConfig,
    vectors: Vec<Embedding>,
) -> Result<Box<dyn VectorIndex>> {
    check_lengths(dimension, &vectors)?;
    Ok(match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimension, vectors)),
        IndexKind::Hnsw => Box::new(HnswIndex::new(dimension, hnsw, vectors)),
    })
}

/// Cosine distance between two equal-length vectors.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    DistCosine.eval(a, b)
}

fn check_lengths(dimension: usize, vectors: &[Embedding]) -> Result<()> {
    match vectors.iter().find(|v| v.len() != dimension) {
        Some(v) => Err(ValidationError::dimension_mismatch(dimension, v.len()).into()),
        None => Ok(()),
    }
}

fn check_query(dimension: usize, query: &[f32]) -> Result<()> {
    if query.len() != dimension {
        return Err(ValidationError::dimension_mismatch(dimension, query.len()).into());
    }
    Ok(())
}

/// Ascending distance, then ascending position.
fn by_rank(a: &(Position, f32), b: &(Position, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}

/// Sorts scored candidates into rank order and keeps the best `k`.
fn rank(mut scored: Vec<(Position, f32)>, k: usize) -> Vec<(Position, f32)> {
    if k < scored.len() {
        scored.select_nth_unstable_by(k, by_rank);
        scored.truncate(k);
    }
    scored.sort_unstable_by(by_rank);
    scored
}
