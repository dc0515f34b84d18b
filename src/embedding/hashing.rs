//! Feature-hashing embedder.
//!
//! Maps each lower-cased alphanumeric token to a bucket with 64-bit FNV-1a
//! and counts occurrences per bucket, then L2-normalizes:
//!
//! ```text
//! Text → Tokenize → Hash into D buckets → L2 Normalize → Embedding
//! ```
//!
//! FNV-1a is fixed by its published constants, so vectors are identical
//! across platforms, runs and compiler versions. Similarity is lexical: texts
//! sharing words are close, paraphrases are not. Counts never go negative,
//! so any text with at least one token has a non-zero vector.

use crate::embedding::{ensure_embeddable, EmbeddingService};
use crate::error::{RagError, Result};
use crate::types::Embedding;

const MODEL_NAME: &str = "feature-hashing-fnv1a-v2";

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic embedder based on feature hashing.
///
/// Stateless, so it is trivially `Send + Sync` and needs no locking.
#[derive(Clone, Debug)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    /// Creates a hashing embedder producing `dimension`-length vectors.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingService for HashingEmbedding {
    fn embed(&self, text: &str) -> Result<Embedding> {
        ensure_embeddable(text)?;
        if self.dimension == 0 {
            return Err(RagError::model_load("Hashing embedder needs a non-zero dimension"));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(RagError::embedding("Text contains no embeddable tokens"));
        }

        l2_normalize(&mut vector)
            .then_some(vector)
            .ok_or_else(|| RagError::embedding("Text produced a zero vector"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }
}

/// Lower-cased runs of alphanumeric characters.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Normalizes in place; returns false for a zero vector.
fn l2_normalize(v: &mut [f32]) -> bool {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}
