//! Embedding service abstractions for ragfolio.
//!
//! This module provides the trait and implementations for embedding generation.
//! Embeddings are dense vector representations of text used for semantic search.
//!
//! # Providers
//!
//! - [`HashingEmbedding`] - Deterministic feature hashing, no model files
//! - `OnnxEmbedding` - Built-in ONNX model (requires `builtin-embeddings` feature)
//!
//! # Example
//!
//! ```rust
//! use ragfolio::embedding::{EmbeddingService, HashingEmbedding};
//!
//! let service = HashingEmbedding::new(384);
//! let embedding = service.embed("hello world").unwrap();
//! assert_eq!(embedding.len(), 384);
//!
//! // Malformed inputs fail individually...
//! assert!(service.embed("   ").is_err());
//!
//! // ...and are skipped inside a batch instead of aborting it.
//! let batch = service.embed_batch(&["hello", "", "world"]).unwrap();
//! assert!(batch[0].is_some());
//! assert!(batch[1].is_none());
//! assert!(batch[2].is_some());
//! ```

mod hashing;

#[cfg(feature = "builtin-embeddings")]
pub mod onnx;

pub use hashing::HashingEmbedding;

use std::sync::Arc;

use tracing::warn;

use crate::config::{Config, EmbeddingProvider};
use crate::error::{RagError, Result, ValidationError};
use crate::types::Embedding;

/// Embedding service trait for generating vector representations of text.
///
/// Implementations must be thread-safe (`Send + Sync`) so one loaded model
/// can serve concurrent queries. Output must be deterministic for a fixed
/// model version: the same text always yields the same vector.
///
/// # Implementing a Custom Provider
///
/// ```rust,ignore
/// use ragfolio::embedding::EmbeddingService;
/// use ragfolio::{Embedding, Result};
///
/// struct MyEmbeddingService {
///     client: MyApiClient,
/// }
///
/// impl EmbeddingService for MyEmbeddingService {
///     fn embed(&self, text: &str) -> Result<Embedding> {
///         self.client.get_embedding(text)
///     }
///
///     fn dimension(&self) -> usize {
///         1536
///     }
///
///     fn model_name(&self) -> &str {
///         "text-embedding-3-small"
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns `RagError::Embedding` if the text is malformed (for example
    /// empty) or the model fails on it.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for multiple texts.
    ///
    /// The output has one slot per input, in input order. An input that
    /// fails with `RagError::Embedding` is logged and yields `None`; the
    /// rest of the batch still runs. Any other error aborts the batch.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Option<Embedding>>> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| match self.embed(text) {
                Ok(embedding) => Ok(Some(embedding)),
                Err(RagError::Embedding(reason)) => {
                    warn!(index, %reason, "Skipping input that could not be embedded");
                    Ok(None)
                }
                Err(e) => Err(e),
            })
            .collect()
    }

    /// Returns the dimension of embeddings produced by this service.
    fn dimension(&self) -> usize;

    /// Identifies the model and version, recorded with persisted indexes.
    fn model_name(&self) -> &str;

    /// Validates that an embedding has the correct dimension.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DimensionMismatch` if dimensions don't match.
    fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.dimension();
        let actual = embedding.len();

        if actual != expected {
            return Err(ValidationError::dimension_mismatch(expected, actual).into());
        }

        Ok(())
    }
}

/// Rejects text that no provider can embed meaningfully.
pub(crate) fn ensure_embeddable(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::embedding("Cannot embed empty text"));
    }
    Ok(())
}

/// Creates an embedding service based on the configuration.
///
/// # Errors
///
/// Returns `RagError::ModelLoad` if:
/// - Builtin embeddings requested but feature not enabled
/// - ONNX model loading fails
pub fn create_embedding_service(config: &Config) -> Result<Arc<dyn EmbeddingService>> {
    match &config.embedding_provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedding::new(config.dimension()))),

        #[cfg(feature = "builtin-embeddings")]
        EmbeddingProvider::Builtin { model_path } => {
            let service = onnx::OnnxEmbedding::with_model(
                model_path.clone(),
                &config.embedding_model,
                config.dimension(),
            )?;
            Ok(Arc::new(service))
        }

        #[cfg(not(feature = "builtin-embeddings"))]
        EmbeddingProvider::Builtin { .. } => Err(RagError::model_load(
            "Builtin embeddings require the 'builtin-embeddings' feature",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fails on texts containing "boom" with a non-embedding error.
    struct FlakyRuntime;

    impl EmbeddingService for FlakyRuntime {
        fn embed(&self, text: &str) -> Result<Embedding> {
            ensure_embeddable(text)?;
            if text.contains("boom") {
                return Err(RagError::model_load("runtime crashed"));
            }
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_batch_skips_malformed_items() {
        let batch = FlakyRuntime.embed_batch(&["a", " ", "b"]).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch[0].is_some());
        assert!(batch[1].is_none());
        assert!(batch[2].is_some());
    }

    #[test]
    fn test_batch_aborts_on_runtime_failure() {
        let result = FlakyRuntime.embed_batch(&["a", "boom"]);
        assert!(matches!(result, Err(RagError::ModelLoad(_))));
    }

    #[test]
    fn test_validate_embedding_wrong_dimension() {
        let result = FlakyRuntime.validate_embedding(&[1.0, 2.0, 3.0]);
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_create_embedding_service_hashing() {
        let config = Config::default();
        let service = create_embedding_service(&config).unwrap();
        assert_eq!(service.dimension(), 384);
    }

    #[cfg(not(feature = "builtin-embeddings"))]
    #[test]
    fn test_create_embedding_service_builtin_requires_feature() {
        let config = Config::with_builtin_embeddings();
        let result = create_embedding_service(&config);
        assert!(matches!(result, Err(RagError::ModelLoad(_))));
    }
}
