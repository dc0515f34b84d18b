//! Error types for ragfolio.
//!
//! ragfolio uses a hierarchical error system:
//! - `RagError` is the top-level error returned by all public APIs
//! - Specific error types (`CorruptIndexError`, `ValidationError`) provide detail
//!
//! Errors fall into two groups. Startup errors (`ModelLoad`, `EmptyCorpus`,
//! `CorruptIndex`) abort initialization; there is no degraded mode serving a
//! half-initialized index. Per-request errors (`IndexNotReady`, `Generation`,
//! `Validation`) are mapped to a response at the request boundary.
//!
//! # Error Handling Pattern
//! ```rust,ignore
//! use ragfolio::{Rag, RagError};
//!
//! match rag.assemble_answer("What do you study?", 5).await {
//!     Ok(answer) => println!("{answer}"),
//!     Err(e) if e.is_generation() => eprintln!("model unreachable: {e}"),
//!     Err(e) => eprintln!("retrieval failed: {e}"),
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ragfolio operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Top-level error enum for all ragfolio operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding model could not be initialized.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// An index build was attempted with no usable documents.
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    /// Persisted index artifacts are structurally inconsistent.
    #[error("Corrupt index: {0}")]
    CorruptIndex(#[from] CorruptIndexError),

    /// The index has not been built or loaded yet.
    #[error("Index not ready: build or load it before querying")]
    IndexNotReady,

    /// A single input could not be embedded.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The generation service failed (timeout, transport, API error).
    #[error("Generation error: {0}")]
    Generation(String),

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Corpus ingestion error.
    #[error("Ingestion error: {0}")]
    Ingest(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Creates a model load error with the given message.
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Creates an embedding error with the given message.
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Creates a generation error with the given message.
    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates an ingestion error with the given message.
    pub fn ingest(msg: impl Into<String>) -> Self {
        Self::Ingest(msg.into())
    }

    /// Returns true if this error must abort process startup.
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::ModelLoad(_) | Self::EmptyCorpus | Self::CorruptIndex(_) | Self::Config { .. }
        )
    }

    /// Returns true if the index is not ready to serve queries.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::IndexNotReady)
    }

    /// Returns true if this is a generation failure.
    pub fn is_generation(&self) -> bool {
        matches!(self, Self::Generation(_))
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a corrupt index error.
    pub fn is_corrupt_index(&self) -> bool {
        matches!(self, Self::CorruptIndex(_))
    }

    /// Returns true if this is an embedding error.
    pub fn is_embedding(&self) -> bool {
        matches!(self, Self::Embedding(_))
    }
}

/// Structural problems found while loading persisted index artifacts.
///
/// Any of these means the index on disk cannot be trusted. Serving from it
/// would produce garbage distances, so loading fails instead.
#[derive(Debug, Error)]
pub enum CorruptIndexError {
    /// One of the two artifacts is missing.
    #[error("Missing index artifact: {0}")]
    MissingArtifact(PathBuf),

    /// An artifact could not be decoded.
    #[error("Failed to decode {artifact}: {reason}")]
    Decode {
        /// Artifact file name.
        artifact: String,
        /// Decoder message.
        reason: String,
    },

    /// An artifact was written by an unsupported format version.
    #[error("Unsupported format version in {artifact}: found {found}, expected {expected}")]
    UnsupportedFormat {
        /// Artifact file name.
        artifact: String,
        /// Version found on disk.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// The artifacts come from two different builds.
    #[error("Artifacts belong to different builds: vectors {vectors}, metadata {metadata}")]
    BuildMismatch {
        /// Build id recorded in the vector artifact.
        vectors: String,
        /// Build id recorded in the metadata artifact.
        metadata: String,
    },

    /// Vector table and metadata table have different lengths.
    #[error("Entry count mismatch: {vectors} vectors, {metadata} metadata records")]
    CountMismatch {
        /// Number of stored vectors.
        vectors: usize,
        /// Number of stored metadata records.
        metadata: usize,
    },

    /// A metadata record is not at the position it claims.
    #[error("Metadata record at index {index} claims position {claimed}")]
    PositionMismatch {
        /// Index of the record in the side-table.
        index: usize,
        /// Position recorded in the record.
        claimed: usize,
    },

    /// Declared index dimension differs from the embedder's dimension.
    #[error("Embedding dimension mismatch: index has {index}, embedder produces {embedder}")]
    DimensionMismatch {
        /// Dimension declared by the index.
        index: usize,
        /// Dimension produced by the current embedder.
        embedder: usize,
    },

    /// A stored vector does not have the declared dimension.
    #[error("Vector at position {position} has length {got}, expected {expected}")]
    VectorLength {
        /// Position of the offending vector.
        position: usize,
        /// Declared dimension.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// The index was built with a different embedding model.
    #[error("Embedding model mismatch: index built with '{index}', embedder is '{embedder}'")]
    ModelMismatch {
        /// Model recorded in the index.
        index: String,
        /// Model of the current embedder.
        embedder: String,
    },
}

impl CorruptIndexError {
    /// Creates a decode error for the given artifact.
    pub fn decode(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Vector dimension doesn't match the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// Requested result count is outside the accepted range.
    #[error("top_k must be between {min} and {max}, got {got}")]
    TopKOutOfRange {
        /// Requested value.
        got: i64,
        /// Smallest accepted value.
        min: usize,
        /// Largest accepted value.
        max: usize,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }

    /// Creates a top_k range error.
    pub fn top_k_out_of_range(got: i64, min: usize, max: usize) -> Self {
        Self::TopKOutOfRange { got, min, max }
    }
}
