//! # ragfolio
//!
//! Retrieval-augmented question answering over a fixed document corpus.
//!
//! ragfolio embeds a corpus once, keeps the vectors in a persistent
//! nearest-neighbor index, and answers questions by retrieving the closest
//! passages and handing them to a generative model under a fixed persona.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ragfolio::prelude::*;
//! use ragfolio::generation::UnconfiguredGeneration;
//! use ragfolio::ingest::InMemorySource;
//!
//! # fn main() -> ragfolio::Result<()> {
//! # let dir = tempfile::tempdir()?;
//! let config = Config {
//!     persist_dir: dir.path().join("index"),
//!     ..Default::default()
//! };
//!
//! // Loads the persisted index, or builds and persists it on first run
//! let rag = Rag::open(
//!     config,
//!     Arc::new(HashingEmbedding::new(384)),
//!     Arc::new(UnconfiguredGeneration::new("none")),
//!     &InMemorySource::from_texts(["I study Computer Science."]),
//! )?;
//!
//! let results = rag.search("What do you study?", 5)?;
//! assert_eq!(results[0].text(), "I study Computer Science.");
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Index lifecycle
//!
//! A [`VectorStore`] is `Unbuilt` until it is built from documents or loaded
//! from disk. A built index is persisted as two artifacts (vectors and
//! metadata) that are written atomically and validated against each other,
//! and against the current embedder, on every load.
//!
//! ### Position
//!
//! Every entry is addressed by its 0-based insertion [`Position`], which is
//! stored explicitly on each metadata record.
//!
//! ### Distance
//!
//! Cosine distance (`1 - cos`), smaller is more similar. Ties are broken by
//! ascending position so rankings are reproducible.
//!
//! ## Features
//!
//! - `server` (default) - HTTP API, chat-completions client and the `ragfolio` binary
//! - `builtin-embeddings` - ONNX sentence-transformer embeddings
//!
//! ## Thread Safety
//!
//! [`Rag`] is `Send + Sync` and can be shared across threads using `Arc`.
//! A loaded index is read-only; rebuilds swap in a complete replacement.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod rag;
mod types;

pub mod embedding;
pub mod generation;
pub mod ingest;
pub mod store;

/// Nearest-neighbor backends: exact flat scan and HNSW.
pub mod vector;

/// HTTP API.
#[cfg(feature = "server")]
pub mod server;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main handle
pub use rag::{join_context, Rag, CONTEXT_SEPARATOR};

// Configuration
pub use config::{
    ChunkConfig, Config, EmbeddingDimension, EmbeddingProvider, GenerationConfig, HnswConfig,
    IndexKind, DEFAULT_MAX_TOP_K, DEFAULT_TOP_K, MIN_TOP_K,
};

// Error handling
pub use error::{CorruptIndexError, RagError, Result, ValidationError};

// Core types
pub use types::{
    Attributes, Document, DocumentId, Embedding, EntryMetadata, Position, QueryResult,
    TEXT_ATTRIBUTE,
};

// Components
pub use embedding::{EmbeddingService, HashingEmbedding};
pub use generation::{GenerationService, Persona, FALLBACK_MESSAGE};
pub use store::{IndexState, VectorStore};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common ragfolio usage.
///
/// ```rust
/// use ragfolio::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{Config, EmbeddingDimension, IndexKind};
    pub use crate::embedding::{EmbeddingService, HashingEmbedding};
    pub use crate::error::{RagError, Result};
    pub use crate::generation::GenerationService;
    pub use crate::ingest::DocumentSource;
    pub use crate::rag::Rag;
    pub use crate::store::VectorStore;
    pub use crate::types::{Document, DocumentId, QueryResult};
}
