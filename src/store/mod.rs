//! The vector store: an index over embedded documents plus its metadata.
//!
//! A [`VectorStore`] owns the numeric index (vectors addressed by
//! [`Position`]) and the metadata side-table (one [`EntryMetadata`] per
//! position). It moves through the lifecycle tracked by [`IndexState`]:
//!
//! ```text
//! Unbuilt ──build──▶ Built ──persist──▶ Persisted
//!    │
//!    └────load────▶ Loaded
//! ```
//!
//! `query` is valid once the store holds an in-memory index, i.e. in every
//! state except `Unbuilt`. After `Built`/`Loaded` the contents are never
//! mutated; rebuilding replaces them wholesale.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ragfolio::{Config, Document, DocumentId, HashingEmbedding, VectorStore};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let embedder = Arc::new(HashingEmbedding::new(384));
//!
//! let mut store = VectorStore::new(embedder.clone(), &Config::default());
//! store.build(&[
//!     Document::new(DocumentId(1), "I study Computer Science."),
//!     Document::new(DocumentId(2), "I enjoy competitive programming."),
//! ]).unwrap();
//! store.persist(&dir.path().join("index")).unwrap();
//!
//! let mut reloaded = VectorStore::new(embedder, &Config::default());
//! reloaded.load(&dir.path().join("index")).unwrap();
//! let results = reloaded.query("What do you study?", 1).unwrap();
//! assert_eq!(results[0].text(), "I study Computer Science.");
//! ```

mod persist;

pub use persist::{artifacts_exist, FORMAT_VERSION, METADATA_FILE, VECTORS_FILE};

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Config, HnswConfig, IndexKind, MIN_TOP_K};
use crate::embedding::EmbeddingService;
use crate::error::{CorruptIndexError, RagError, Result, ValidationError};
use crate::types::{Document, EntryMetadata, Position, QueryResult};
use crate::vector::{build_index, VectorIndex};

use persist::{DirLock, MetadataArtifact, VectorsArtifact};

/// Lifecycle state of a [`VectorStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexState {
    /// No index in memory.
    Unbuilt,
    /// Built in memory, not yet durable.
    Built,
    /// Durable on disk; the in-memory copy is still held.
    Persisted,
    /// Read back from disk.
    Loaded,
}

impl IndexState {
    /// Returns true if queries can be served in this state.
    pub fn is_queryable(self) -> bool {
        !matches!(self, Self::Unbuilt)
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbuilt => "unbuilt",
            Self::Built => "built",
            Self::Persisted => "persisted",
            Self::Loaded => "loaded",
        };
        f.write_str(name)
    }
}

/// In-memory index contents.
struct Contents {
    build_id: Uuid,
    index: Box<dyn VectorIndex>,
    entries: Vec<EntryMetadata>,
}

/// Vector index plus metadata side-table, joined by position.
pub struct VectorStore {
    embedder: Arc<dyn EmbeddingService>,
    index_kind: IndexKind,
    hnsw: HnswConfig,
    state: IndexState,
    contents: Option<Contents>,
}

impl VectorStore {
    /// Creates an `Unbuilt` store using the index settings from `config`.
    pub fn new(embedder: Arc<dyn EmbeddingService>, config: &Config) -> Self {
        Self {
            embedder,
            index_kind: config.index_kind,
            hnsw: config.hnsw.clone(),
            state: IndexState::Unbuilt,
            contents: None,
        }
    }

    /// Embeds `documents` and builds the index in memory.
    ///
    /// Documents the embedder rejects are logged and left out; survivors get
    /// dense positions `0..n` in input order. Any previous contents are
    /// discarded.
    ///
    /// # Errors
    ///
    /// - `RagError::EmptyCorpus` if `documents` is empty or none survive
    /// - `RagError::Validation` if the embedder returns vectors of the wrong
    ///   dimension
    /// - any non-recoverable embedder error
    #[instrument(skip(self, documents), fields(documents = documents.len(), kind = %self.index_kind))]
    pub fn build(&mut self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let embedded = self.embedder.embed_batch(&texts)?;
        if embedded.len() != documents.len() {
            return Err(RagError::embedding(format!(
                "Embedder returned {} results for {} inputs",
                embedded.len(),
                documents.len()
            )));
        }

        let mut vectors = Vec::with_capacity(documents.len());
        let mut entries = Vec::with_capacity(documents.len());
        for (document, embedding) in documents.iter().zip(embedded) {
            let Some(embedding) = embedding else {
                warn!(document_id = %document.id, "Skipping document that could not be embedded");
                continue;
            };
            self.embedder.validate_embedding(&embedding)?;
            entries.push(EntryMetadata::from_document(Position(vectors.len()), document));
            vectors.push(embedding);
        }

        if vectors.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let skipped = documents.len() - vectors.len();
        let index = build_index(
            self.index_kind,
            self.embedder.dimension(),
            &self.hnsw,
            vectors,
        )?;
        let build_id = Uuid::now_v7();

        info!(
            count = entries.len(),
            skipped,
            dimension = index.dimension(),
            %build_id,
            "Index built"
        );

        self.contents = Some(Contents {
            build_id,
            index,
            entries,
        });
        self.state = IndexState::Built;
        Ok(())
    }

    /// Writes the index to `dir` as two artifacts, replacing prior contents.
    ///
    /// The write is atomic: readers see either the previous artifacts or the
    /// new ones. The in-memory copy stays queryable.
    ///
    /// # Errors
    ///
    /// Returns `RagError::IndexNotReady` if nothing has been built or loaded,
    /// or `RagError::Io` if writing fails.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub fn persist(&mut self, dir: &Path) -> Result<()> {
        let contents = self.contents.as_ref().ok_or(RagError::IndexNotReady)?;

        let vectors = VectorsArtifact {
            format_version: persist::FORMAT_VERSION,
            build_id: contents.build_id,
            dimension: contents.index.dimension(),
            vectors: Cow::Borrowed(contents.index.vectors()),
        };
        let metadata = MetadataArtifact {
            format_version: persist::FORMAT_VERSION,
            build_id: contents.build_id,
            dimension: contents.index.dimension(),
            embedding_model: self.embedder.model_name().to_string(),
            index_kind: contents.index.kind(),
            count: contents.entries.len(),
            entries: Cow::Borrowed(contents.entries.as_slice()),
        };

        {
            let _lock = DirLock::exclusive(dir)?;
            persist::write_artifacts(dir, &vectors, &metadata)?;
        }

        info!(count = metadata.count, build_id = %metadata.build_id, "Index persisted");
        self.state = IndexState::Persisted;
        Ok(())
    }

    /// Reads a persisted index from `dir`, replacing any in-memory contents.
    ///
    /// # Errors
    ///
    /// Returns `RagError::CorruptIndex` if either artifact is missing or
    /// unreadable, the two disagree in any way, or the index was built with
    /// a different embedding dimension or model than the current embedder.
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return Err(CorruptIndexError::MissingArtifact(dir.to_path_buf()).into());
        }

        let (vectors, metadata) = {
            let _lock = DirLock::shared(dir)?;
            persist::read_artifacts(dir)?
        };

        let embedder_dimension = self.embedder.dimension();
        if metadata.dimension != embedder_dimension {
            return Err(CorruptIndexError::DimensionMismatch {
                index: metadata.dimension,
                embedder: embedder_dimension,
            }
            .into());
        }
        if metadata.embedding_model != self.embedder.model_name() {
            return Err(CorruptIndexError::ModelMismatch {
                index: metadata.embedding_model,
                embedder: self.embedder.model_name().to_string(),
            }
            .into());
        }
        if metadata.index_kind != self.index_kind {
            info!(
                persisted = %metadata.index_kind,
                configured = %self.index_kind,
                "Serving persisted vectors with the configured index kind"
            );
        }

        let index = build_index(
            self.index_kind,
            metadata.dimension,
            &self.hnsw,
            vectors.vectors.into_owned(),
        )?;

        info!(
            count = metadata.count,
            dimension = metadata.dimension,
            build_id = %metadata.build_id,
            "Index loaded"
        );

        self.contents = Some(Contents {
            build_id: metadata.build_id,
            index,
            entries: metadata.entries.into_owned(),
        });
        self.state = IndexState::Loaded;
        Ok(())
    }

    /// Returns the `top_k` entries nearest to `text`, closest first.
    ///
    /// Returns fewer than `top_k` results when the index is smaller.
    ///
    /// # Errors
    ///
    /// - `RagError::IndexNotReady` if the store is `Unbuilt`
    /// - `RagError::Validation` if `top_k` is 0
    /// - `RagError::Embedding` if `text` cannot be embedded
    pub fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryResult>> {
        self.ready()?;
        check_top_k(top_k)?;
        let vector = self.embedder.embed(text)?;
        self.search_vector(&vector, top_k)
    }

    /// Like [`query`](Self::query), for an already-embedded query vector.
    pub fn search_vector(&self, vector: &[f32], top_k: usize) -> Result<Vec<QueryResult>> {
        let contents = self.ready()?;
        check_top_k(top_k)?;

        let hits = contents.index.search(vector, top_k)?;
        debug!(top_k, hits = hits.len(), "Index searched");

        hits.into_iter()
            .map(|(position, distance)| {
                let entry = contents.entries.get(position.get()).ok_or_else(|| {
                    RagError::from(CorruptIndexError::CountMismatch {
                        vectors: contents.index.len(),
                        metadata: contents.entries.len(),
                    })
                })?;
                Ok(QueryResult {
                    position,
                    distance,
                    metadata: entry.attributes.clone(),
                })
            })
            .collect()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IndexState {
        self.state
    }

    /// Number of indexed entries (0 when `Unbuilt`).
    pub fn len(&self) -> usize {
        self.contents.as_ref().map_or(0, |c| c.entries.len())
    }

    /// Returns true when no entries are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding dimension served by this store.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Backend used for searches.
    pub fn index_kind(&self) -> IndexKind {
        self.index_kind
    }

    /// Identifier of the build currently held in memory.
    pub fn build_id(&self) -> Option<Uuid> {
        self.contents.as_ref().map(|c| c.build_id)
    }

    /// Metadata side-table, in position order.
    pub fn entries(&self) -> &[EntryMetadata] {
        self.contents
            .as_ref()
            .map(|c| c.entries.as_slice())
            .unwrap_or_default()
    }

    /// The embedder used for queries.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingService> {
        &self.embedder
    }

    fn ready(&self) -> Result<&Contents> {
        self.contents.as_ref().ok_or(RagError::IndexNotReady)
    }
}

impl fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("state", &self.state)
            .field("index_kind", &self.index_kind)
            .field("len", &self.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k < MIN_TOP_K {
        return Err(ValidationError::invalid_field("top_k", "must be at least 1").into());
    }
    Ok(())
}
