//! The retrieval-augmented answering handle.
//!
//! [`Rag`] ties an embedder, a [`VectorStore`], a persona and a generation
//! backend together. It is constructed once by [`Rag::open`], which blocks
//! until the index is loaded (or built and persisted); callers only ever
//! hold a ready handle.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ragfolio::generation::UnconfiguredGeneration;
//! use ragfolio::ingest::InMemorySource;
//! use ragfolio::{Config, HashingEmbedding, Rag};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config {
//!     persist_dir: dir.path().join("index"),
//!     ..Default::default()
//! };
//! let source = InMemorySource::from_texts([
//!     "I study Computer Science.",
//!     "I enjoy competitive programming.",
//! ]);
//!
//! let rag = Rag::open(
//!     config,
//!     Arc::new(HashingEmbedding::new(384)),
//!     Arc::new(UnconfiguredGeneration::new("none")),
//!     &source,
//! ).unwrap();
//!
//! let context = rag.retrieve_context("What do you study?", 1).unwrap();
//! assert_eq!(context, vec!["I study Computer Science.".to_string()]);
//! ```

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::embedding::EmbeddingService;
use crate::error::{RagError, Result};
use crate::generation::{load_persona, GenerationService, Persona, FALLBACK_MESSAGE};
use crate::ingest::DocumentSource;
use crate::store::{artifacts_exist, VectorStore};
use crate::types::QueryResult;

/// Separator placed between retrieved passages.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Ready-to-serve retrieval handle.
///
/// `Rag` is `Send + Sync`; share it behind an `Arc`. Queries read the
/// current store through a cheap `Arc` clone, so a concurrent
/// [`rebuild`](Rag::rebuild) never blocks them for longer than the swap.
pub struct Rag {
    store: RwLock<Arc<VectorStore>>,
    embedder: Arc<dyn EmbeddingService>,
    generator: Arc<dyn GenerationService>,
    persona: Persona,
    config: Config,
    /// Serializes rebuilds so disk and memory agree on the latest build.
    rebuild_lock: Mutex<()>,
}

impl Rag {
    /// Initializes the handle, loading or building the index.
    ///
    /// If both index artifacts exist under `config.persist_dir` they are
    /// loaded. Otherwise the corpus is read from `source`, embedded, built
    /// and persisted before this returns.
    ///
    /// # Errors
    ///
    /// Every error is fatal to startup: invalid configuration, an embedder
    /// whose dimension differs from the configured one, `CorruptIndex`,
    /// `EmptyCorpus`, or ingestion and I/O failures.
    #[instrument(skip_all, fields(persist_dir = %config.persist_dir.display()))]
    pub fn open(
        config: Config,
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerationService>,
        source: &dyn DocumentSource,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.dimension() {
            return Err(RagError::config(format!(
                "embedder '{}' produces {} dimensions, configured {}",
                embedder.model_name(),
                embedder.dimension(),
                config.dimension()
            )));
        }
        let persona = load_persona(&config)?;

        let mut store = VectorStore::new(Arc::clone(&embedder), &config);
        if artifacts_exist(&config.persist_dir) {
            info!("Loading persisted index");
            store.load(&config.persist_dir)?;
        } else {
            info!("No persisted index found; building from corpus");
            let documents = source.load()?;
            store.build(&documents)?;
            store.persist(&config.persist_dir)?;
        }

        info!(
            entries = store.len(),
            state = %store.state(),
            embedding_model = embedder.model_name(),
            generation_model = generator.model_name(),
            "RAG initialized"
        );

        Ok(Self {
            store: RwLock::new(Arc::new(store)),
            embedder,
            generator,
            persona,
            config,
            rebuild_lock: Mutex::new(()),
        })
    }

    /// Wraps an already built or loaded store.
    ///
    /// # Errors
    ///
    /// Returns `RagError::IndexNotReady` if `store` is still `Unbuilt`.
    pub fn from_store(
        store: VectorStore,
        generator: Arc<dyn GenerationService>,
        persona: Persona,
        config: Config,
    ) -> Result<Self> {
        if !store.state().is_queryable() {
            return Err(RagError::IndexNotReady);
        }
        Ok(Self {
            embedder: Arc::clone(store.embedder()),
            store: RwLock::new(Arc::new(store)),
            generator,
            persona,
            config,
            rebuild_lock: Mutex::new(()),
        })
    }

    /// Ranked passage texts for `query`; `""` for results without text.
    pub fn retrieve_context(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        Ok(self
            .search(query, top_k)?
            .iter()
            .map(|result| result.text().to_string())
            .collect())
    }

    /// Raw ranked results for `query`.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<QueryResult>> {
        let results = self.current_store().query(query, top_k)?;
        debug!(top_k, results = results.len(), "Retrieved");
        Ok(results)
    }

    /// Retrieves context for `query` and generates an answer from it.
    ///
    /// Returns [`FALLBACK_MESSAGE`] without calling the generation backend
    /// when no result carries any text.
    ///
    /// # Errors
    ///
    /// Retrieval errors pass through unchanged; backend failures are
    /// `RagError::Generation`.
    pub async fn assemble_answer(&self, query: &str, top_k: usize) -> Result<String> {
        let context = self.retrieve_context(query, top_k)?;
        self.answer_from_context(query, &context).await
    }

    /// Generation half of [`assemble_answer`](Self::assemble_answer).
    ///
    /// Lets callers run retrieval elsewhere (e.g. on a blocking thread).
    pub async fn answer_from_context(&self, query: &str, context: &[String]) -> Result<String> {
        let Some(joined) = join_context(context) else {
            debug!("No context retrieved; returning fallback answer");
            return Ok(FALLBACK_MESSAGE.to_string());
        };

        let user_message = self.persona.user_message(query, &joined);
        self.generator
            .generate(&self.persona.system_instruction, &user_message)
            .await
            .map_err(|e| match e {
                RagError::Generation(_) => e,
                other => RagError::generation(other.to_string()),
            })
    }

    /// Builds a fresh index from `source`, persists it, then swaps it in.
    ///
    /// Queries running during the rebuild keep using the previous index and
    /// never observe a partial one. On failure the previous index stays in
    /// service and on disk.
    #[instrument(skip_all)]
    pub fn rebuild(&self, source: &dyn DocumentSource) -> Result<()> {
        let _guard = self
            .rebuild_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let documents = source.load()?;
        let mut store = VectorStore::new(Arc::clone(&self.embedder), &self.config);
        store.build(&documents)?;
        store.persist(&self.config.persist_dir)?;

        let entries = store.len();
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(store);
        info!(entries, "Index rebuilt and swapped in");
        Ok(())
    }

    /// Snapshot of the store currently serving queries.
    pub fn current_store(&self) -> Arc<VectorStore> {
        // A writer only ever replaces the whole Arc
        Arc::clone(&self.store.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Configuration the handle was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Persona framing generation calls.
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// Number of entries in the serving index.
    pub fn len(&self) -> usize {
        self.current_store().len()
    }

    /// Returns true if the serving index has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Joins non-blank passages in rank order, each exactly as stored; `None`
/// when every passage is blank.
pub fn join_context(context: &[String]) -> Option<String> {
    let passages: Vec<&str> = context
        .iter()
        .filter(|text| !text.trim().is_empty())
        .map(String::as_str)
        .collect();
    (!passages.is_empty()).then(|| passages.join(CONTEXT_SEPARATOR))
}
