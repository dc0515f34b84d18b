//! Configuration types for ragfolio.
//!
//! The [`Config`] struct controls:
//! - Where durable index artifacts live and where the corpus is read from
//! - Embedding provider and dimension
//! - Index backend (exact flat scan or HNSW)
//! - Generation backend and request timeouts
//! - `top_k` defaults and bounds
//!
//! # Example
//! ```rust
//! use ragfolio::{Config, EmbeddingDimension, IndexKind};
//!
//! // Use defaults (hashing embedder, 384 dimensions, flat index)
//! let config = Config::default();
//!
//! // Customize
//! let config = Config {
//!     embedding_dimension: EmbeddingDimension::D768,
//!     index_kind: IndexKind::Hnsw,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result, ValidationError};

/// Smallest accepted `top_k`.
pub const MIN_TOP_K: usize = 1;

/// Default number of passages retrieved per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Default upper bound for `top_k` at the request boundary.
pub const DEFAULT_MAX_TOP_K: usize = 20;

/// Largest embedding dimension accepted for `EmbeddingDimension::Custom`.
pub const MAX_DIMENSION: usize = 4096;

/// Prefix for environment variables read by [`Config::from_env`].
pub const ENV_PREFIX: &str = "RAGFOLIO_";

/// Application configuration.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use ragfolio::Config;
///
/// let config = Config {
///     persist_dir: "/var/lib/ragfolio/index".into(),
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory holding the two persisted index artifacts.
    pub persist_dir: PathBuf,

    /// Corpus directory read when no persisted index exists.
    pub data_dir: PathBuf,

    /// How embeddings are generated.
    pub embedding_provider: EmbeddingProvider,

    /// Embedding vector dimension (must match provider output).
    pub embedding_dimension: EmbeddingDimension,

    /// Embedding model identifier for the builtin provider.
    pub embedding_model: String,

    /// Nearest-neighbor backend.
    pub index_kind: IndexKind,

    /// HNSW tuning parameters (used when `index_kind` is `Hnsw`).
    pub hnsw: HnswConfig,

    /// Corpus chunking parameters.
    pub chunking: ChunkConfig,

    /// Generation backend settings.
    pub generation: GenerationConfig,

    /// `top_k` used when a request does not specify one.
    pub default_top_k: usize,

    /// Largest `top_k` accepted at the request boundary.
    pub max_top_k: usize,

    /// Timeout wrapping a whole query or answer request.
    pub request_timeout: Duration,

    /// Optional file holding the persona system instruction.
    pub persona_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persist_dir: PathBuf::from("index_store"),
            data_dir: PathBuf::from("data"),
            // Hashing is the safe default - no ONNX dependency required
            embedding_provider: EmbeddingProvider::Hashing,
            // 384 matches all-MiniLM-L6-v2, the default builtin model
            embedding_dimension: EmbeddingDimension::D384,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            index_kind: IndexKind::Flat,
            hnsw: HnswConfig::default(),
            chunking: ChunkConfig::default(),
            generation: GenerationConfig::default(),
            default_top_k: DEFAULT_TOP_K,
            max_top_k: DEFAULT_MAX_TOP_K,
            request_timeout: Duration::from_secs(60),
            persona_path: None,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config for builtin ONNX embedding generation.
    ///
    /// This requires the `builtin-embeddings` feature to be enabled.
    pub fn with_builtin_embeddings() -> Self {
        Self {
            embedding_provider: EmbeddingProvider::Builtin { model_path: None },
            ..Default::default()
        }
    }

    /// Builds a Config from process environment variables.
    ///
    /// Unset variables keep their defaults. Recognized variables are the
    /// `RAGFOLIO_*` names listed on [`Config::from_lookup`], plus
    /// `GROQ_API_KEY` for the generation API key.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a Config from an arbitrary key lookup.
    ///
    /// Keys: `RAGFOLIO_PERSIST_DIR`, `RAGFOLIO_DATA_DIR`,
    /// `RAGFOLIO_EMBEDDING_PROVIDER` (`hashing` | `builtin`),
    /// `RAGFOLIO_MODEL_PATH`, `RAGFOLIO_EMBEDDING_DIMENSION`,
    /// `RAGFOLIO_EMBEDDING_MODEL`, `RAGFOLIO_INDEX_KIND` (`flat` | `hnsw`),
    /// `RAGFOLIO_GENERATION_MODEL`, `RAGFOLIO_GENERATION_API_BASE`,
    /// `RAGFOLIO_GENERATION_API_KEY` (falls back to `GROQ_API_KEY`),
    /// `RAGFOLIO_GENERATION_TIMEOUT_SECS`, `RAGFOLIO_REQUEST_TIMEOUT_SECS`,
    /// `RAGFOLIO_DEFAULT_TOP_K`, `RAGFOLIO_MAX_TOP_K`, `RAGFOLIO_PERSONA_PATH`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };
        let mut config = Self::default();

        if let Some(dir) = var("PERSIST_DIR") {
            config.persist_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        let model_path = var("MODEL_PATH").map(PathBuf::from);
        match var("EMBEDDING_PROVIDER").as_deref().map(str::trim) {
            None | Some("hashing") => {}
            Some("builtin") => {
                config.embedding_provider = EmbeddingProvider::Builtin { model_path };
            }
            Some(other) => {
                return Err(RagError::config(format!(
                    "unknown embedding provider '{other}' (expected 'hashing' or 'builtin')"
                )));
            }
        }

        if let Some(model) = var("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dim) = var("EMBEDDING_DIMENSION") {
            config.embedding_dimension = EmbeddingDimension::from_size(parse_number(
                "RAGFOLIO_EMBEDDING_DIMENSION",
                &dim,
            )?);
        }
        if let Some(kind) = var("INDEX_KIND") {
            config.index_kind = kind.parse()?;
        }

        if let Some(model) = var("GENERATION_MODEL") {
            config.generation.model = model;
        }
        if let Some(base) = var("GENERATION_API_BASE") {
            config.generation.api_base = base;
        }
        config.generation.api_key = var("GENERATION_API_KEY")
            .or_else(|| lookup("GROQ_API_KEY").filter(|v| !v.trim().is_empty()));
        if let Some(secs) = var("GENERATION_TIMEOUT_SECS") {
            config.generation.timeout = Duration::from_secs(parse_number(
                "RAGFOLIO_GENERATION_TIMEOUT_SECS",
                &secs,
            )? as u64);
        }
        if let Some(secs) = var("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_number(
                "RAGFOLIO_REQUEST_TIMEOUT_SECS",
                &secs,
            )? as u64);
        }

        if let Some(k) = var("DEFAULT_TOP_K") {
            config.default_top_k = parse_number("RAGFOLIO_DEFAULT_TOP_K", &k)?;
        }
        if let Some(k) = var("MAX_TOP_K") {
            config.max_top_k = parse_number("RAGFOLIO_MAX_TOP_K", &k)?;
        }
        if let Some(path) = var("PERSONA_PATH") {
            config.persona_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `Rag::open()` and `Config::from_env()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - Custom dimension is 0 or > 4096
    /// - `default_top_k` is outside `[1, max_top_k]`
    /// - chunk overlap is not smaller than chunk size
    /// - HNSW parameters are zero
    /// - generation model name is empty
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if let EmbeddingDimension::Custom(dim) = self.embedding_dimension {
            if dim == 0 {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    "custom dimension must be greater than 0",
                ));
            }
            if dim > MAX_DIMENSION {
                return Err(ValidationError::invalid_field(
                    "embedding_dimension",
                    format!("custom dimension must not exceed {MAX_DIMENSION}"),
                ));
            }
        }

        if self.max_top_k < MIN_TOP_K {
            return Err(ValidationError::invalid_field(
                "max_top_k",
                "must be at least 1",
            ));
        }
        if !(MIN_TOP_K..=self.max_top_k).contains(&self.default_top_k) {
            return Err(ValidationError::invalid_field(
                "default_top_k",
                format!("must be between {MIN_TOP_K} and {}", self.max_top_k),
            ));
        }

        self.chunking.validate()?;
        self.hnsw.validate()?;

        if self.generation.model.trim().is_empty() {
            return Err(ValidationError::required_field("generation.model"));
        }

        Ok(())
    }

    /// Returns the embedding dimension as a numeric value.
    pub fn dimension(&self) -> usize {
        self.embedding_dimension.size()
    }
}

fn parse_number(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| RagError::config(format!("{name}: '{raw}' is not a valid number ({e})")))
}

/// Embedding provider configuration.
#[derive(Clone, Debug)]
pub enum EmbeddingProvider {
    /// Deterministic feature-hashing embedder built into the crate.
    ///
    /// Needs no model files. Lexical rather than semantic, but exact-match
    /// preserving and stable across runs.
    Hashing,

    /// ONNX sentence-transformer model (all-MiniLM-L6-v2 or bge-base-en-v1.5).
    ///
    /// Requires the `builtin-embeddings` feature.
    Builtin {
        /// Custom model directory. If `None`, uses the default cache location.
        model_path: Option<PathBuf>,
    },
}

impl EmbeddingProvider {
    /// Returns true if this is the builtin ONNX provider.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin { .. })
    }

    /// Returns true if this is the hashing provider.
    pub fn is_hashing(&self) -> bool {
        matches!(self, Self::Hashing)
    }
}

/// Embedding vector dimensions.
///
/// Standard dimensions are provided for common models. Use `Custom` for
/// other embedding services.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingDimension {
    /// 384 dimensions (all-MiniLM-L6-v2, default builtin model).
    #[default]
    D384,

    /// 768 dimensions (bge-base-en-v1.5, BERT-base).
    D768,

    /// Custom dimension for other embedding models.
    ///
    /// Must be between 1 and 4096.
    Custom(usize),
}

impl EmbeddingDimension {
    /// Returns the numeric size of this dimension.
    ///
    /// # Example
    /// ```rust
    /// use ragfolio::EmbeddingDimension;
    ///
    /// assert_eq!(EmbeddingDimension::D384.size(), 384);
    /// assert_eq!(EmbeddingDimension::Custom(1536).size(), 1536);
    /// ```
    #[inline]
    pub const fn size(&self) -> usize {
        match self {
            Self::D384 => 384,
            Self::D768 => 768,
            Self::Custom(n) => *n,
        }
    }

    /// Maps a numeric size to the matching variant.
    pub const fn from_size(size: usize) -> Self {
        match size {
            384 => Self::D384,
            768 => Self::D768,
            n => Self::Custom(n),
        }
    }
}

/// Nearest-neighbor search backend.
///
/// Both backends rank by the same cosine distance; they differ only in
/// whether every stored vector is scanned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact scan over all stored vectors.
    #[default]
    Flat,

    /// HNSW graph search (approximate, for large corpora).
    Hnsw,
}

impl std::str::FromStr for IndexKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "hnsw" => Ok(Self::Hnsw),
            other => Err(RagError::config(format!(
                "unknown index kind '{other}' (expected 'flat' or 'hnsw')"
            ))),
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => f.write_str("flat"),
            Self::Hnsw => f.write_str("hnsw"),
        }
    }
}

/// HNSW graph parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HnswConfig {
    /// Maximum connections per node per layer (M).
    pub max_nb_connection: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Candidate list size during search (raised to `top_k` when smaller).
    pub ef_search: usize,
    /// Maximum number of layers.
    pub max_layer: usize,
    /// Capacity hint; raised to the corpus size at build time.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 64,
            max_layer: 16,
            max_elements: 10_000,
        }
    }
}

impl HnswConfig {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        for (field, value) in [
            ("hnsw.max_nb_connection", self.max_nb_connection),
            ("hnsw.ef_construction", self.ef_construction),
            ("hnsw.ef_search", self.ef_search),
            ("hnsw.max_layer", self.max_layer),
        ] {
            if value == 0 {
                return Err(ValidationError::invalid_field(field, "must be greater than 0"));
            }
        }
        Ok(())
    }
}

/// Corpus chunking parameters, in characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Target chunk length.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.chunk_size == 0 {
            return Err(ValidationError::invalid_field(
                "chunking.chunk_size",
                "must be greater than 0",
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ValidationError::invalid_field(
                "chunking.chunk_overlap",
                "must be smaller than chunk_size",
            ));
        }
        Ok(())
    }
}

/// Generation backend settings.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    /// Model name sent to the chat-completions endpoint.
    pub model: String,
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    /// Bearer token. Without one, answer requests fail with a generation error.
    pub api_key: Option<String>,
    /// Per-call HTTP timeout.
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.1-8b-instant".to_string(),
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}
