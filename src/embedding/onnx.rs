//! ONNX-based embedding generation.
//!
//! Requires the `builtin-embeddings` feature.
//!
//! # Supported Models
//!
//! - **all-MiniLM-L6-v2** (384 dimensions) - Default, fast and compact
//! - **bge-base-en-v1.5** (768 dimensions) - Higher quality, larger
//!
//! # Example
//!
//! ```rust,ignore
//! use ragfolio::embedding::onnx::OnnxEmbedding;
//!
//! let service = OnnxEmbedding::new(None)?;  // Use default model
//! let embedding = service.embed("Hello, world!")?;
//! assert_eq!(embedding.len(), 384);
//! ```
//!
//! # Pipeline
//!
//! ```text
//! Text → Tokenize → ONNX Inference → Mean Pool → L2 Normalize → Embedding
//! ```
//!
//! Single and batched calls share one inference path; a single text is a
//! batch of one.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tokenizers::{Encoding, Tokenizer};
use tracing::{debug, info, warn};

use crate::embedding::{ensure_embeddable, EmbeddingService};
use crate::error::{RagError, Result};
use crate::types::Embedding;

/// File names expected in each model directory
const MODEL_FILENAME: &str = "model.onnx";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// A sentence-transformer model this provider knows how to fetch and run.
struct ModelSpec {
    name: &'static str,
    dimension: usize,
    max_length: usize,
    model_url: &'static str,
    tokenizer_url: &'static str,
}

const KNOWN_MODELS: [ModelSpec; 2] = [
    ModelSpec {
        name: "all-MiniLM-L6-v2",
        dimension: 384,
        max_length: 256,
        model_url: "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx",
        tokenizer_url: "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json",
    },
    ModelSpec {
        name: "bge-base-en-v1.5",
        dimension: 768,
        max_length: 512,
        model_url: "https://huggingface.co/BAAI/bge-base-en-v1.5/resolve/main/onnx/model.onnx",
        tokenizer_url: "https://huggingface.co/BAAI/bge-base-en-v1.5/resolve/main/tokenizer.json",
    },
];

/// Embedded once at load time to verify the model's output shape.
const WARMUP_TEXT: &str = "warm-up";

/// Max sequence length for models not in [`KNOWN_MODELS`].
const FALLBACK_MAX_LENGTH: usize = 256;

fn known_model(name: &str) -> Option<&'static ModelSpec> {
    KNOWN_MODELS.iter().find(|m| m.name == name)
}

/// ONNX-based embedding service.
///
/// The model and tokenizer are loaded eagerly at construction time, so a
/// missing model fails `Rag::open()` instead of the first query.
///
/// # Thread Safety
///
/// `Session::run()` requires `&mut self`, so the session sits behind a
/// `Mutex`: concurrent callers are serialized through its single owner.
pub struct OnnxEmbedding {
    session: Mutex<Session>,

    /// Immutable after loading, so no lock.
    tokenizer: Tokenizer,

    model_name: String,

    dimension: usize,

    /// Maximum sequence length the model accepts.
    max_length: usize,
}

impl OnnxEmbedding {
    /// Loads all-MiniLM-L6-v2 (384d) from `model_path` or the default cache.
    pub fn new(model_path: Option<PathBuf>) -> Result<Self> {
        Self::with_model(model_path, KNOWN_MODELS[0].name, KNOWN_MODELS[0].dimension)
    }

    /// Loads the named model.
    ///
    /// Known model names must agree with `dimension`. Unknown names require
    /// an explicit `model_path`.
    ///
    /// # Errors
    ///
    /// Returns `RagError::ModelLoad` if the files are missing, cannot be
    /// loaded, the name and dimension disagree, or the model's output does
    /// not have `dimension` columns.
    pub fn with_model(model_path: Option<PathBuf>, model_name: &str, dimension: usize) -> Result<Self> {
        let max_length = match known_model(model_name) {
            Some(spec) if spec.dimension != dimension => {
                return Err(RagError::model_load(format!(
                    "Model '{model_name}' produces {} dimensions, configured {dimension}",
                    spec.dimension
                )));
            }
            Some(spec) => spec.max_length,
            None => FALLBACK_MAX_LENGTH,
        };

        let model_dir = resolve_model_dir(model_path.as_deref(), model_name)?;

        info!(
            model = model_name,
            model_dir = %model_dir.display(),
            dimension,
            max_length,
            "Loading ONNX embedding model"
        );

        let model_file = model_dir.join(MODEL_FILENAME);
        let tokenizer_file = model_dir.join(TOKENIZER_FILENAME);
        if !model_file.exists() {
            return Err(RagError::model_load(format!(
                "Model file not found: {}. \
                 Download with OnnxEmbedding::download_model(\"{model_name}\") \
                 or provide a directory containing '{MODEL_FILENAME}'",
                model_file.display()
            )));
        }
        if !tokenizer_file.exists() {
            return Err(RagError::model_load(format!(
                "Tokenizer file not found: {}. \
                 The model directory must contain '{TOKENIZER_FILENAME}'",
                tokenizer_file.display()
            )));
        }

        let session = create_session(&model_file)?;
        let tokenizer = load_tokenizer(&tokenizer_file, max_length)?;

        let service = Self {
            session: Mutex::new(session),
            tokenizer,
            model_name: model_name.to_string(),
            dimension,
            max_length,
        };

        // A model whose output width differs from `dimension` fails here,
        // not on the first query
        service.embed(WARMUP_TEXT).map_err(|e| {
            RagError::model_load(format!("Model '{model_name}' failed its warm-up embedding: {e}"))
        })?;

        debug!(dimension, max_length, "ONNX embedding model loaded");
        Ok(service)
    }

    /// Downloads a known model's files into the cache directory.
    ///
    /// Returns the model directory. Existing files are not re-downloaded.
    pub fn download_model(model_name: &str) -> Result<PathBuf> {
        let spec = known_model(model_name).ok_or_else(|| {
            RagError::model_load(format!(
                "No download source for '{model_name}'. Supported: {}",
                KNOWN_MODELS.map(|m| m.name).join(", ")
            ))
        })?;

        let cache_dir = default_cache_dir(spec.name);
        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            RagError::model_load(format!(
                "Failed to create model cache directory {}: {e}",
                cache_dir.display()
            ))
        })?;

        for (url, file) in [
            (spec.model_url, MODEL_FILENAME),
            (spec.tokenizer_url, TOKENIZER_FILENAME),
        ] {
            let dest = cache_dir.join(file);
            if !dest.exists() {
                info!(url, dest = %dest.display(), "Downloading model file");
                download_file(url, &dest)?;
            }
        }

        info!(dir = %cache_dir.display(), "Model files ready");
        Ok(cache_dir)
    }

    fn encode(&self, text: &str) -> Result<Encoding> {
        ensure_embeddable(text)?;
        self.tokenizer
            .encode(text, true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {e}")))
    }

    /// Runs one padded inference over already-tokenized texts.
    fn run_batch(&self, encodings: &[Encoding]) -> Result<Vec<Embedding>> {
        let batch_size = encodings.len();
        // Pad to the longest sequence in the batch, not max_length
        let max_len = encodings
            .iter()
            .map(|enc| enc.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(0);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let token_type_ids = vec![0i64; batch_size * max_len];

        for (i, enc) in encodings.iter().enumerate() {
            let ids = enc.get_ids();
            let mask = enc.get_attention_mask();
            let len = ids.len().min(self.max_length);
            for j in 0..len {
                input_ids[i * max_len + j] = i64::from(ids[j]);
                attention_mask[i * max_len + j] = i64::from(mask[j]);
            }
        }

        let shape = (batch_size, max_len);
        let tensor = |data: Vec<i64>| -> Result<_> {
            let array = Array2::from_shape_vec(shape, data)
                .map_err(|e| RagError::embedding(format!("Tensor shape error: {e}")))?;
            ort::value::Tensor::from_array(array)
                .map_err(|e| RagError::embedding(format!("Tensor creation failed: {e}")))
        };
        let ids_tensor = tensor(input_ids)?;
        let mask_tensor = tensor(attention_mask.clone())?;
        let type_tensor = tensor(token_type_ids)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| inference_error("Session lock poisoned", e))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
            .map_err(|e| inference_error("ONNX inference failed", e))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| inference_error("Output extraction failed", e))?;
        let shape: Vec<i64> = shape.iter().copied().collect();
        check_output_shape(&shape, data.len(), batch_size, max_len, self.dimension)?;

        let mut results = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let text_mask: Vec<u32> = attention_mask[i * max_len..(i + 1) * max_len]
                .iter()
                .map(|&x| x as u32)
                .collect();
            let offset = i * max_len * self.dimension;
            let text_data = &data[offset..offset + max_len * self.dimension];

            let pooled = mean_pool_raw(text_data, &text_mask, self.dimension, max_len);
            results.push(l2_normalize(&pooled));
        }

        Ok(results)
    }
}

impl EmbeddingService for OnnxEmbedding {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let encoding = self.encode(text)?;
        self.run_batch(std::slice::from_ref(&encoding))?
            .pop()
            .ok_or_else(|| RagError::embedding("Model returned no embedding"))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Option<Embedding>>> {
        // Tokenize first so malformed inputs drop out before inference
        let mut slots: Vec<Option<Embedding>> = vec![None; texts.len()];
        let mut accepted = Vec::with_capacity(texts.len());
        let mut encodings = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            match self.encode(text) {
                Ok(encoding) => {
                    accepted.push(index);
                    encodings.push(encoding);
                }
                Err(RagError::Embedding(reason)) => {
                    warn!(index, %reason, "Skipping input that could not be embedded");
                }
                Err(e) => return Err(e),
            }
        }

        if encodings.is_empty() {
            return Ok(slots);
        }

        for (index, embedding) in accepted.into_iter().zip(self.run_batch(&encodings)?) {
            slots[index] = Some(embedding);
        }
        Ok(slots)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Creates an ONNX Runtime session with optimized settings.
fn create_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| RagError::model_load(format!("Failed to create session builder: {e}")))?
        // Level3: all optimizations (operator fusion, constant folding, etc.)
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| RagError::model_load(format!("Failed to set optimization level: {e}")))?
        .commit_from_file(model_path)
        .map_err(|e| {
            RagError::model_load(format!(
                "Failed to load ONNX model from {}: {e}",
                model_path.display()
            ))
        })
}

/// Loads a HuggingFace tokenizer from a tokenizer.json file.
fn load_tokenizer(tokenizer_path: &Path, max_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
        RagError::model_load(format!(
            "Failed to load tokenizer from {}: {e}",
            tokenizer_path.display()
        ))
    })?;

    tokenizer
        .with_truncation(Some(tokenizers::TruncationParams {
            max_length,
            strategy: tokenizers::TruncationStrategy::LongestFirst,
            ..Default::default()
        }))
        .map_err(|e| RagError::model_load(format!("Failed to set truncation: {e}")))?;

    // Padding is done per batch in run_batch()
    tokenizer.with_padding(None);

    Ok(tokenizer)
}

/// Resolves the model directory from an optional user path or default cache.
fn resolve_model_dir(model_path: Option<&Path>, model_name: &str) -> Result<PathBuf> {
    match model_path {
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        Some(path) => Err(RagError::model_load(format!(
            "Model directory not found: {}",
            path.display()
        ))),
        None => {
            if known_model(model_name).is_none() {
                return Err(RagError::model_load(format!(
                    "No default location for model '{model_name}'. \
                     Provide a model_path, or use one of: {}",
                    KNOWN_MODELS.map(|m| m.name).join(", ")
                )));
            }

            let cache_dir = default_cache_dir(model_name);
            if !cache_dir.join(MODEL_FILENAME).exists() {
                return Err(RagError::model_load(format!(
                    "Model not found at {}. \
                     Download with: OnnxEmbedding::download_model(\"{model_name}\")",
                    cache_dir.display()
                )));
            }
            Ok(cache_dir)
        }
    }
}

/// Returns the default cache directory for a model.
///
/// Platform-specific:
/// - Linux: `~/.cache/ragfolio/models/{name}/`
/// - macOS: `~/Library/Caches/ragfolio/models/{name}/`
/// - Windows: `{LOCALAPPDATA}/ragfolio/models/{name}/`
fn default_cache_dir(model_name: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("ragfolio")
        .join("models")
        .join(model_name)
}

/// A per-request failure: the input is skipped or the query rejected, and
/// the service stays up.
fn inference_error(stage: &str, e: impl std::fmt::Display) -> RagError {
    RagError::embedding(format!("{stage}: {e}"))
}

/// Requires a `[batch_size, seq_len, dimension]` output backed by exactly
/// that many values.
///
/// A mismatch means the model does not produce the configured dimension,
/// which no amount of retrying fixes, so it is a `ModelLoad` error.
fn check_output_shape(
    shape: &[i64],
    data_len: usize,
    batch_size: usize,
    seq_len: usize,
    dimension: usize,
) -> Result<()> {
    let expected = [batch_size, seq_len, dimension].map(|d| d as i64);
    if shape != expected || data_len != batch_size * seq_len * dimension {
        return Err(RagError::model_load(format!(
            "Model output has shape {shape:?} ({data_len} values), expected {expected:?}"
        )));
    }
    Ok(())
}

/// Attention-weighted mean of token embeddings laid out as `[seq_len * dim]`.
fn mean_pool_raw(data: &[f32], attention_mask: &[u32], dim: usize, seq_len: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut mask_sum = 0.0f32;

    for (t, &mask_val) in attention_mask.iter().enumerate().take(seq_len) {
        let weight = mask_val as f32;
        mask_sum += weight;
        let token = &data[t * dim..(t + 1) * dim];
        for (acc, &value) in pooled.iter_mut().zip(token) {
            *acc += value * weight;
        }
    }

    if mask_sum > 0.0 {
        for val in &mut pooled {
            *val /= mask_sum;
        }
    }

    pooled
}

/// L2 normalizes a vector to unit length; zero vectors are returned unchanged.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Downloads a file from a URL to a local path.
fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| RagError::model_load(format!("Download failed for {url}: {e}")))?;

    let mut reader = response.into_body().into_reader();
    let mut file = std::fs::File::create(dest).map_err(|e| {
        RagError::model_load(format!("Failed to create file {}: {e}", dest.display()))
    })?;

    std::io::copy(&mut reader, &mut file).map_err(|e| {
        RagError::model_load(format!("Failed to write to {}: {e}", dest.display()))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_basic() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mean_pool_partial_mask() {
        let data = vec![
            1.0, 2.0, 3.0, // real token
            99.0, 99.0, 99.0, // padding
        ];
        let pooled = mean_pool_raw(&data, &[1, 0], 3, 2);
        assert_eq!(pooled, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_uniform_mask() {
        let data = vec![1.0, 2.0, 3.0, 5.0, 6.0, 7.0];
        let pooled = mean_pool_raw(&data, &[1, 1], 3, 2);
        assert_eq!(pooled, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_inference_failure_is_not_startup_fatal() {
        let err = inference_error("ONNX inference failed", "bad input");
        assert!(err.is_embedding());
        assert!(!err.is_startup_fatal());
        assert!(err.to_string().contains("bad input"));
    }

    #[test]
    fn test_output_shape_accepts_configured_dimension() {
        assert!(check_output_shape(&[2, 5, 384], 2 * 5 * 384, 2, 5, 384).is_ok());
    }

    #[test]
    fn test_output_shape_rejects_narrower_model() {
        // A 256-wide model configured as 384 must not be sliced out of bounds
        let err = check_output_shape(&[1, 7, 256], 7 * 256, 1, 7, 384).unwrap_err();
        assert!(err.is_startup_fatal());
        assert!(err.to_string().contains("256"), "Error: {err}");
    }

    #[test]
    fn test_output_shape_rejects_wider_model() {
        let err = check_output_shape(&[1, 7, 768], 7 * 768, 1, 7, 384).unwrap_err();
        assert!(matches!(err, RagError::ModelLoad(_)));
    }

    #[test]
    fn test_output_shape_rejects_short_buffer() {
        assert!(check_output_shape(&[1, 7, 384], 100, 1, 7, 384).is_err());
    }

    #[test]
    fn test_known_model_lookup() {
        assert_eq!(known_model("all-MiniLM-L6-v2").map(|m| m.dimension), Some(384));
        assert_eq!(known_model("bge-base-en-v1.5").map(|m| m.dimension), Some(768));
        assert!(known_model("gpt-embed").is_none());
    }

    #[test]
    fn test_name_dimension_disagreement_rejected() {
        let result = OnnxEmbedding::with_model(None, "all-MiniLM-L6-v2", 768);
        assert!(matches!(result, Err(RagError::ModelLoad(_))));
    }

    #[test]
    fn test_resolve_model_dir_custom_path_missing() {
        let err = resolve_model_dir(Some(Path::new("/nonexistent/path")), "x")
            .unwrap_err()
            .to_string();
        assert!(err.contains("not found"), "Error: {err}");
    }

    #[test]
    fn test_resolve_model_dir_unknown_model() {
        let err = resolve_model_dir(None, "mystery-model").unwrap_err().to_string();
        assert!(err.contains("No default location"), "Error: {err}");
    }

    #[test]
    fn test_default_cache_dir_format() {
        let path_str = default_cache_dir("test-model").to_string_lossy().into_owned();
        assert!(path_str.contains("ragfolio"), "Path: {path_str}");
        assert!(path_str.ends_with("test-model"), "Path: {path_str}");
    }

    #[test]
    fn test_onnx_embedding_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OnnxEmbedding>();
    }
}
