//! Corpus ingestion: turning raw files into [`Document`]s.
//!
//! A [`DocumentSource`] supplies the documents an index is built from.
//!
//! - [`InMemorySource`] - a fixed list, for tests and embedding callers
//! - [`DirectorySource`] - walks a data directory:
//!   - `.txt` / `.md` files are split into overlapping chunks
//!   - `.jsonl` files yield one document per line, `{"text": .., "attributes": {..}}`
//!
//! Every document records its `source` file; chunked text also records its
//! `chunk` number. Document ids count up from 1 in ingestion order.

mod chunker;

pub use chunker::chunk_text;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::config::ChunkConfig;
use crate::error::{RagError, Result};
use crate::types::{Attributes, Document, DocumentId};

/// Attribute naming the file a document came from (relative to the root).
pub const SOURCE_ATTRIBUTE: &str = "source";

/// Attribute holding a chunk's 0-based index within its file.
pub const CHUNK_ATTRIBUTE: &str = "chunk";

/// Supplies the documents to index.
pub trait DocumentSource: Send + Sync {
    /// Produces the full corpus, in ingestion order.
    fn load(&self) -> Result<Vec<Document>>;
}

/// A fixed, in-memory corpus.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    documents: Vec<Document>,
}

impl InMemorySource {
    /// Wraps already-built documents.
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Builds documents from plain texts, with ids 1, 2, ...
    ///
    /// ```rust
    /// use ragfolio::ingest::{DocumentSource, InMemorySource};
    ///
    /// let source = InMemorySource::from_texts(["first", "second"]);
    /// let docs = source.load().unwrap();
    /// assert_eq!(docs[1].id.0, 2);
    /// ```
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids = IdSequence::default();
        Self {
            documents: texts
                .into_iter()
                .map(|text| Document::new(ids.next_id(), text))
                .collect(),
        }
    }
}

impl DocumentSource for InMemorySource {
    fn load(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

/// Reads a corpus from a directory tree.
///
/// Files are visited in sorted path order so ids are stable across runs.
/// Files with other extensions are ignored.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
    chunking: ChunkConfig,
}

impl DirectorySource {
    /// Creates a source over `root`.
    pub fn new(root: impl Into<PathBuf>, chunking: ChunkConfig) -> Self {
        Self {
            root: root.into(),
            chunking,
        }
    }

    /// The directory this source reads.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ingest_text(
        &self,
        path: &Path,
        source: &str,
        ids: &mut IdSequence,
        out: &mut Vec<Document>,
    ) -> Result<()> {
        let text = fs::read_to_string(path)
            .map_err(|e| RagError::ingest(format!("failed to read {}: {e}", path.display())))?;

        for (chunk_index, chunk) in chunk_text(&text, &self.chunking).into_iter().enumerate() {
            out.push(
                Document::new(ids.next_id(), chunk)
                    .with_attribute(SOURCE_ATTRIBUTE, source)
                    .with_attribute(CHUNK_ATTRIBUTE, chunk_index.to_string()),
            );
        }
        Ok(())
    }

    fn ingest_jsonl(
        &self,
        path: &Path,
        source: &str,
        ids: &mut IdSequence,
        out: &mut Vec<Document>,
    ) -> Result<()> {
        let text = fs::read_to_string(path)
            .map_err(|e| RagError::ingest(format!("failed to read {}: {e}", path.display())))?;

        for (line_index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: JsonlRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(source, line = line_index + 1, error = %e, "Skipping malformed JSONL record");
                    continue;
                }
            };
            if record.text.trim().is_empty() {
                warn!(source, line = line_index + 1, "Skipping JSONL record with empty text");
                continue;
            }

            let mut document = Document::new(ids.next_id(), record.text);
            document.attributes = record.attributes;
            out.push(document.with_attribute(SOURCE_ATTRIBUTE, source));
        }
        Ok(())
    }
}

impl DocumentSource for DirectorySource {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    fn load(&self) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(RagError::ingest(format!(
                "data directory not found: {}",
                self.root.display()
            )));
        }

        let mut ids = IdSequence::default();
        let mut documents = Vec::new();
        let mut files = 0usize;

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| RagError::ingest(format!("failed to walk corpus: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let source = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);

            match extension.as_deref() {
                Some("txt" | "md") => self.ingest_text(path, &source, &mut ids, &mut documents)?,
                Some("jsonl") => self.ingest_jsonl(path, &source, &mut ids, &mut documents)?,
                _ => continue,
            }
            files += 1;
        }

        info!(files, documents = documents.len(), "Corpus ingested");
        Ok(documents)
    }
}

/// One line of a `.jsonl` corpus file.
#[derive(Deserialize)]
struct JsonlRecord {
    text: String,
    #[serde(default)]
    attributes: Attributes,
}

/// Hands out document ids 1, 2, 3, ...
#[derive(Default)]
struct IdSequence(u64);

impl IdSequence {
    fn next_id(&mut self) -> DocumentId {
        self.0 += 1;
        DocumentId(self.0)
    }
}
