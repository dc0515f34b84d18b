//! Core type definitions: documents, index positions, and query results.
//!
//! The vector table and the metadata side-table of an index are joined by
//! [`Position`]. Every metadata record carries its position explicitly, so
//! alignment between the two tables can be checked rather than assumed.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Embedding vector type.
pub type Embedding = Vec<f32>;

/// String attributes attached to a document.
///
/// A `BTreeMap` keeps serialization order stable across runs.
pub type Attributes = BTreeMap<String, String>;

/// Attribute key under which an entry's passage text is stored.
pub const TEXT_ATTRIBUTE: &str = "text";

/// Document identifier, assigned in ingestion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 0-based insertion position of an entry in the index.
///
/// Positions are dense: an index with `n` entries uses exactly `0..n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub usize);

impl Position {
    /// Returns the position as a plain index.
    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of corpus text to be indexed.
///
/// # Example
/// ```
/// use ragfolio::{Document, DocumentId};
///
/// let doc = Document::new(DocumentId(1), "I study Computer Science.")
///     .with_attribute("source", "about.txt");
/// assert_eq!(doc.attributes["source"], "about.txt");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier.
    pub id: DocumentId,
    /// Passage text.
    pub text: String,
    /// Optional string attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Document {
    /// Creates a document with no attributes.
    pub fn new(id: DocumentId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            attributes: Attributes::new(),
        }
    }

    /// Adds an attribute, replacing any previous value for `key`.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Side-table record for one index entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Join key into the vector table.
    pub position: Position,
    /// Document this entry was built from.
    pub document_id: DocumentId,
    /// Document attributes plus the passage text under `"text"`.
    pub attributes: Attributes,
}

impl EntryMetadata {
    /// Builds the record for `document` stored at `position`.
    ///
    /// The document text always wins over a `"text"` attribute.
    pub fn from_document(position: Position, document: &Document) -> Self {
        let mut attributes = document.attributes.clone();
        attributes.insert(TEXT_ATTRIBUTE.to_string(), document.text.clone());
        Self {
            position,
            document_id: document.id,
            attributes,
        }
    }

    /// Returns the passage text, or `""` when absent.
    pub fn text(&self) -> &str {
        self.attributes
            .get(TEXT_ATTRIBUTE)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// One ranked nearest-neighbor hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Position of the matching entry.
    pub position: Position,
    /// Cosine distance to the query (0.0 = identical, smaller = more similar).
    pub distance: f32,
    /// Attributes of the matching entry.
    pub metadata: Attributes,
}

impl QueryResult {
    /// Returns the passage text, or `""` when absent.
    pub fn text(&self) -> &str {
        self.metadata
            .get(TEXT_ATTRIBUTE)
            .map(String::as_str)
            .unwrap_or("")
    }
}
