//! Integration tests for the persistent vector store.
//!
//! These tests verify the end-to-end behavior of:
//! - Building, persisting and reloading an index
//! - Ranking guarantees (self-similarity, ordering, `top_k` bounds)
//! - Corrupt or incompatible artifacts being rejected on load

use std::fs;
use std::sync::Arc;

use proptest::prelude::*;
use ragfolio::store::{METADATA_FILE, VECTORS_FILE};
use ragfolio::{
    Config, Document, DocumentId, Embedding, EmbeddingService, HashingEmbedding, IndexKind,
    IndexState, Position, RagError, VectorStore,
};
use tempfile::tempdir;

const CORPUS: &[&str] = &[
    "I study Computer Science at the university.",
    "I enjoy competitive programming and algorithm puzzles.",
    "My favourite language for systems work is Rust.",
    "On weekends I go hiking in the mountains.",
    "I built a search engine for my course notes.",
    "I have a cat called Pixel who sleeps on my keyboard.",
];

fn documents(texts: &[&str]) -> Vec<Document> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Document::new(DocumentId(i as u64 + 1), *text))
        .collect()
}

fn hashing(dimension: usize) -> Arc<dyn EmbeddingService> {
    Arc::new(HashingEmbedding::new(dimension))
}

fn built_store(kind: IndexKind) -> VectorStore {
    let config = Config {
        index_kind: kind,
        ..Default::default()
    };
    let mut store = VectorStore::new(hashing(384), &config);
    store.build(&documents(CORPUS)).unwrap();
    store
}

/// Same vectors as the hashing embedder, reported under another model name.
struct RenamedEmbedding(HashingEmbedding);

impl EmbeddingService for RenamedEmbedding {
    fn embed(&self, text: &str) -> ragfolio::Result<Embedding> {
        self.0.embed(text)
    }

    fn dimension(&self) -> usize {
        self.0.dimension()
    }

    fn model_name(&self) -> &str {
        "some-other-model"
    }
}

// ============================================================================
// Build and Query Tests
// ============================================================================

#[test]
fn test_unbuilt_store_is_not_ready() {
    let store = VectorStore::new(hashing(384), &Config::default());
    assert_eq!(store.state(), IndexState::Unbuilt);
    assert!(store.query("anything", 3).unwrap_err().is_not_ready());
}

#[test]
fn test_build_assigns_dense_positions() {
    let store = built_store(IndexKind::Flat);
    assert_eq!(store.state(), IndexState::Built);
    assert_eq!(store.len(), CORPUS.len());
    for (i, entry) in store.entries().iter().enumerate() {
        assert_eq!(entry.position, Position(i));
        assert_eq!(entry.text(), CORPUS[i]);
    }
}

#[test]
fn test_build_empty_corpus() {
    let mut store = VectorStore::new(hashing(384), &Config::default());
    let err = store.build(&[]).unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus));
    assert_eq!(store.state(), IndexState::Unbuilt);
}

#[test]
fn test_build_skips_unembeddable_documents() {
    let mut store = VectorStore::new(hashing(384), &Config::default());
    store
        .build(&documents(&["I study Computer Science.", "   ", "I like Rust."]))
        .unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(store.entries()[1].position, Position(1));
    assert_eq!(store.entries()[1].document_id, DocumentId(3));
}

#[test]
fn test_build_all_unembeddable_is_empty_corpus() {
    let mut store = VectorStore::new(hashing(384), &Config::default());
    let err = store.build(&documents(&["", " \n\t"])).unwrap_err();
    assert!(matches!(err, RagError::EmptyCorpus));
}

#[test]
fn test_self_similarity_flat_and_hnsw() {
    for kind in [IndexKind::Flat, IndexKind::Hnsw] {
        let store = built_store(kind);
        for (i, text) in CORPUS.iter().enumerate() {
            let results = store.query(text, 1).unwrap();
            assert_eq!(results[0].position, Position(i), "{kind}: {text}");
            assert!(results[0].distance.abs() < 1e-5);
        }
    }
}

#[test]
fn test_query_respects_top_k() {
    let store = built_store(IndexKind::Flat);

    assert_eq!(store.query("Rust programming", 3).unwrap().len(), 3);
    assert_eq!(store.query("Rust programming", 100).unwrap().len(), CORPUS.len());

    let err = store.query("Rust programming", 0).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_query_empty_text_is_embedding_error() {
    let store = built_store(IndexKind::Flat);
    assert!(store.query("   ", 3).unwrap_err().is_embedding());
}

#[test]
fn test_duplicate_documents_tie_by_position() {
    let mut store = VectorStore::new(hashing(384), &Config::default());
    store
        .build(&documents(&["same words here", "unrelated text", "same words here"]))
        .unwrap();

    let results = store.query("same words here", 2).unwrap();
    assert_eq!(results[0].position, Position(0));
    assert_eq!(results[1].position, Position(2));
    assert_eq!(results[0].distance, results[1].distance);
}

#[test]
fn test_query_is_deterministic() {
    let store = built_store(IndexKind::Flat);
    let first = store.query("hiking and algorithms", 4).unwrap();
    for _ in 0..5 {
        assert_eq!(store.query("hiking and algorithms", 4).unwrap(), first);
    }
}

#[test]
fn test_attributes_survive_into_results() {
    let mut store = VectorStore::new(hashing(384), &Config::default());
    store
        .build(&[Document::new(DocumentId(7), "I study Computer Science.")
            .with_attribute("source", "about.md")])
        .unwrap();

    let results = store.query("Computer Science", 1).unwrap();
    assert_eq!(results[0].metadata["source"], "about.md");
    assert_eq!(results[0].text(), "I study Computer Science.");
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[test]
fn test_persist_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");

    let mut store = built_store(IndexKind::Flat);
    store.persist(&path).unwrap();
    assert_eq!(store.state(), IndexState::Persisted);
    assert!(path.join(VECTORS_FILE).is_file());
    assert!(path.join(METADATA_FILE).is_file());

    let mut loaded = VectorStore::new(hashing(384), &Config::default());
    loaded.load(&path).unwrap();
    assert_eq!(loaded.state(), IndexState::Loaded);
    assert_eq!(loaded.len(), store.len());
    assert_eq!(loaded.build_id(), store.build_id());
    assert_eq!(loaded.entries(), store.entries());

    let query = "What do you study?";
    assert_eq!(loaded.query(query, 3).unwrap(), store.query(query, 3).unwrap());
}

#[test]
fn test_persist_replaces_previous_build() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");

    let mut first = built_store(IndexKind::Flat);
    first.persist(&path).unwrap();

    let mut second = VectorStore::new(hashing(384), &Config::default());
    second.build(&documents(&["only one passage now"])).unwrap();
    second.persist(&path).unwrap();

    let mut loaded = VectorStore::new(hashing(384), &Config::default());
    loaded.load(&path).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.build_id(), second.build_id());

    // No staging or backup directories are left next to the index
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name != "index" && name != "index.lock")
        .collect();
    assert!(leftovers.is_empty(), "unexpected entries: {leftovers:?}");
}

#[test]
fn test_persist_unbuilt_is_not_ready() {
    let dir = tempdir().unwrap();
    let mut store = VectorStore::new(hashing(384), &Config::default());
    assert!(store.persist(&dir.path().join("index")).unwrap_err().is_not_ready());
}

#[test]
fn test_load_with_other_index_kind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");
    built_store(IndexKind::Flat).persist(&path).unwrap();

    let config = Config {
        index_kind: IndexKind::Hnsw,
        ..Default::default()
    };
    let mut loaded = VectorStore::new(hashing(384), &config);
    loaded.load(&path).unwrap();
    assert_eq!(loaded.index_kind(), IndexKind::Hnsw);
    assert_eq!(loaded.query(CORPUS[2], 1).unwrap()[0].position, Position(2));
}

#[test]
fn test_load_missing_directory() {
    let dir = tempdir().unwrap();
    let mut store = VectorStore::new(hashing(384), &Config::default());
    let err = store.load(&dir.path().join("nope")).unwrap_err();
    assert!(err.is_corrupt_index());
    assert_eq!(store.state(), IndexState::Unbuilt);
}

#[test]
fn test_load_partial_artifacts() {
    for missing in [VECTORS_FILE, METADATA_FILE] {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        built_store(IndexKind::Flat).persist(&path).unwrap();
        fs::remove_file(path.join(missing)).unwrap();

        let mut store = VectorStore::new(hashing(384), &Config::default());
        let err = store.load(&path).unwrap_err();
        assert!(err.is_corrupt_index(), "missing {missing}: {err}");
    }
}

#[test]
fn test_load_truncated_vectors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");
    built_store(IndexKind::Flat).persist(&path).unwrap();

    let bytes = fs::read(path.join(VECTORS_FILE)).unwrap();
    fs::write(path.join(VECTORS_FILE), &bytes[..bytes.len() / 2]).unwrap();

    let mut store = VectorStore::new(hashing(384), &Config::default());
    assert!(store.load(&path).unwrap_err().is_corrupt_index());
}

#[test]
fn test_load_artifacts_from_different_builds() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    built_store(IndexKind::Flat).persist(&a).unwrap();
    built_store(IndexKind::Flat).persist(&b).unwrap();

    fs::copy(b.join(METADATA_FILE), a.join(METADATA_FILE)).unwrap();

    let mut store = VectorStore::new(hashing(384), &Config::default());
    assert!(store.load(&a).unwrap_err().is_corrupt_index());
}

#[test]
fn test_load_dimension_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");
    built_store(IndexKind::Flat).persist(&path).unwrap();

    let mut store = VectorStore::new(hashing(768), &Config::default());
    let err = store.load(&path).unwrap_err();
    assert!(err.is_corrupt_index());
    assert!(err.to_string().contains("384"));
}

#[test]
fn test_load_model_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index");
    built_store(IndexKind::Flat).persist(&path).unwrap();

    let embedder = Arc::new(RenamedEmbedding(HashingEmbedding::new(384)));
    let mut store = VectorStore::new(embedder, &Config::default());
    assert!(store.load(&path).unwrap_err().is_corrupt_index());
}

#[test]
fn test_colliding_tokens_are_indexed_and_queryable() {
    // "what" and "who" hash to the same bucket at 384 dimensions
    let documents = vec![
        Document::new(DocumentId(1), "I study Computer Science."),
        Document::new(DocumentId(2), "what who"),
    ];
    let mut store = VectorStore::new(hashing(384), &Config::default());
    store.build(&documents).unwrap();
    assert_eq!(store.len(), 2);

    let results = store.query("what who", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].position, Position(1));
    assert!(results[0].distance.abs() < 1e-5);
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_results_are_ranked_and_bounded(
        words in prop::collection::vec("[a-z]{2,8}", 1..6),
        top_k in 1usize..10,
    ) {
        let store = built_store(IndexKind::Flat);
        let query = words.join(" ");
        let results = store.query(&query, top_k).unwrap();

        prop_assert_eq!(results.len(), top_k.min(CORPUS.len()));
        for pair in results.windows(2) {
            prop_assert!(
                pair[0].distance < pair[1].distance
                    || (pair[0].distance == pair[1].distance
                        && pair[0].position < pair[1].position)
            );
        }
        for result in &results {
            prop_assert!((-1e-5..=2.0 + 1e-5).contains(&result.distance));
        }
    }
}
