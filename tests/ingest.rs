//! Integration tests for corpus ingestion from a data directory.

use std::fs;
use std::sync::Arc;

use ragfolio::generation::UnconfiguredGeneration;
use ragfolio::ingest::{DirectorySource, DocumentSource, CHUNK_ATTRIBUTE, SOURCE_ATTRIBUTE};
use ragfolio::{ChunkConfig, Config, DocumentId, HashingEmbedding, Rag, RagError};
use tempfile::tempdir;

#[test]
fn test_reads_text_markdown_and_jsonl() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a_about.txt"), "I study Computer Science.").unwrap();
    fs::write(dir.path().join("b_hobbies.md"), "# Hobbies\n\nI play chess.").unwrap();
    fs::write(
        dir.path().join("c_facts.jsonl"),
        concat!(
            r#"{"text": "I was born in Porto.", "attributes": {"topic": "bio"}}"#,
            "\n\n",
            "not json at all\n",
            r#"{"text": "   "}"#,
            "\n",
            r#"{"text": "I speak three languages."}"#,
            "\n",
        ),
    )
    .unwrap();
    fs::write(dir.path().join("ignored.pdf"), "binary-ish").unwrap();

    let source = DirectorySource::new(dir.path(), ChunkConfig::default());
    let docs = source.load().unwrap();

    let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "I study Computer Science.",
            "# Hobbies\n\nI play chess.",
            "I was born in Porto.",
            "I speak three languages.",
        ]
    );

    let ids: Vec<DocumentId> = docs.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![DocumentId(1), DocumentId(2), DocumentId(3), DocumentId(4)]);

    assert_eq!(docs[0].attributes[SOURCE_ATTRIBUTE], "a_about.txt");
    assert_eq!(docs[0].attributes[CHUNK_ATTRIBUTE], "0");
    assert_eq!(docs[2].attributes[SOURCE_ATTRIBUTE], "c_facts.jsonl");
    assert_eq!(docs[2].attributes["topic"], "bio");
}

#[test]
fn test_nested_directories_use_relative_sources() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("projects")).unwrap();
    fs::write(dir.path().join("projects").join("search.txt"), "A search engine.").unwrap();

    let docs = DirectorySource::new(dir.path(), ChunkConfig::default())
        .load()
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].attributes[SOURCE_ATTRIBUTE], "projects/search.txt");
}

#[test]
fn test_long_files_are_chunked() {
    let dir = tempdir().unwrap();
    let text = "word ".repeat(100);
    fs::write(dir.path().join("long.txt"), &text).unwrap();

    let chunking = ChunkConfig {
        chunk_size: 100,
        chunk_overlap: 20,
    };
    let docs = DirectorySource::new(dir.path(), chunking).load().unwrap();

    assert!(docs.len() > 1);
    for (i, doc) in docs.iter().enumerate() {
        assert!(doc.text.chars().count() <= 100);
        assert_eq!(doc.attributes[CHUNK_ATTRIBUTE], i.to_string());
    }
}

#[test]
fn test_missing_data_directory() {
    let dir = tempdir().unwrap();
    let source = DirectorySource::new(dir.path().join("missing"), ChunkConfig::default());
    assert!(matches!(source.load(), Err(RagError::Ingest(_))));
}

#[test]
fn test_open_from_data_directory() {
    let data = tempdir().unwrap();
    fs::write(data.path().join("about.txt"), "I study Computer Science.").unwrap();
    fs::write(data.path().join("music.txt"), "I play the piano in a jazz band.").unwrap();

    let index = tempdir().unwrap();
    let config = Config {
        persist_dir: index.path().join("index"),
        data_dir: data.path().to_path_buf(),
        ..Default::default()
    };
    let source = DirectorySource::new(config.data_dir.clone(), config.chunking);
    let rag = Rag::open(
        config,
        Arc::new(HashingEmbedding::new(384)),
        Arc::new(UnconfiguredGeneration::new("none")),
        &source,
    )
    .unwrap();

    let results = rag.search("piano", 1).unwrap();
    assert_eq!(results[0].text(), "I play the piano in a jazz band.");
    assert_eq!(results[0].metadata[SOURCE_ATTRIBUTE], "music.txt");
}

#[test]
fn test_empty_data_directory_is_empty_corpus() {
    let data = tempdir().unwrap();
    let index = tempdir().unwrap();
    let config = Config {
        persist_dir: index.path().join("index"),
        ..Default::default()
    };

    let err = Rag::open(
        config,
        Arc::new(HashingEmbedding::new(384)),
        Arc::new(UnconfiguredGeneration::new("none")),
        &DirectorySource::new(data.path(), ChunkConfig::default()),
    )
    .err()
    .unwrap();
    assert!(matches!(err, RagError::EmptyCorpus));
}
