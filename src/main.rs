//! `ragfolio` command line: serve the HTTP API, rebuild the index, or query
//! it from the terminal.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ragfolio::embedding::create_embedding_service;
use ragfolio::generation::create_generation_service;
use ragfolio::ingest::{DirectorySource, DocumentSource};
use ragfolio::server::{self, AppState};
use ragfolio::{Config, Rag, VectorStore};

#[derive(Parser)]
#[command(name = "ragfolio", version, about = "Retrieval-augmented answers over a document corpus")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "RAGFOLIO_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "RAGFOLIO_PORT", default_value_t = 5000)]
        port: u16,
    },
    /// Re-read the corpus and replace the persisted index
    Rebuild,
    /// Print ranked passages for a query as JSON
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question using retrieved context
    Ask {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragfolio=info,info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;

    match cli.cmd {
        Cmd::Serve { host, port } => serve(config, &host, port).await,
        Cmd::Rebuild => {
            tokio::task::spawn_blocking(move || rebuild(&config)).await??;
            Ok(())
        }
        Cmd::Search { query, top_k } => {
            let top_k = top_k.unwrap_or(config.default_top_k);
            let rag = tokio::task::spawn_blocking(move || open(config)).await??;
            let results =
                tokio::task::spawn_blocking(move || rag.search(&query, top_k)).await??;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Cmd::Ask { query, top_k } => {
            let top_k = top_k.unwrap_or(config.default_top_k);
            let rag = tokio::task::spawn_blocking(move || open(config)).await??;
            println!("{}", rag.assemble_answer(&query, top_k).await?);
            Ok(())
        }
    }
}

/// Binds first so health checks answer while the index loads.
async fn serve(config: Config, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let state = AppState::new(&config);
    let server_task = tokio::spawn(server::serve(
        listener,
        state.clone(),
        server::shutdown_signal(),
    ));

    match tokio::task::spawn_blocking(move || open(config)).await? {
        Ok(rag) => {
            state.initialize(Arc::new(rag));
            info!("RAG system ready");
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize RAG system");
            server_task.abort();
            return Err(e);
        }
    }

    server_task.await??;
    Ok(())
}

fn open(config: Config) -> Result<Rag> {
    let embedder = create_embedding_service(&config)?;
    let generator = create_generation_service(&config)?;
    let source = DirectorySource::new(config.data_dir.clone(), config.chunking);
    Rag::open(config, embedder, generator, &source).context("failed to initialize RAG system")
}

fn rebuild(config: &Config) -> Result<()> {
    let embedder = create_embedding_service(config)?;
    let source = DirectorySource::new(config.data_dir.clone(), config.chunking);
    let documents = source.load()?;

    let mut store = VectorStore::new(embedder, config);
    store.build(&documents)?;
    store.persist(&config.persist_dir)?;
    info!(entries = store.len(), dir = %config.persist_dir.display(), "Index rebuilt");
    Ok(())
}
