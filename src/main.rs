//! # docqa CLI
//!
//! Command-line front end for the document retrieval core.
//!
//! ## Usage
//!
//! ```bash
//! docqa [--config ./docqa.toml] [--verbose] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ingest <file> --session <id>` | Extract, chunk, embed and store a document |
//! | `docqa search "<query>" --session <id>` | Top-k chunks for a query |
//! | `docqa info --session <id>` | Print the session descriptor |
//! | `docqa delete --session <id>` | Remove a session's index |
//! | `docqa chunk <file>` | Extract and chunk without embedding |
//!
//! Without `--config` the built-in defaults apply; the environment
//! variables `CHUNK_SIZE_TOKENS`, `CHUNK_OVERLAP_TOKENS`,
//! `OCR_MIN_TEXT_THRESHOLD`, `MAX_FILE_SIZE_MB`, `EMBEDDING_MODEL` and
//! `EMBEDDINGS_FOLDER` override either.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::chunk::Chunker;
use docqa::config::{self, Config};
use docqa::embedding::DisabledProvider;
use docqa::extract::Extractor;
use docqa::ingest::Pipeline;
use docqa::models::{Document, DocumentType};
use docqa::store::fs::FsSessionStore;
use docqa::vector_store::VectorIndex;

/// docqa: extract, chunk, embed and search uploaded documents.
#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging for this crate.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a document into a session, replacing any previous index.
    Ingest {
        file: PathBuf,

        /// Session id; a new UUID is generated when omitted.
        #[arg(long)]
        session: Option<String>,

        /// Declared type (pdf, docx, doc, txt); inferred from the extension by default.
        #[arg(long = "type")]
        doc_type: Option<String>,
    },

    /// Search a session's index.
    Search {
        query: String,

        #[arg(long)]
        session: String,

        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(short)]
        k: Option<usize>,

        /// Print hits as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the stored descriptor for a session.
    Info {
        #[arg(long)]
        session: String,
    },

    /// Delete a session's index.
    Delete {
        #[arg(long)]
        session: String,
    },

    /// Extract and chunk a file, printing the chunks. No embedding calls.
    Chunk {
        file: PathBuf,

        #[arg(long = "type")]
        doc_type: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "docqa=debug" } else { "docqa=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Index over the configured storage root that never calls an embedding API.
fn storage_only_index(cfg: &Config) -> VectorIndex {
    VectorIndex::new(
        Arc::new(FsSessionStore::new(&cfg.storage.root)),
        Arc::new(DisabledProvider),
        cfg.embedding.batch_size,
    )
}

async fn load_document(session_id: &str, file: &Path, doc_type: Option<&str>) -> Result<Document> {
    let declared = doc_type.map(str::parse::<DocumentType>).transpose()?;
    Document::from_path(session_id, file, declared).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::default_config()?,
    };

    match cli.command {
        Commands::Ingest {
            file,
            session,
            doc_type,
        } => {
            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let doc = load_document(&session_id, &file, doc_type.as_deref()).await?;
            let pipeline = Pipeline::from_config(&cfg)?;
            let report = pipeline.ingest(&doc).await?;

            println!("ingest {}", doc.file_name);
            println!("  session: {}", report.descriptor.session_id);
            println!("  size: {:.2} MB", doc.size_mb());
            println!("  characters extracted: {}", report.chars_extracted);
            println!("  chunks: {}", report.descriptor.num_chunks);
            println!("  tokens: {}", report.total_tokens);
            println!(
                "  embedding: {} ({} dims)",
                report.descriptor.embedding_model, report.descriptor.index_dimension
            );
            println!("ok");
        }
        Commands::Search {
            query,
            session,
            k,
            json,
        } => {
            let index = VectorIndex::from_config(&cfg)?;
            let k = k.unwrap_or(cfg.retrieval.top_k);
            let hits = index.search(&query, &session, k).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No results.");
            } else {
                for hit in &hits {
                    println!(
                        "{}. [{:.3}] chunk {} ({} tokens)",
                        hit.rank, hit.similarity_score, hit.chunk.chunk_id, hit.chunk.token_count
                    );
                    println!("    {}", snippet(&hit.chunk.text, 240));
                }
            }
        }
        Commands::Info { session } => match storage_only_index(&cfg).session_info(&session).await {
            Some(descriptor) => println!("{}", serde_json::to_string_pretty(&descriptor)?),
            None => {
                println!("No index for session {}.", session);
                std::process::exit(1);
            }
        },
        Commands::Delete { session } => {
            if storage_only_index(&cfg).delete_session(&session).await {
                println!("Deleted session {}.", session);
            } else {
                println!("Nothing to delete for session {}.", session);
            }
        }
        Commands::Chunk { file, doc_type } => {
            let doc = load_document("local", &file, doc_type.as_deref()).await?;
            let extractor = Extractor::from_config(&cfg.extraction);
            let chunker = Chunker::from_config(&cfg.chunking)?;
            let bytes = doc.bytes;
            let declared = doc.declared_type;
            let text = tokio::task::spawn_blocking(move || extractor.extract_text(&bytes, declared))
                .await??;
            let chunks = chunker.chunk(&text);
            for chunk in &chunks {
                println!("--- chunk {} ({} tokens)", chunk.chunk_id, chunk.token_count);
                println!("{}", chunk.text);
            }
            println!("chunk {}", doc.file_name);
            println!("  characters extracted: {}", text.chars().count());
            println!("  chunks: {}", chunks.len());
            println!(
                "  tokens: {}",
                chunks.iter().map(|c| c.token_count).sum::<usize>()
            );
        }
    }

    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
