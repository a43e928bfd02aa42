//! # citedocs CLI
//!
//! The `citedocs` binary drives the document question-answering service.
//! It provides commands for database initialization, document ingestion,
//! one-shot queries, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! citedocs --config ./citedocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `citedocs init` | Create the SQLite database and run schema migrations |
//! | `citedocs ingest <path>` | Extract, chunk, embed, and index a local file |
//! | `citedocs query "<text>"` | Ask a question over the indexed documents |
//! | `citedocs documents` | List indexed documents and their status |
//! | `citedocs serve` | Start the HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use citedocs::config;
use citedocs::extract::mime_for_filename;
use citedocs::pipeline::{Pipeline, QueryOutcome};
use citedocs::server;
use citedocs::store::Store;

/// citedocs — document question answering with citations.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `citedocs.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "citedocs",
    about = "citedocs — document question answering with citations",
    version,
    long_about = "citedocs ingests text, PDF, and DOCX documents, chunks and embeds them, \
    and answers questions from the indexed content with citations back to the source chunks. \
    Exposes both a CLI and a JSON HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./citedocs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, chunk_vectors). Idempotent.
    Init,

    /// Ingest a local file.
    ///
    /// Extracts text, chunks it, generates embeddings, and stores
    /// everything durably before publishing to the vector index.
    /// The format is inferred from the file extension.
    Ingest {
        /// Path to a .txt, .md, .pdf, or .docx file.
        path: PathBuf,
    },

    /// Ask a question over the indexed documents.
    ///
    /// Prints the generated answer followed by its citations.
    Query {
        /// The question text.
        text: String,

        /// Number of chunks to retrieve as context.
        #[arg(long)]
        k: Option<usize>,
    },

    /// List indexed documents with status and chunk counts.
    Documents,

    /// Start the HTTP server.
    ///
    /// Serves upload, query, document listing, and health endpoints on
    /// the configured bind address.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("citedocs=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = Store::open(&cfg.db.path).await?;
            store.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest { path } => {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.to_string())
                .ok_or_else(|| anyhow::anyhow!("invalid file path: {}", path.display()))?;
            let mime = mime_for_filename(&filename).ok_or_else(|| {
                anyhow::anyhow!("unsupported document format: {}", filename)
            })?;
            let bytes = std::fs::read(&path)?;

            let pipeline = Pipeline::from_config(&cfg).await?;
            let report = pipeline.ingest(&filename, mime, &bytes).await?;
            pipeline.shutdown().await;

            println!("Ingested {}", report.filename);
            println!("  id:     {}", report.document_id);
            println!("  chars:  {}", report.char_count);
            println!("  chunks: {}", report.chunks);
        }
        Commands::Query { text, k } => {
            let pipeline = Pipeline::from_config(&cfg).await?;
            let outcome = pipeline.query(&text, k, None).await?;
            pipeline.shutdown().await;

            match outcome {
                QueryOutcome::Answered(answer) => {
                    println!("{}", answer.text);
                    if !answer.citations.is_empty() {
                        println!();
                        println!("Citations:");
                        for c in &answer.citations {
                            println!(
                                "  {} (chunk {}, score {:.3})",
                                c.filename, c.chunk_index, c.score
                            );
                        }
                    }
                }
                QueryOutcome::NoDocuments => {
                    println!("No documents indexed. Ingest a document first.");
                }
                QueryOutcome::NothingRelevant => {
                    println!("No relevant information found in the indexed documents.");
                }
            }
        }
        Commands::Documents => {
            let pipeline = Pipeline::from_config(&cfg).await?;
            let docs = pipeline.list_documents().await?;
            pipeline.shutdown().await;

            if docs.is_empty() {
                println!("No documents.");
            } else {
                println!("{:<38} {:>8} {:>8}  {:<10} FILENAME", "ID", "CHARS", "CHUNKS", "STATUS");
                for d in &docs {
                    println!(
                        "{:<38} {:>8} {:>8}  {:<10} {}",
                        d.id,
                        d.char_count,
                        d.chunk_count,
                        d.status.as_str(),
                        d.filename
                    );
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
