use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use symrag::embedder::openai::OpenAiEmbedder;
use symrag::{build_index, load_records, ChunkerConfig, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "symrag-indexer",
    about = "Build a searchable vector index from a scraped forum-records JSON dump"
)]
struct IndexerCli {
    /// Path to the records JSON file (array of forum post objects)
    #[arg(long, env = "SYMRAG_INPUT", default_value = "forum_records.json")]
    input: PathBuf,

    /// Destination for the index snapshot
    #[arg(long, env = "SYMRAG_INDEX", default_value = "symrag_index.json")]
    output: PathBuf,

    /// Maximum chunk length in characters
    #[arg(long, env = "SYMRAG_CHUNK_SIZE", default_value_t = 512)]
    chunk_size: usize,

    /// Characters of overlap between consecutive chunks
    #[arg(long, env = "SYMRAG_CHUNK_OVERLAP", default_value_t = 50)]
    chunk_overlap: usize,

    /// API key used for embedding calls
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model identifier (pinned into the snapshot)
    #[arg(
        long,
        env = "SYMRAG_OPENAI_MODEL",
        default_value = "text-embedding-3-small"
    )]
    openai_model: String,

    /// Optional dimension override when supported by the model
    #[arg(long, env = "SYMRAG_OPENAI_DIMENSIONS")]
    openai_dimensions: Option<usize>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "SYMRAG_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    openai_base_url: String,

    /// Max number of chunks to send per embedding request
    #[arg(long, env = "SYMRAG_OPENAI_BATCH", default_value_t = 32)]
    batch_size: usize,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "SYMRAG_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    openai_timeout_secs: u64,

    /// Number of retries for rate limits or transient errors
    #[arg(long, env = "SYMRAG_OPENAI_MAX_RETRIES", default_value_t = 5)]
    max_retries: usize,

    /// Number of concurrent embedding workers
    #[arg(long, env = "SYMRAG_OPENAI_THREADS", default_value_t = 1)]
    worker_threads: usize,
}

fn main() -> Result<()> {
    let cli = IndexerCli::parse();

    let records = load_records(&cli.input)?;
    eprintln!("loaded {} records from {:?}", records.len(), cli.input);

    let embedder = OpenAiEmbedder::new(
        cli.openai_api_key,
        cli.openai_base_url,
        cli.openai_model,
        cli.openai_dimensions,
        Duration::from_secs(cli.openai_timeout_secs.max(1)),
        cli.max_retries.max(1),
        cli.batch_size.max(1),
    )?;
    let config = PipelineConfig {
        chunker: ChunkerConfig {
            chunk_size: cli.chunk_size,
            overlap: cli.chunk_overlap,
        },
        batch_size: cli.batch_size.max(1),
        worker_threads: cli.worker_threads.max(1),
    };

    let model = embedder.model().to_string();
    let (index, report) = build_index(&records, &embedder, &model, &config)?;
    index
        .persist(&cli.output)
        .with_context(|| format!("failed to persist index to {:?}", cli.output))?;

    eprintln!(
        "indexed {} chunks from {} records in {} batch(es) ({:.1?}); snapshot at {:?}",
        report.chunks, report.records, report.batches, report.elapsed, cli.output
    );
    if report.chunks == 0 {
        eprintln!("index is empty; every query will get the fallback answer.");
    }
    Ok(())
}
