use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use symrag::embedder::openai::OpenAiEmbedder;
use symrag::{Retriever, RetrieverConfig, VectorIndex, DEFAULT_FALLBACK_ANSWER};

#[derive(Parser, Debug)]
#[command(
    name = "symrag-ask",
    about = "Answer symptom queries with the title of the closest indexed forum post"
)]
struct AskCli {
    /// Index snapshot produced by symrag-indexer
    #[arg(long, env = "SYMRAG_INDEX", default_value = "symrag_index.json")]
    index: PathBuf,

    /// One-shot query; omit to read queries from stdin
    #[arg(long)]
    query: Option<String>,

    /// Results retrieved per query (only the best one answers)
    #[arg(long, env = "SYMRAG_TOP_K", default_value_t = 10)]
    top_k: usize,

    /// Answer returned when nothing usable is retrieved
    #[arg(long, env = "SYMRAG_FALLBACK", default_value = DEFAULT_FALLBACK_ANSWER)]
    fallback: String,

    /// Max cached query embeddings kept in-memory (0 disables caching)
    #[arg(long, default_value_t = 1024)]
    embedding_cache_size: usize,

    /// API key used for query embedding calls
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "SYMRAG_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    openai_base_url: String,

    /// Optional dimension override when supported by the model
    #[arg(long, env = "SYMRAG_OPENAI_DIMENSIONS")]
    openai_dimensions: Option<usize>,

    /// Max seconds to wait for each embedding request
    #[arg(long, env = "SYMRAG_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    openai_timeout_secs: u64,

    /// Number of retries for rate limits or transient errors
    #[arg(long, env = "SYMRAG_OPENAI_MAX_RETRIES", default_value_t = 5)]
    max_retries: usize,
}

fn main() -> Result<()> {
    let cli = AskCli::parse();

    let index = VectorIndex::restore(&cli.index)
        .with_context(|| format!("failed to restore index from {:?}", cli.index))?;
    eprintln!(
        "restored index: {} chunks, model {}, dimension {}",
        index.len(),
        index.model(),
        index.dimension()
    );

    // Queries must embed with the model the corpus was embedded with.
    let embedder = OpenAiEmbedder::new(
        cli.openai_api_key,
        cli.openai_base_url,
        index.model().to_string(),
        cli.openai_dimensions,
        Duration::from_secs(cli.openai_timeout_secs.max(1)),
        cli.max_retries.max(1),
        1,
    )?;
    let retriever = Retriever::new(
        Arc::new(embedder),
        index,
        RetrieverConfig {
            top_k: cli.top_k.max(1),
            fallback_answer: cli.fallback,
            query_cache_size: cli.embedding_cache_size,
        },
    );

    if let Some(query) = cli.query {
        println!("{}", retriever.answer(&query));
        return Ok(());
    }

    // Interactive loop; every failure path inside answer() already maps to
    // the fallback sentinel, so nothing here can surface a raw error.
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "symptom> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        println!("{}", retriever.answer(query));
    }
    Ok(())
}
