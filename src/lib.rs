#![warn(missing_docs)]
//! Core library for the symrag forum-post retrieval engine.
//!
//! Raw forum records flow through normalization, chunking, and embedding
//! into an immutable vector index; queries embed into the same metric
//! space and answer with the closest record's title.

pub mod chunker;
pub mod embedder;
pub mod index;
pub mod pipeline;
pub mod record;
pub mod retriever;

pub use chunker::{split, Chunk, ChunkerConfig};
pub use embedder::hashing::HashingEmbedder;
pub use embedder::openai::OpenAiEmbedder;
pub use embedder::Embedder;
pub use index::{IndexError, SearchHit, SnapshotError, VectorIndex};
pub use pipeline::{build_index, BuildReport, PipelineConfig};
pub use record::{load_records, normalize, AgeGroup, NormalizedRecord, RawRecord, RecordMetadata};
pub use retriever::{Retriever, RetrieverConfig, DEFAULT_FALLBACK_ANSWER};

#[cfg(feature = "debug_logs")]
#[macro_export]
// This allows use of the `eprintln!` macro via `debug_log!` macro.
macro_rules! debug_log {
        ($($arg:tt)*) => {
            eprintln!($($arg)*);
        };
    }
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
// This effectively disables the `eprintln!` macro, effectively removing it from the code during
// compilation.
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}
