//! Brute-force cosine vector index with atomic JSON snapshot persistence.

use std::cmp::Ordering;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;
use crate::debug_log;

/// Errors surfaced while assembling an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Chunk and vector counts differ.
    LengthMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// A vector's dimension disagrees with the rest of the batch.
    DimensionMismatch {
        /// Dimension established by the first vector.
        expected: usize,
        /// Offending dimension.
        found: usize,
        /// Position of the offending vector in the batch.
        position: usize,
    },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { chunks, vectors } => {
                write!(f, "{} chunks paired with {} vectors", chunks, vectors)
            }
            Self::DimensionMismatch {
                expected,
                found,
                position,
            } => write!(
                f,
                "vector {} has dimension {} but the batch established {}",
                position, found, expected
            ),
        }
    }
}

impl std::error::Error for IndexError {}

/// Errors surfaced while persisting or restoring a snapshot.
#[derive(Debug)]
pub enum SnapshotError {
    /// Filesystem failure.
    Io(std::io::Error),
    /// The snapshot file did not parse.
    Malformed(serde_json::Error),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "snapshot I/O failure: {}", err),
            Self::Malformed(err) => write!(f, "snapshot did not parse: {}", err),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Malformed(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    vector: Vec<f32>,
    chunk: Chunk,
}

/// One ranked search result borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    /// The matched chunk.
    pub chunk: &'a Chunk,
    /// Cosine similarity to the query (dot product of unit vectors).
    pub score: f32,
}

/// Immutable collection of (vector, chunk) pairs from one ingestion run.
///
/// Search is an exact scan, a dot product against every stored vector.
/// The only supported mutation is building a replacement index and
/// swapping it in wholesale.
#[derive(Debug, Serialize, Deserialize)]
pub struct VectorIndex {
    model: String,
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Assembles an index from parallel chunk and vector batches.
    ///
    /// The batches must be the same length and every vector must share one
    /// dimension; violations fail the whole build and leave nothing behind.
    pub fn build(
        model: impl Into<String>,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    found: vector.len(),
                    position,
                });
            }
        }

        let entries = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexEntry { vector, chunk })
            .collect();
        Ok(Self {
            model: model.into(),
            dimension,
            entries,
        })
    }

    /// Model identifier the corpus was embedded with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Vector dimension, 0 for an empty index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns up to `k` hits ordered by non-increasing similarity.
    ///
    /// Ties keep insertion order (the sort is stable). An empty index or a
    /// query of the wrong dimension yields an empty result, never an error;
    /// `k` beyond the index size returns everything.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit<'_>> {
        if self.entries.is_empty() || k == 0 {
            return Vec::new();
        }
        if query.len() != self.dimension {
            debug_log!(
                "query dimension {} does not match index dimension {}; returning no hits",
                query.len(),
                self.dimension
            );
            return Vec::new();
        }

        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                chunk: &entry.chunk,
                score: dot(query, &entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        hits
    }

    /// Writes the index as a JSON snapshot.
    ///
    /// The snapshot is staged in a sibling temp file and renamed into
    /// place, so a failed write never leaves a torn snapshot where a valid
    /// one used to be.
    pub fn persist(&self, path: &Path) -> Result<(), SnapshotError> {
        let staging = staging_path(path);
        {
            let file = File::create(&staging)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self).map_err(SnapshotError::Malformed)?;
            writer.flush()?;
        }
        fs::rename(&staging, path)?;
        Ok(())
    }

    /// Reloads an index from a snapshot written by [`VectorIndex::persist`].
    pub fn restore(path: &Path) -> Result<Self, SnapshotError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(SnapshotError::Malformed)
    }
}

fn staging_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
