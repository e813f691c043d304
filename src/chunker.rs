//! Overlapping character-window chunking of canonical record text.

use serde::{Deserialize, Serialize};

use crate::record::RecordMetadata;

/// Chunking tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of the same text.
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
        }
    }
}

/// A bounded text window cut from one record's canonical text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Character offset of the window start within the parent text,
    /// recorded before trimming.
    pub start_offset: usize,
    /// Trimmed window text.
    pub text: String,
    /// Metadata of the owning record.
    pub metadata: RecordMetadata,
}

/// Splits canonical text into overlapping fixed-size character windows.
///
/// Windows advance by `chunk_size - overlap` characters; the final window
/// covers whatever remains, so any non-empty text yields at least one chunk
/// and text shorter than `chunk_size` yields exactly one. Chunk text is
/// whitespace-trimmed but `start_offset` always refers to the pre-trim
/// window position. Offsets and sizes count characters, not bytes, so
/// multi-byte scripts chunk the same way as ASCII.
pub fn split(text: &str, config: &ChunkerConfig, metadata: &RecordMetadata) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let chunk_size = config.chunk_size.max(1);
    let overlap = config.overlap.min(chunk_size - 1);
    let stride = chunk_size - overlap;

    // Byte boundary of every character, plus a sentinel for the text end.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
    boundaries.push(text.len());
    let char_len = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let remaining = char_len - start;
        let end = if remaining <= chunk_size {
            char_len
        } else {
            start + chunk_size
        };
        let window = &text[boundaries[start]..boundaries[end]];
        chunks.push(Chunk {
            start_offset: start,
            text: window.trim().to_string(),
            metadata: metadata.clone(),
        });
        if end == char_len {
            break;
        }
        start += stride;
    }
    chunks
}
