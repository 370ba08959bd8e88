//! Text chunking
//!
//! Splits extracted page text into overlapping windows, preferring to cut at
//! paragraph, then sentence, then word boundaries. Chunk boundaries and
//! hashes are deterministic so an unchanged document maps to the same
//! point ids on every load.

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use blake3::Hasher;

/// A text chunk with metadata
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,

    /// Byte start position in the source text
    pub char_start: usize,

    /// Byte end position in the source text
    pub char_end: usize,

    /// Chunk index (0-based)
    pub index: usize,

    /// Blake3 hash of document hash + chunk text
    pub hash: String,
}

impl TextChunk {
    /// Compute the hash for this chunk
    pub fn compute_hash(text: &str, doc_hash: &str) -> String {
        let mut hasher = Hasher::new();
        hasher.update(doc_hash.as_bytes());
        hasher.update(text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Hash whole-document content
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Chunk a document's text
pub fn chunk_text(text: &str, doc_hash: &str, config: &ChunkConfig) -> Vec<TextChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let break_points = find_break_points(text);

    let mut chunks = Vec::new();
    let mut current_start = 0;

    while current_start < text.len() {
        let target_end = current_start + config.max_chars;

        let chunk_end = if target_end >= text.len() {
            text.len()
        } else {
            find_best_break(text, current_start, target_end, &break_points, config)
        };

        let chunk = text[current_start..chunk_end].trim();

        // Tiny fragments are dropped unless they are the tail of the text
        if !chunk.is_empty() && (chunk.len() >= config.min_chars || chunk_end >= text.len()) {
            chunks.push(TextChunk {
                text: chunk.to_string(),
                char_start: current_start,
                char_end: chunk_end,
                index: chunks.len(),
                hash: TextChunk::compute_hash(chunk, doc_hash),
            });
        }

        if chunk_end >= text.len() {
            break;
        }

        current_start = next_start(text, current_start, chunk_end, &break_points, config);
    }

    chunks
}

/// Pick the highest-priority break in the last fifth of the window; the
/// latest one wins ties. Falls back to a hard cut at the target.
fn find_best_break(
    text: &str,
    start: usize,
    target: usize,
    break_points: &[BreakPoint],
    config: &ChunkConfig,
) -> usize {
    let min_pos = start + (config.max_chars * 4 / 5);

    let best = break_points
        .iter()
        .filter(|p| p.position > start && p.position >= min_pos && p.position <= target)
        .max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.position.cmp(&b.position))
        });

    match best {
        Some(point) => point.position,
        None => {
            let cut = ensure_char_boundary(text, target);
            if cut > start {
                cut
            } else {
                // Window narrower than a single char: step over it
                text[start..]
                    .char_indices()
                    .nth(1)
                    .map(|(i, _)| start + i)
                    .unwrap_or(text.len())
            }
        }
    }
}

/// Start of the next window: step back by the overlap, snapped forward to a
/// break point, and always strictly after the previous start.
fn next_start(
    text: &str,
    previous_start: usize,
    chunk_end: usize,
    break_points: &[BreakPoint],
    config: &ChunkConfig,
) -> usize {
    if config.overlap_chars == 0 {
        return chunk_end;
    }

    let floor = chunk_end.saturating_sub(config.overlap_chars);
    let snapped = break_points
        .iter()
        .map(|p| p.position)
        .find(|&pos| pos >= floor && pos < chunk_end)
        .unwrap_or_else(|| ensure_char_boundary(text, floor));

    if snapped > previous_start {
        snapped
    } else {
        chunk_end
    }
}
