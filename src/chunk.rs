//! Overlapping, boundary-aware text chunker.
//!
//! Splits each [`Segment`] of a [`SourceDocument`] into windows of at most
//! `chunk_size` characters, with `chunk_overlap` characters shared between
//! consecutive windows of the same segment.
//!
//! # Algorithm
//!
//! 1. Start a window at character offset 0.
//! 2. If the rest of the segment fits in `chunk_size`, emit it and stop.
//! 3. Otherwise look backwards from `start + chunk_size` for the latest cut
//!    point, preferring in order: a blank line (`\n\n`), a line break, a
//!    sentence end (`.`, `!`, `?` followed by whitespace), any whitespace.
//!    A boundary only counts if the window it closes is at least half of
//!    `chunk_size`; an earlier one falls through to the next kind. Cut
//!    points must also leave room for the overlap so the next window starts
//!    strictly after the current one.
//! 4. With no natural boundary in range, cut hard at `start + chunk_size`.
//! 5. The next window starts `chunk_overlap` characters before the cut.
//!
//! Sizes and offsets are counted in `char`s, never bytes, so multi-byte text
//! is never split inside a code point. The same input and parameters always
//! yield the same chunk sequence.
//!
//! # Example
//!
//! ```rust
//! use pdfqa::chunk::split_text;
//!
//! let windows = split_text(&"x".repeat(2400), 1000, 200);
//! assert_eq!(windows, vec![(0, 1000), (800, 1800), (1600, 2400)]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{Chunk, SourceDocument};

/// Check `chunk_size > 0` and `0 <= chunk_overlap < chunk_size`.
pub fn validate_params(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfig(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfig(format!(
            "chunk_overlap ({}) must be less than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

/// Split every segment of every document into chunks.
///
/// `chunk_index` runs contiguously across all segments of a document and
/// restarts at 0 for the next document. Whitespace-only segments (blank
/// pages) produce no chunks.
pub fn split_documents(
    documents: &[SourceDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate_params(chunk_size, chunk_overlap)?;

    let mut chunks = Vec::new();
    for doc in documents {
        let mut chunk_index = 0usize;
        for segment in &doc.segments {
            if segment.text.trim().is_empty() {
                continue;
            }
            let offsets = byte_offsets(&segment.text);
            for (start, end) in split_text(&segment.text, chunk_size, chunk_overlap) {
                let text = &segment.text[offsets[start]..offsets[end]];
                chunks.push(make_chunk(
                    text,
                    &segment.source_path,
                    segment.page_index,
                    chunk_index,
                    start,
                ));
                chunk_index += 1;
            }
        }
    }
    Ok(chunks)
}

/// Compute chunk windows for `text` as `(start, end)` character ranges.
///
/// Parameters are assumed valid (see [`validate_params`]). Empty text yields
/// no windows.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut windows = Vec::new();

    let mut start = 0usize;
    while start < len {
        if len - start <= chunk_size {
            windows.push((start, len));
            break;
        }
        let hard_end = start + chunk_size;
        // The cut must leave the next window starting after this one, and
        // the window at least half full.
        let min_end = start + (chunk_overlap + 1).max(chunk_size / 2);
        let end = find_boundary(&chars, min_end, hard_end).unwrap_or(hard_end);
        windows.push((start, end));
        start = end - chunk_overlap;
    }

    windows
}

/// Latest cut point in `[min_end, max_end]`, by boundary preference.
fn find_boundary(chars: &[char], min_end: usize, max_end: usize) -> Option<usize> {
    const LEVELS: [fn(&[char], usize) -> bool; 4] =
        [is_paragraph_end, is_line_end, is_sentence_end, is_word_end];

    LEVELS.iter().find_map(|is_cut| {
        (min_end..=max_end)
            .rev()
            .find(|&pos| is_cut(chars, pos))
    })
}

fn is_paragraph_end(chars: &[char], pos: usize) -> bool {
    pos >= 2 && chars[pos - 1] == '\n' && chars[pos - 2] == '\n'
}

fn is_line_end(chars: &[char], pos: usize) -> bool {
    pos >= 1 && chars[pos - 1] == '\n'
}

fn is_sentence_end(chars: &[char], pos: usize) -> bool {
    pos >= 2 && chars[pos - 1].is_whitespace() && matches!(chars[pos - 2], '.' | '!' | '?')
}

fn is_word_end(chars: &[char], pos: usize) -> bool {
    pos >= 1 && chars[pos - 1].is_whitespace()
}

/// Byte offset of every char position, plus one entry for the end of text.
fn byte_offsets(text: &str) -> Vec<usize> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    offsets.push(text.len());
    offsets
}

fn make_chunk(
    text: &str,
    source_path: &str,
    page_index: usize,
    chunk_index: usize,
    start: usize,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        text: text.to_string(),
        source_path: source_path.to_string(),
        page_index,
        chunk_index,
        start,
        hash,
    }
}
