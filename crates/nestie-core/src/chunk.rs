//! Overlapping-window text chunker.
//!
//! Splits a document's text into [`Chunk`]s of at most `chunk_size`
//! characters, where each chunk repeats the last `chunk_overlap`
//! characters of its predecessor. Sizes are counted in Unicode scalar
//! values, not bytes.
//!
//! # Algorithm
//!
//! 1. Open a window of `chunk_size` characters at `start`.
//! 2. If the window ends inside a word, pull the end back to just after
//!    the last whitespace in the window, provided the chunk still extends
//!    past the overlap region. Otherwise keep the hard cut.
//! 3. Emit the chunk. If it reaches the end of the text, stop.
//! 4. Otherwise the next window starts `chunk_overlap` characters before
//!    the end of this one.
//!
//! Without boundary adjustments a text of `L` characters produces
//! `⌈(L − O) / (S − O)⌉` chunks. Texts of at most `S` characters
//! (including the empty text) produce exactly one.
//!
//! # Example
//!
//! ```rust
//! use nestie_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Handbook", "The office Wi-Fi password is Blueberry42", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use crate::models::{content_hash, Chunk};

/// Split `text` into overlapping chunks belonging to `document`.
///
/// `chunk_overlap` is clamped below `chunk_size` and a zero `chunk_size`
/// is treated as one; configuration validation rejects both cases before
/// they reach here.
///
/// # Guarantees
///
/// - At least one chunk is returned.
/// - Indices are contiguous from 0 and chunks are in text order.
/// - Every chunk has at most `chunk_size` characters.
/// - Consecutive chunks share exactly `chunk_overlap` characters, so the
///   chunks reassemble to the original text.
/// - Same input, same output (ids included).
pub fn chunk_text(document: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let size = chunk_size.max(1);
    let overlap = chunk_overlap.min(size - 1);

    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total = chars.len();

    if total <= size {
        return vec![make_chunk(document, 0, 0, text)];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    loop {
        let mut end = (start + size).min(total);
        if end < total && splits_word(&chars, end) {
            if let Some(ws) = (start + overlap..end).rev().find(|&p| chars[p].is_whitespace()) {
                end = ws + 1;
            }
        }

        let piece = &text[offsets[start]..offsets[end]];
        chunks.push(make_chunk(document, index, start, piece));
        index += 1;

        if end >= total {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// True when a cut before `pos` would separate two non-whitespace characters.
fn splits_word(chars: &[char], pos: usize) -> bool {
    pos > 0 && pos < chars.len() && !chars[pos - 1].is_whitespace() && !chars[pos].is_whitespace()
}

fn make_chunk(document: &str, index: i64, char_start: usize, text: &str) -> Chunk {
    let id = content_hash(&format!("{}#{}", document, index))[..32].to_string();
    Chunk {
        id,
        document: document.to_string(),
        chunk_index: index,
        char_start,
        text: text.to_string(),
        hash: content_hash(text),
    }
}
