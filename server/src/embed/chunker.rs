//! Boundary-preference text chunking for embedding.

use std::collections::VecDeque;

/// Split boundaries in preference order. The empty string means "split
/// anywhere" and is the last resort for runs with no other boundary.
const SEPARATORS: [&str; 7] = ["\n\n", "\n", ".", ";", ",", " ", ""];

#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Split text into chunks of at most `chunk_size` characters with up to
/// `chunk_overlap` characters carried over between consecutive chunks.
///
/// Rules:
/// 1. Prefer the earliest boundary in [`SEPARATORS`] that the text contains,
///    recursing into oversized pieces with the remaining boundaries.
/// 2. Merge pieces greedily up to `chunk_size`, retaining a trailing run of
///    at most `chunk_overlap` characters as the start of the next chunk.
/// 3. Every chunk is a contiguous substring of the input; a text of at most
///    `chunk_size` characters comes back as a single identical chunk.
/// 4. Whitespace-only input produces no chunks.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    assert!(
        chunk_overlap < chunk_size,
        "chunk_overlap must be smaller than chunk_size"
    );
    if text.is_empty() {
        return Vec::new();
    }

    let pieces = split_recursive(text, &SEPARATORS, chunk_size);
    merge_pieces(&pieces, chunk_size, chunk_overlap)
        .into_iter()
        .filter(|chunk| !chunk.trim().is_empty())
        .enumerate()
        .map(|(index, text)| Chunk { index, text })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Break text into pieces no longer than `chunk_size`, preferring the given
/// boundaries in order.
fn split_recursive<'a>(text: &'a str, separators: &[&str], chunk_size: usize) -> Vec<&'a str> {
    if char_len(text) <= chunk_size {
        return vec![text];
    }

    let (sep, rest) = match separators.split_first() {
        Some((sep, rest)) => (*sep, rest),
        None => return hard_split(text, chunk_size),
    };
    if sep.is_empty() {
        return hard_split(text, chunk_size);
    }
    if !text.contains(sep) {
        return split_recursive(text, rest, chunk_size);
    }

    let mut pieces = Vec::new();
    for part in text.split_inclusive(sep) {
        if char_len(part) <= chunk_size {
            pieces.push(part);
        } else {
            pieces.extend(split_recursive(part, rest, chunk_size));
        }
    }
    pieces
}

/// Split on character boundaries into `chunk_size`-character windows.
fn hard_split(text: &str, chunk_size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in text.char_indices() {
        if count == chunk_size {
            pieces.push(&text[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Greedily accumulate pieces into chunks of at most `chunk_size` characters,
/// keeping a trailing run of at most `chunk_overlap` characters when a chunk
/// is emitted.
fn merge_pieces(pieces: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for &piece in pieces {
        let piece_len = char_len(piece);
        if total + piece_len > chunk_size && !current.is_empty() {
            chunks.push(current.iter().copied().collect::<String>());
            while total > chunk_overlap || (total + piece_len > chunk_size && total > 0) {
                let dropped = current.pop_front().unwrap_or_default();
                total -= char_len(dropped);
            }
        }
        current.push_back(piece);
        total += piece_len;
    }
    if !current.is_empty() {
        chunks.push(current.iter().copied().collect::<String>());
    }

    chunks
}
