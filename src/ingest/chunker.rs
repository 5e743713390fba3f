//! Recursive character chunker.
//!
//! Splits document text into overlapping passages, preferring paragraph
//! boundaries, then line boundaries, then spaces, then raw character
//! windows. Separators stay attached to the preceding piece, so
//! concatenating the produced chunks with their overlaps removed yields the
//! original text unchanged.

use std::collections::VecDeque;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split `text` into ordered chunks of at most `chunk_size` characters
    /// with `overlap` characters carried between consecutive chunks.
    /// Empty input yields an empty sequence.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let pieces = self.split_pieces(text, &SEPARATORS);
        self.merge(pieces)
    }

    /// Break the text into pieces no longer than `chunk_size`, using the
    /// first separator that occurs in the text and recursing with finer
    /// separators for pieces still over length. Character windows are the
    /// final fallback.
    fn split_pieces(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some((sep, rest)) = separators.split_first() else {
            return self.char_windows(text);
        };

        if !text.contains(sep) {
            return self.split_pieces(text, rest);
        }

        let mut pieces = Vec::new();
        for part in text.split_inclusive(sep) {
            if part.chars().count() <= self.chunk_size {
                pieces.push(part.to_string());
            } else {
                pieces.extend(self.split_pieces(part, rest));
            }
        }
        pieces
    }

    fn char_windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.chunk_size)
            .map(|window| window.iter().collect())
            .collect()
    }

    /// Accumulate pieces into chunks. When adding a piece would exceed the
    /// target length, the current window is emitted and trimmed from the
    /// front until at most `overlap` characters carry over.
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(String, usize)> = VecDeque::new();
        let mut window_len = 0usize;

        for piece in pieces {
            let piece_len = piece.chars().count();

            if window_len + piece_len > self.chunk_size && !window.is_empty() {
                chunks.push(concat(&window));

                while !window.is_empty()
                    && (window_len > self.overlap || window_len + piece_len > self.chunk_size)
                {
                    let (_, front_len) = window.pop_front().expect("window not empty");
                    window_len -= front_len;
                }
            }

            window.push_back((piece, piece_len));
            window_len += piece_len;
        }

        if !window.is_empty() {
            chunks.push(concat(&window));
        }

        chunks
    }
}

fn concat(window: &VecDeque<(String, usize)>) -> String {
    window.iter().map(|(piece, _)| piece.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drop the longest prefix of `next` that is also a suffix of `prev`.
    fn strip_overlap<'a>(prev: &str, next: &'a str) -> &'a str {
        let max = prev.len().min(next.len());
        for k in (0..=max).rev() {
            if next.is_char_boundary(k) && prev.ends_with(&next[..k]) {
                return &next[k..];
            }
        }
        next
    }

    fn reconstruct(chunks: &[String]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            out.push_str(strip_overlap(&out, chunk));
        }
        out
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(Chunker::default().split("").is_empty());
    }

    #[test]
    fn short_input_is_a_single_chunk() {
        let chunks = Chunker::default().split("just a short note");
        assert_eq!(chunks, vec!["just a short note".to_string()]);
    }

    /// 500 distinct five-character tokens: 2,500 characters total.
    fn numbered_tokens() -> String {
        (0..500).map(|i| format!("w{i:03} ")).collect()
    }

    #[test]
    fn word_separated_2500_chars_make_three_chunks() {
        let text = numbered_tokens();
        let chunks = Chunker::default().split(&text);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= DEFAULT_CHUNK_SIZE);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn chunks_overlap_by_trailing_pieces() {
        let text = numbered_tokens();
        let chunks = Chunker::default().split(&text);
        assert!(chunks.len() >= 2);
        // The second chunk starts with the tail of the first.
        let tail = &chunks[0][chunks[0].len() - 200..];
        assert!(chunks[1].starts_with(tail));
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let paragraph = "x".repeat(400);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");

        let chunks = Chunker::default().split(&text);
        // Each emitted chunk ends on a paragraph break except the last.
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with("\n\n"));
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn falls_back_to_char_windows_without_separators() {
        let text = "a".repeat(2500);
        let chunks = Chunker::default().split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn reconstruction_holds_for_mixed_text() {
        let body: String = (0..300).map(|i| format!("token{i:03} ")).collect();
        let text = format!(
            "Intro paragraph.\n\n{body}\n\nline one\nline two\nline three\n\ntrailer"
        );
        let chunks = Chunker::default().split(&text);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= DEFAULT_CHUNK_SIZE);
        }
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunker = Chunker::new(10, 50);
        let text = "aaaa bbbb cccc dddd";
        let chunks = chunker.split(text);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 10);
        }
        assert_eq!(reconstruct(&chunks), text);
    }
}
