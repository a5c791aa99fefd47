//! Recursive character text splitter.
//!
//! Splits extracted document text into overlapping chunks of at most
//! `chunk_size` characters, preferring the largest available boundary:
//! paragraph, then line, then word, then single character.
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text (`""` always matches
//!    and splits into characters).
//! 2. Split on it, keeping each separator attached to the start of the piece
//!    that follows it. Empty pieces are dropped.
//! 3. Pieces shorter than `chunk_size` are collected and merged greedily.
//!    Longer pieces flush the collected ones, then recurse with the
//!    remaining, finer separators.
//! 4. Merging keeps a sliding window: after a chunk is emitted, pieces are
//!    dropped from the front until at most `chunk_overlap` characters remain,
//!    so consecutive chunks share up to `chunk_overlap` characters.
//! 5. Merged chunks are whitespace-trimmed; blank chunks are discarded.
//!
//! All lengths are counted in characters, never bytes.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200).unwrap();
//! let chunks = splitter.split_text("Hello world.\n\nSecond paragraph.");
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph."]);
//! ```

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Boundaries in priority order: paragraph, line, word, character.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits text into overlapping, size-bounded chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Create a splitter with the default separators.
    ///
    /// Fails with [`Error::InvalidChunking`] when `chunk_size` is zero or
    /// `chunk_overlap` exceeds `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidChunking("chunk_size must be > 0".into()));
        }
        if chunk_overlap > chunk_size {
            return Err(Error::InvalidChunking(format!(
                "chunk_overlap ({chunk_overlap}) is larger than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator list. Order is priority order.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks. The position of a chunk in the returned
    /// vector is its chunk index.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        let mut chunks = Vec::new();
        self.split_recursive(text, &separators, &mut chunks);
        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str], out: &mut Vec<String>) {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut good: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                self.merge_splits(&good, out);
                good.clear();
            }
            if finer.is_empty() {
                out.push(piece.to_string());
            } else {
                self.split_recursive(piece, finer, out);
            }
        }
        if !good.is_empty() {
            self.merge_splits(&good, out);
        }
    }

    fn merge_splits(&self, splits: &[&str], out: &mut Vec<String>) {
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_trimmed(&window) {
                    out.push(chunk);
                }
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&window) {
            out.push(chunk);
        }
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, keeping it at the start of the following piece.
/// An empty separator splits into single characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        pieces.push(&text[start..idx]);
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = TextSplitter::default().split_text("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        let splitter = TextSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("   \n\n \t\n").is_empty());
    }

    #[test]
    fn test_word_overlap() {
        let splitter = TextSplitter::new(10, 5).unwrap();
        let chunks = splitter.split_text("aaa bbb ccc ddd eee");
        assert_eq!(chunks, vec!["aaa bbb", "bbb ccc", "ccc ddd", "ddd eee"]);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let splitter = TextSplitter::new(12, 0).unwrap();
        let chunks = splitter.split_text("para one.\n\npara two.");
        assert_eq!(chunks, vec!["para one.", "para two."]);
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let splitter = TextSplitter::new(4, 0).unwrap();
        let chunks = splitter.split_text("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_size_bound_and_no_blank_chunks() {
        let text = (0..200)
            .map(|i| format!("Sentence number {i} talks about budgets.\nAnother line {i}."))
            .collect::<Vec<_>>()
            .join("\n\n");
        let splitter = TextSplitter::new(120, 30).unwrap();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 10);
        for c in &chunks {
            assert!(c.chars().count() <= 120, "chunk too long: {}", c.chars().count());
            assert!(!c.trim().is_empty());
        }
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let text = "┌──────────────────┐\n│ Hello wörld      │\n└──────────────────┘";
        let splitter = TextSplitter::new(8, 2).unwrap();
        let chunks = splitter.split_text(text);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 8);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta eta.\nTheta iota kappa lambda mu.";
        let splitter = TextSplitter::new(20, 8).unwrap();
        assert_eq!(splitter.split_text(text), splitter.split_text(text));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            TextSplitter::new(0, 0),
            Err(Error::InvalidChunking(_))
        ));
        assert!(matches!(
            TextSplitter::new(100, 200),
            Err(Error::InvalidChunking(_))
        ));
    }

    #[test]
    fn test_split_keep_separator() {
        assert_eq!(
            split_keep_separator("a\n\n\n\nb", "\n\n"),
            vec!["a", "\n\n", "\n\nb"]
        );
        assert_eq!(split_keep_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
    }
}
