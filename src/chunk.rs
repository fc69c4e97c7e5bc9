//! Recursive boundary-preferring text splitter.
//!
//! Splits document text into overlapping windows of at most `chunk_size`
//! characters. The splitter tries separators in order (paragraph, line,
//! word, then single characters): text is cut on the first separator that
//! occurs in it, small pieces are merged back up to `chunk_size`, and any
//! piece that is still too long is split again with the next separator.
//! Consecutive windows share a tail of at most `chunk_overlap` characters.
//!
//! Lengths are counted in `char`s, not bytes.

use crate::error::ConfigError;
use crate::models::{Chunk, Document};

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "chunking.chunk_size",
                message: "must be > 0".into(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::Invalid {
                key: "chunking.chunk_overlap",
                message: format!("must be smaller than chunk_size ({})", chunk_size),
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits raw text into trimmed, non-empty windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Splits a document into chunks that carry only the document's `source`.
    ///
    /// With `content_addressed`, chunk ids are content hashes; otherwise
    /// they are random.
    pub fn split_document(&self, doc: &Document, content_addressed: bool) -> Vec<Chunk> {
        self.split_text(&doc.text)
            .iter()
            .map(|window| {
                if content_addressed {
                    Chunk::content_addressed(&doc.source, window)
                } else {
                    Chunk::new(&doc.source, window)
                }
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // First separator present in the text; "" always matches.
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if remaining.is_empty() {
                if let Some(window) = trimmed(piece) {
                    chunks.push(window);
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }

        chunks
    }

    /// Greedily packs pieces into windows of at most `chunk_size` chars,
    /// carrying at most `chunk_overlap` chars of trailing pieces forward.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: std::collections::VecDeque<(&str, usize)> =
            std::collections::VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(window) = trimmed(&join(&current)) {
                    windows.push(window);
                }
                while total > self.chunk_overlap
                    || (total > 0 && total + len > self.chunk_size)
                {
                    match current.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            current.push_back((piece, len));
            total += len;
        }

        if let Some(window) = trimmed(&join(&current)) {
            windows.push(window);
        }
        windows
    }
}

/// Splits on `separator`, attaching each separator to the start of the
/// piece that follows it. Empty pieces are dropped; `""` yields characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, _) in text.match_indices(separator) {
        if i > start {
            pieces.push(&text[start..i]);
        }
        start = i;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join(pieces: &std::collections::VecDeque<(&str, usize)>) -> String {
    pieces.iter().map(|(p, _)| *p).collect()
}

fn trimmed(text: &str) -> Option<String> {
    let t = text.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(size, overlap).unwrap()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = splitter(500, 20).split_text("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(splitter(500, 20).split_text("").is_empty());
        assert!(splitter(500, 20).split_text("  \n\n \n").is_empty());
    }

    #[test]
    fn test_paragraphs_merged_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = splitter(500, 20).split_text(text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].starts_with("First paragraph."));
        assert!(chunks[0].ends_with("Third paragraph."));
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para = "word ".repeat(18); // 90 chars
        let text = format!("{}\n\n{}\n\n{}", para.trim(), para.trim(), para.trim());
        let chunks = splitter(100, 0).split_text(&text);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert_eq!(c, para.trim());
        }
    }

    #[test]
    fn test_every_chunk_within_size() {
        let text = (0..200)
            .map(|i| format!("Sentence number {} about migraine and tension headaches.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = splitter(500, 20).split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(char_len(c) <= 500, "chunk of {} chars", char_len(c));
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..300)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = splitter(100, 20).split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].split(' ').any(|w| w == last_word),
                "expected '{}' to carry over into {:?}",
                last_word,
                pair[1]
            );
        }
    }

    #[test]
    fn test_falls_back_to_characters() {
        let text = "x".repeat(1200);
        let chunks = splitter(500, 20).split_text(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(char_len(&chunks[0]), 500);
        assert_eq!(char_len(&chunks[1]), 500);
        // 1200 chars with a 20 char overlap between consecutive windows.
        assert_eq!(char_len(&chunks[2]), 240);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        let text = "é".repeat(450);
        let chunks = splitter(500, 20).split_text(&text);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunk_count_tracks_text_length() {
        let text = (0..2000)
            .map(|i| format!("token{}", i % 97))
            .collect::<Vec<_>>()
            .join(" ");
        let s = splitter(500, 20);
        let chunks = s.split_text(&text);
        let stride = (s.chunk_size() - s.chunk_overlap()) as f64;
        let approx = chunks.len() as f64 * stride;
        let total = char_len(&text) as f64;
        // Word boundaries leave windows a little short of full size.
        assert!(
            (approx - total).abs() / total < 0.15,
            "{} chunks * {} = {} vs {}",
            chunks.len(),
            stride,
            approx,
            total
        );
    }

    #[test]
    fn test_split_document_keeps_only_source() {
        let doc = Document {
            text: "Fever is a raised body temperature.\n\nIt is common.".repeat(40),
            source: "data/Medical_book.pdf".into(),
        };
        let chunks = splitter(500, 20).split_document(&doc, false);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(c.source, doc.source);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RecursiveSplitter::new(0, 0).is_err());
        assert!(RecursiveSplitter::new(20, 20).is_err());
        assert!(RecursiveSplitter::new(20, 19).is_ok());
    }

    #[test]
    fn test_separator_attached_to_following_piece() {
        let pieces = split_keeping_separator("a b  c", " ");
        assert_eq!(pieces, vec!["a", " b", " ", " c"]);
    }
}
