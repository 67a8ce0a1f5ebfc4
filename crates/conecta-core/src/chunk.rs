//! Overlapping, separator-aware text chunker.
//!
//! Splits each page of a document into windows of at most `chunk_size`
//! characters. Consecutive windows of the same page share at least
//! `chunk_overlap` characters, so nothing is lost at a boundary.
//!
//! # Algorithm
//!
//! 1. If the rest of the page fits in `chunk_size`, emit it and stop.
//! 2. Otherwise look for a break point in the second half of the window,
//!    trying `"\n\n"`, then `"\n"`, then `" "` (minimum granularity).
//! 3. With no separator in range, hard-split at `chunk_size`.
//! 4. Start the next window `chunk_overlap` characters before the previous
//!    end, moved back to the start of the word it lands in when possible.
//!
//! Lengths and offsets are counted in Unicode scalar values. Chunks are not
//! trimmed: removing the overlap prefix of every chunk but the first and
//! concatenating reproduces the page exactly.
//!
//! # Example
//!
//! ```rust
//! use conecta_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(1000, 50).unwrap();
//! let spans = chunker.split(&["Loja X vende eletrônicos.".to_string()]);
//! assert_eq!(spans.len(), 1);
//! assert_eq!(spans[0].page, 1);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Break-point separators, coarsest first.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

/// How far back the start of a window may move to reach a word start.
const MAX_WORD_SNAP: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

/// A chunk before it is attached to a document and user.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpan {
    /// 1-based page number.
    pub page: usize,
    pub chunk_index: i64,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub hash: String,
}

impl PageSpan {
    pub fn into_chunk(self, document_id: &str, user_id: &str, source_label: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            source_label: source_label.to_string(),
            page: self.page,
            chunk_index: self.chunk_index,
            start: self.start,
            end: self.end,
            text: self.text,
            hash: self.hash,
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// Requires `0 < chunk_size` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::input("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::input(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split page texts into spans, preserving page order.
    ///
    /// Chunk indices are contiguous across pages. Blank pages produce no
    /// spans; an empty input produces an empty result.
    pub fn split(&self, pages: &[String]) -> Vec<PageSpan> {
        let mut spans = Vec::new();
        for (page_idx, page) in pages.iter().enumerate() {
            let chars: Vec<char> = page.chars().collect();
            for (start, end) in self.char_spans(&chars) {
                let text: String = chars[start..end].iter().collect();
                spans.push(PageSpan {
                    page: page_idx + 1,
                    chunk_index: spans.len() as i64,
                    start,
                    end,
                    hash: content_hash(&text),
                    text,
                });
            }
        }
        spans
    }

    /// Character-offset windows for a single text.
    pub fn char_spans(&self, chars: &[char]) -> Vec<(usize, usize)> {
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        let len = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            if len - start <= self.chunk_size {
                spans.push((start, len));
                break;
            }

            let hard_end = start + self.chunk_size;
            let floor = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);
            let end = find_break(chars, floor, hard_end).unwrap_or(hard_end);
            spans.push((start, end));

            start = self.next_start(chars, start, end);
        }

        spans
    }

    fn next_start(&self, chars: &[char], prev_start: usize, end: usize) -> usize {
        // end > prev_start + overlap, so this always makes progress
        let candidate = end - self.chunk_overlap;
        let limit = candidate
            .saturating_sub(MAX_WORD_SNAP)
            .max(prev_start + 1);

        let mut pos = candidate;
        while pos > limit && !chars[pos - 1].is_whitespace() {
            pos -= 1;
        }
        if pos == candidate || chars[pos - 1].is_whitespace() {
            pos
        } else {
            candidate
        }
    }
}

/// Latest position in `floor..=hard_end` that directly follows a separator.
fn find_break(chars: &[char], floor: usize, hard_end: usize) -> Option<usize> {
    for sep in SEPARATORS {
        let sep: Vec<char> = sep.chars().collect();
        let found = (floor..=hard_end)
            .rev()
            .find(|&b| b >= sep.len() && chars[b - sep.len()..b] == sep[..]);
        if found.is_some() {
            return found;
        }
    }
    None
}

pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
