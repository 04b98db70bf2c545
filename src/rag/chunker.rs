//! Text chunking for document ingestion.
//!
//! Splits a document into overlapping character windows, snapping each cut
//! to the nearest natural boundary (sentence terminator, newline, space)
//! so chunks stay readable. Chunking is a pure function: the same input
//! always produces the same sequence of chunks.

use crate::types::{AppError, Result};

/// Cut candidates in priority order: sentence end, line break, word break.
const BREAKPOINTS: [char; 3] = ['.', '\n', ' '];

/// Overlapping character chunker.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Create a chunker with the given window size and overlap, both in
    /// characters.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless `chunk_size > chunk_overlap`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(AppError::Validation(format!(
                "chunk_size ({}) must be greater than chunk_overlap ({})",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into trimmed, non-empty chunks.
    ///
    /// Each window is at most `chunk_size` characters; when the window does
    /// not reach the end of the text the cut snaps backward to the nearest
    /// breakpoint, but never into the first half of the window. Consecutive
    /// raw windows share `chunk_overlap` characters. Whitespace-only input
    /// yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        // Indexing by chars keeps cuts off UTF-8 sequence boundaries.
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total {
                self.snap_to_breakpoint(&chars, start, hard_end)
            } else {
                hard_end
            };

            let slice: String = chars[start..end].iter().collect();
            let trimmed = slice.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }

            if end >= total {
                break;
            }
            let next = end.saturating_sub(self.chunk_overlap);
            if next <= start {
                break;
            }
            start = next;
        }

        chunks
    }

    /// Scan backward from `candidate` for the best cut position.
    ///
    /// A breakpoint is only accepted in the second half of the window;
    /// otherwise the raw `candidate` cut is used. The returned position is
    /// one past the breakpoint character so the terminator stays with the
    /// chunk it ends.
    fn snap_to_breakpoint(&self, chars: &[char], start: usize, candidate: usize) -> usize {
        let floor = start + self.chunk_size / 2;
        for breakpoint in BREAKPOINTS {
            let mut pos = candidate;
            while pos > floor {
                if chars[pos - 1] == breakpoint {
                    return pos;
                }
                pos -= 1;
            }
        }
        candidate
    }
}
