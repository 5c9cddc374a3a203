//! Word-respecting text chunker.
//!
//! Greedy bin-packing of whitespace-delimited tokens into pieces no longer
//! than the display's cell count. Lengths are counted in characters
//! (Unicode scalar values), never bytes, and a forced split of an oversized
//! token always lands on a character boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chunker input errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("no text provided")]
    EmptyText,
    #[error("chunk size must be at least 1 character")]
    ZeroLimit,
}

/// What to do with a single token longer than the chunk limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizedTokenPolicy {
    /// Cut every oversized token into limit-sized pieces until the rest fits.
    #[default]
    SplitAll,
    /// Cut once, and only when the token starts a fresh chunk; the remainder
    /// and tokens that follow a non-empty chunk may stay over the limit.
    SplitOnce,
}

/// One bounded segment of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based position.
    pub index: usize,
    pub total: usize,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Chunk {
    /// Tag `contents` with positions, the shared total and one capture time.
    pub fn sequence(contents: Vec<String>) -> Vec<Chunk> {
        let total = contents.len();
        let timestamp = Utc::now();
        contents
            .into_iter()
            .enumerate()
            .map(|(i, content)| Chunk {
                index: i + 1,
                total,
                content,
                timestamp,
            })
            .collect()
    }

    pub fn is_last(&self) -> bool {
        self.index == self.total
    }
}

/// Split `text` into chunks of at most `max_size` characters using
/// [`OversizedTokenPolicy::SplitAll`].
pub fn split(text: &str, max_size: usize) -> Result<Vec<String>, ChunkError> {
    split_with(text, max_size, OversizedTokenPolicy::SplitAll)
}

/// Split `text` with an explicit oversized-token policy.
///
/// Every token costs its length plus one separator against `max_size`; a
/// remainder seeded after a forced split costs only its length.
pub fn split_with(
    text: &str,
    max_size: usize,
    policy: OversizedTokenPolicy,
) -> Result<Vec<String>, ChunkError> {
    if max_size == 0 {
        return Err(ChunkError::ZeroLimit);
    }
    let mut tokens = text.split_whitespace().peekable();
    if tokens.peek().is_none() {
        return Err(ChunkError::EmptyText);
    }

    let mut packer = Packer {
        chunks: Vec::new(),
        current: Vec::new(),
        len: 0,
        max_size,
    };

    for token in tokens {
        let width = char_len(token) + 1;
        if packer.len + width <= max_size {
            packer.current.push(token);
            packer.len += width;
            continue;
        }

        if !packer.current.is_empty() {
            packer.flush();
            match policy {
                OversizedTokenPolicy::SplitAll if char_len(token) > max_size => {
                    packer.seed_oversized(token)
                }
                _ => {
                    packer.current.push(token);
                    packer.len = width;
                }
            }
        } else {
            match policy {
                OversizedTokenPolicy::SplitAll => packer.seed_oversized(token),
                OversizedTokenPolicy::SplitOnce => {
                    let (head, rest) = split_at_char(token, max_size);
                    packer.chunks.push(head.to_string());
                    if !rest.is_empty() {
                        packer.current.push(rest);
                        packer.len = char_len(rest);
                    }
                }
            }
        }
    }
    packer.flush();

    Ok(packer.chunks)
}

struct Packer<'a> {
    chunks: Vec<String>,
    current: Vec<&'a str>,
    len: usize,
    max_size: usize,
}

impl<'a> Packer<'a> {
    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(self.current.join(" "));
            self.current.clear();
        }
        self.len = 0;
    }

    /// Emit full-width pieces of `token`, then seed the buffer with what is left.
    fn seed_oversized(&mut self, token: &'a str) {
        let mut rest = token;
        while char_len(rest) > self.max_size {
            let (head, tail) = split_at_char(rest, self.max_size);
            self.chunks.push(head.to_string());
            rest = tail;
        }
        if !rest.is_empty() {
            self.current.push(rest);
            self.len = char_len(rest);
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_at_char(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((byte, _)) => s.split_at(byte),
        None => (s, ""),
    }
}
