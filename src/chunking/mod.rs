//! Document chunking strategies
//!
//! Splits raw text into retrievable units under a configurable strategy.
//! All strategies are single-pass and deterministic: identical input,
//! strategy and options always produce byte-identical chunk boundaries.

use crate::document::{Chunk, Document};
use serde::{Deserialize, Serialize};

/// Chunking strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Split on sentence boundaries, merging short sentences up to a floor
    Sentence,
    /// Fixed character windows with configurable overlap
    FixedSize,
    /// Sentence-aware with a hard maximum chunk length
    Smart,
}

impl ChunkStrategy {
    /// Parse strategy from a configuration string
    pub fn parse_strategy(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sentence" | "sentences" => Some(Self::Sentence),
            "fixed_size" | "fixed-size" => Some(Self::FixedSize),
            "smart" => Some(Self::Smart),
            _ => None,
        }
    }
}

/// Options shared by all strategies
///
/// `chunk_size` is a character count. For `sentence` it is the merge floor
/// (a chunk is flushed once it reaches this length); for `fixed_size` the
/// window size; for `smart` the hard maximum. `chunk_overlap` only applies
/// to `fixed_size` and must be smaller than `chunk_size`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            chunk_size: 300,
            chunk_overlap: 50,
        }
    }
}

/// A piece of text produced by the chunker, with its byte offset in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub offset: usize,
    pub content: String,
}

/// Text chunker
///
/// Strategy selection is configuration, not subclassing; the same instance
/// can chunk any number of documents.
#[derive(Debug, Clone)]
pub struct Chunker {
    strategy: ChunkStrategy,
    options: ChunkOptions,
}

/// Sentence-terminal punctuation: CJK and Latin terminators plus newline
fn is_terminator(c: char) -> bool {
    matches!(
        c,
        '。' | '！' | '？' | '；' | '.' | '!' | '?' | ';' | '\n'
    )
}

impl Chunker {
    pub fn new(strategy: ChunkStrategy, options: ChunkOptions) -> Self {
        Self { strategy, options }
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    /// Split text into pieces under the configured strategy
    ///
    /// Empty input yields an empty vec. Input shorter than the configured
    /// size yields exactly one piece covering the whole text.
    pub fn chunk(&self, text: &str) -> Vec<Piece> {
        if text.is_empty() {
            return Vec::new();
        }

        match self.strategy {
            ChunkStrategy::Sentence => self.chunk_sentences(text),
            ChunkStrategy::FixedSize => {
                fixed_windows(text, 0, self.options.chunk_size, self.options.chunk_overlap)
            }
            ChunkStrategy::Smart => self.chunk_smart(text),
        }
    }

    /// Chunk a document into [`Chunk`]s with derived ids
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunk(&document.content)
            .into_iter()
            .enumerate()
            .map(|(i, piece)| Chunk::new(&document.id, i, piece.offset, piece.content))
            .collect()
    }

    /// Group sentences until the chunk reaches the size floor
    fn chunk_sentences(&self, text: &str) -> Vec<Piece> {
        let floor = self.options.chunk_size;
        let mut chunks = Vec::new();
        let mut current: Option<Piece> = None;
        let mut current_len = 0usize;

        for sentence in split_sentences(text) {
            let sentence_len = sentence.content.chars().count();
            current = match current {
                None => {
                    current_len = sentence_len;
                    Some(sentence)
                }
                Some(mut piece) => {
                    piece.content.push(' ');
                    piece.content.push_str(&sentence.content);
                    current_len += 1 + sentence_len;
                    Some(piece)
                }
            };
            if current_len >= floor {
                if let Some(piece) = current.take() {
                    chunks.push(piece);
                }
                current_len = 0;
            }
        }

        if let Some(piece) = current {
            chunks.push(piece);
        }
        chunks
    }

    /// Sentence-aware chunking with `chunk_size` as a hard maximum
    ///
    /// Any single sentence longer than the maximum is split fixed-size
    /// within itself, so no emitted piece exceeds `chunk_size` characters.
    fn chunk_smart(&self, text: &str) -> Vec<Piece> {
        let max = self.options.chunk_size;
        let mut chunks = Vec::new();
        let mut current: Option<Piece> = None;
        let mut current_len = 0usize;

        for sentence in split_sentences(text) {
            let sentence_len = sentence.content.chars().count();

            // Oversized sentence: flush and fall back to fixed windows
            if sentence_len > max {
                if let Some(piece) = current.take() {
                    chunks.push(piece);
                    current_len = 0;
                }
                chunks.extend(fixed_windows(&sentence.content, sentence.offset, max, 0));
                continue;
            }

            current = match current {
                None => {
                    current_len = sentence_len;
                    Some(sentence)
                }
                Some(mut piece) => {
                    if current_len + 1 + sentence_len > max {
                        chunks.push(piece);
                        current_len = sentence_len;
                        Some(sentence)
                    } else {
                        piece.content.push(' ');
                        piece.content.push_str(&sentence.content);
                        current_len += 1 + sentence_len;
                        Some(piece)
                    }
                }
            };
        }

        if let Some(piece) = current {
            chunks.push(piece);
        }
        chunks
    }
}

/// Split text into sentences, keeping terminal punctuation attached
///
/// A sentence ends after a run of terminator characters. Leading and
/// trailing whitespace is dropped; runs of punctuation with no other
/// content are discarded.
fn split_sentences(text: &str) -> Vec<Piece> {
    let mut sentences = Vec::new();
    let mut start: Option<usize> = None;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(i);
        }

        if is_terminator(c) {
            // Consume the rest of the terminator run
            while let Some(&(_, next)) = iter.peek() {
                if is_terminator(next) {
                    iter.next();
                } else {
                    break;
                }
            }
            let end = iter.peek().map(|&(j, _)| j).unwrap_or(text.len());
            if let Some(s) = start.take() {
                push_sentence(&mut sentences, text, s, end);
            }
        }
    }

    if let Some(s) = start {
        push_sentence(&mut sentences, text, s, text.len());
    }
    sentences
}

fn push_sentence(sentences: &mut Vec<Piece>, text: &str, start: usize, end: usize) {
    let content = text[start..end].trim_end();
    if content.chars().any(|c| !is_terminator(c)) {
        sentences.push(Piece {
            offset: start,
            content: content.to_string(),
        });
    }
}

/// Fixed character windows over raw text
///
/// No normalization is applied, so concatenating the windows (minus the
/// configured overlap) reconstructs the input exactly. `base_offset` shifts
/// reported offsets when windowing a slice of a larger document.
fn fixed_windows(text: &str, base_offset: usize, size: usize, overlap: usize) -> Vec<Piece> {
    if text.is_empty() || size == 0 {
        return Vec::new();
    }

    let chars: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let n = chars.len();
    let overlap = overlap.min(size - 1);
    let step = size - overlap;

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(n);
        let byte_start = chars[start];
        let byte_end = if end == n { text.len() } else { chars[end] };
        pieces.push(Piece {
            offset: base_offset + byte_start,
            content: text[byte_start..byte_end].to_string(),
        });
        if end == n {
            break;
        }
        start += step;
    }
    pieces
}
