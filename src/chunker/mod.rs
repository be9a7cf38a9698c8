
pub mod classify;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use classify::{ChunkMetadata, QualityTier, SectionType};

/// Maximum token budget for a single chunk.
pub const CHUNK_SIZE_TOKENS: usize = 800;
/// Sections or trailing buffers below this estimate are dropped.
pub const MIN_CHUNK_TOKENS: usize = 200;
/// Token budget for the sentence overlap carried between adjacent chunks.
pub const CHUNK_OVERLAP_TOKENS: usize = 100;

/// A token-bounded, independently retrievable excerpt of a source document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Path of the source document, unique per document
    pub source_path: String,
    /// File name portion of the source path
    pub source_file: String,
    /// 0-based position of this chunk within its document
    pub chunk_index: usize,
    /// Header or leading-sentence title, when one could be derived
    pub title: Option<String>,
    /// Verbatim excerpt of the source document
    pub content: String,
    /// Markup-stripped text used as embedding input
    pub clean_content: String,
    /// Blended token estimate for `content`
    pub token_count: usize,
    /// XxHash64 of the trimmed content; stable identity across re-index runs
    pub content_hash: String,
    pub metadata: ChunkMetadata,
}

/// Token budgets for the chunker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk size in tokens before paragraph packing kicks in
    pub chunk_size_tokens: usize,
    /// Minimum chunk size in tokens (smaller sections are dropped)
    pub min_chunk_tokens: usize,
    /// Overlap size in tokens carried between adjacent chunks of one section
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size_tokens: CHUNK_SIZE_TOKENS,
            min_chunk_tokens: MIN_CHUNK_TOKENS,
            overlap_tokens: CHUNK_OVERLAP_TOKENS,
        }
    }
}

/// An ordered section of a document, delimited by markdown headers.
#[derive(Debug, Clone)]
struct Section {
    /// Header depth 1-6, or 0 for a header-less preamble
    level: u8,
    /// Section text including its header line
    text: String,
}

/// Split a document into token-bounded, semantically coherent chunks.
///
/// Pure computation: sections are cut at markdown headers, oversized
/// sections are packed paragraph-by-paragraph under the token budget with a
/// sentence overlap carried across the seam, and sections below the minimum
/// are dropped. `chunk_index` increases monotonically across the whole
/// document.
#[inline]
pub fn chunk_document(document_text: &str, source_path: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut chunk_index = 0;

    for section in split_sections(document_text) {
        let pieces = pack_section(&section, config, source_path);
        for piece in pieces {
            chunks.push(classify::build_chunk(
                &piece,
                section.level,
                source_path,
                chunk_index,
            ));
            chunk_index += 1;
        }
    }

    debug!(
        "Chunked {} into {} chunks ({} tokens total)",
        source_path,
        chunks.len(),
        chunks.iter().map(|c| c.token_count).sum::<usize>()
    );

    chunks
}

/// Estimate token count with a blended word/character heuristic.
///
/// Naive whitespace tokenization undercounts for mixed-script text, so the
/// estimate averages an inflated word count with a character-ratio count.
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count() as f64;
    let chars = text.chars().count() as f64;

    (words.mul_add(1.3, chars / 3.5) / 2.0).ceil() as usize
}

/// Split a document into ordered sections at markdown header lines.
/// A header-less document yields a single level-0 section.
fn split_sections(document_text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = String::new();
    let mut current_level = 0u8;

    for line in document_text.lines() {
        if let Some(level) = header_level(line) {
            if !current.trim().is_empty() {
                sections.push(Section {
                    level: current_level,
                    text: current.trim_end().to_string(),
                });
            }
            current = String::new();
            current_level = level;
        }
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        sections.push(Section {
            level: current_level,
            text: current.trim_end().to_string(),
        });
    }

    sections
}

/// Header depth of a line (1-6 leading marks followed by a space), if any.
fn header_level(line: &str) -> Option<u8> {
    let trimmed = line.trim_start();
    let marks = trimmed.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&marks) {
        let rest = trimmed.chars().nth(marks);
        if rest.is_none_or(|c| c == ' ' || c == '\t') {
            return Some(marks as u8);
        }
    }
    None
}

/// Pack one section into chunk-sized pieces of text.
fn pack_section(section: &Section, config: &ChunkerConfig, source_path: &str) -> Vec<String> {
    let estimate = estimate_token_count(&section.text);

    if estimate <= config.chunk_size_tokens {
        if estimate >= config.min_chunk_tokens {
            return vec![section.text.clone()];
        }
        debug!(
            "Dropping {}-token section of {} (below {}-token minimum)",
            estimate, source_path, config.min_chunk_tokens
        );
        return Vec::new();
    }

    let mut packer = ParagraphPacker::new(config);
    for paragraph in split_paragraphs(&section.text) {
        if estimate_token_count(&paragraph) > config.chunk_size_tokens {
            // A single paragraph over budget is packed sentence by sentence.
            for sentence in split_sentences(&paragraph) {
                packer.push(&sentence, " ");
            }
        } else {
            packer.push(&paragraph, "\n\n");
        }
    }
    packer.finish()
}

/// Greedy paragraph packer with sentence-overlap seeding between flushes.
struct ParagraphPacker<'a> {
    config: &'a ChunkerConfig,
    buffer: String,
    pieces: Vec<String>,
}

impl<'a> ParagraphPacker<'a> {
    fn new(config: &'a ChunkerConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            pieces: Vec::new(),
        }
    }

    fn push(&mut self, unit: &str, separator: &str) {
        if self.buffer.is_empty() {
            self.buffer = unit.to_string();
            return;
        }

        let unit_tokens = estimate_token_count(unit);
        let buffer_tokens = estimate_token_count(&self.buffer);

        // The budget check applies to every push, including into a buffer
        // freshly seeded with overlap. A buffer of overlap plus one unit is
        // always a valid flush, so a seed never forces a loop, and no chunk
        // grows past the budget by more than the overlap allowance.
        if buffer_tokens + unit_tokens > self.config.chunk_size_tokens {
            let flushed = std::mem::take(&mut self.buffer);
            let overlap = extract_overlap(&flushed, self.config.overlap_tokens);
            self.pieces.push(flushed);

            if overlap.is_empty() {
                self.buffer = unit.to_string();
            } else {
                self.buffer = format!("{overlap}\n\n{unit}");
            }
            return;
        }

        self.buffer.push_str(separator);
        self.buffer.push_str(unit);
    }

    fn finish(mut self) -> Vec<String> {
        // The trailing buffer is kept only if it meets the minimum.
        if estimate_token_count(&self.buffer) >= self.config.min_chunk_tokens {
            self.pieces.push(self.buffer);
        }
        self.pieces
    }
}

/// Last 1-2 sentences of a flushed buffer, truncated to the overlap budget.
fn extract_overlap(content: &str, overlap_tokens: usize) -> String {
    if overlap_tokens == 0 {
        return String::new();
    }

    let sentences = split_sentences(content);
    let mut overlap = match sentences.as_slice() {
        [] => return String::new(),
        [.., a, b] if estimate_token_count(a) + estimate_token_count(b) <= overlap_tokens => {
            format!("{a} {b}")
        }
        [.., last] => last.clone(),
    };

    // A single oversized sentence is trimmed from the front, keeping the
    // words closest to the seam.
    while estimate_token_count(&overlap) > overlap_tokens {
        let mut words = overlap.split_whitespace();
        words.next();
        let rest = words.collect::<Vec<_>>().join(" ");
        if rest.is_empty() || rest == overlap {
            return String::new();
        }
        overlap = rest;
    }

    overlap
}

/// Split text into paragraphs at blank-line boundaries.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                paragraphs.push(current.trim_end().to_string());
            }
            current = String::new();
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim_end().to_string());
    }

    paragraphs
}

/// Split text into sentences on terminal punctuation.
pub(crate) fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '…') {
            let boundary = chars.peek().is_none_or(|next| next.is_whitespace());
            if boundary {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current = String::new();
            }
        }
    }

    let sentence = current.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }

    sentences
}
