// Card synthesis module
// Turns a ranked result set into a bounded, diverse set of display cards.
// Pure computation over the retrieval output; cards are never persisted.


use itertools::Itertools;
use serde::Serialize;
use tracing::debug;

use crate::chunker::classify::clean_content;
use crate::search::RankedChunk;

/// Character budget for the card body
const MAX_CONTENT_CHARS: usize = 300;
/// Character budget for the card summary
const MAX_SUMMARY_CHARS: usize = 150;
const MAX_TAGS: usize = 5;
const MAX_CODE_EXAMPLES: usize = 3;
const MAX_KEY_PRINCIPLES: usize = 5;
/// A list item outside this stripped length is noise, not a principle
const PRINCIPLE_MIN_CHARS: usize = 10;
const PRINCIPLE_MAX_CHARS: usize = 150;

/// A bounded, renderer-agnostic excerpt prepared for visual display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarouselCard {
    pub id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub category: String,
    pub tags: Vec<String>,
    pub source_file: String,
    pub relevance_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_examples: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_principles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardOptions {
    pub max_cards: usize,
    pub include_code_examples: bool,
    pub group_by_category: bool,
}

impl Default for CardOptions {
    #[inline]
    fn default() -> Self {
        Self {
            max_cards: 5,
            include_code_examples: false,
            group_by_category: false,
        }
    }
}

/// Synthesize display cards from a ranked result set.
///
/// An empty input yields an empty card list; whether that is an error is
/// the caller's decision.
#[inline]
pub fn synthesize(ranked: &[RankedChunk], options: &CardOptions) -> Vec<CarouselCard> {
    if ranked.is_empty() || options.max_cards == 0 {
        return Vec::new();
    }

    let selected = if options.group_by_category {
        balance_by_category(ranked, options.max_cards)
    } else {
        ranked.iter().take(options.max_cards).collect()
    };

    debug!("Synthesizing {} cards", selected.len());
    selected
        .into_iter()
        .map(|chunk| build_card(chunk, options))
        .collect()
}

/// Round-robin across category buckets so one dominant category cannot
/// crowd out the rest. Buckets keep their chunks in overall rank order and
/// are visited in order of their best-ranked member; no bucket contributes
/// more than `ceil(max_cards / bucket_count)` cards.
fn balance_by_category(ranked: &[RankedChunk], max_cards: usize) -> Vec<&RankedChunk> {
    let mut buckets: Vec<(&str, Vec<&RankedChunk>)> = Vec::new();
    for chunk in ranked {
        let category = chunk.record.category.as_str();
        match buckets.iter_mut().find(|(name, _)| *name == category) {
            Some((_, bucket)) => bucket.push(chunk),
            None => buckets.push((category, vec![chunk])),
        }
    }

    let per_bucket_cap = max_cards.div_ceil(buckets.len());
    let mut selected: Vec<&RankedChunk> = Vec::with_capacity(max_cards);
    let mut cursors = vec![0_usize; buckets.len()];

    'outer: loop {
        let mut advanced = false;
        for (i, (_, bucket)) in buckets.iter().enumerate() {
            if selected.len() == max_cards {
                break 'outer;
            }
            let taken = cursors[i];
            if taken < per_bucket_cap && taken < bucket.len() {
                selected.push(bucket[taken]);
                cursors[i] += 1;
                advanced = true;
            }
        }
        if !advanced {
            break;
        }
    }

    selected
}

fn build_card(chunk: &RankedChunk, options: &CardOptions) -> CarouselCard {
    let record = &chunk.record;

    let title = record
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| first_sentence(&record.clean_content))
        .unwrap_or_else(|| record.source_file.clone());

    let summary_source = first_paragraph(&record.content);
    let summary = truncate_at_word_boundary(&clean_content(summary_source), MAX_SUMMARY_CHARS);
    let content = truncate_at_word_boundary(record.content.trim(), MAX_CONTENT_CHARS);

    let code_examples = if options.include_code_examples {
        let blocks = extract_code_blocks(&record.content);
        if blocks.is_empty() { None } else { Some(blocks) }
    } else {
        None
    };

    let principles = extract_key_principles(&record.content);
    let key_principles = if principles.is_empty() {
        None
    } else {
        Some(principles)
    };

    CarouselCard {
        id: format!("card-{}", record.content_hash),
        title,
        content,
        summary,
        category: record.category.clone(),
        tags: build_tags(record),
        source_file: record.source_file.clone(),
        relevance_score: chunk.combined_score,
        code_examples,
        key_principles,
    }
}

fn build_tags(record: &crate::database::sqlite::ChunkRecord) -> Vec<String> {
    std::iter::once(record.category.clone())
        .chain(std::iter::once(record.section_type.as_str().to_string()))
        .chain(record.keyword_list())
        .unique()
        .take(MAX_TAGS)
        .collect()
}

/// Truncate to at most `max_chars` characters, cutting back to the last
/// word boundary. Counted in characters, not bytes, so multi-byte scripts
/// are never split mid-character.
fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let prefix: Vec<char> = text.chars().take(max_chars).collect();
    let cut = match prefix.iter().rposition(|c| c.is_whitespace()) {
        Some(boundary) if boundary > 0 => boundary,
        _ => prefix.len(),
    };
    prefix[..cut].iter().collect::<String>().trim_end().to_string()
}

fn first_paragraph(content: &str) -> &str {
    content
        .trim()
        .split("\n\n")
        .find(|paragraph| !paragraph.trim().is_empty())
        .unwrap_or("")
}

fn first_sentence(text: &str) -> Option<String> {
    let sentences = crate::chunker::split_sentences(text);
    sentences
        .into_iter()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .map(|s| truncate_at_word_boundary(&s, MAX_SUMMARY_CHARS))
}

/// Collect up to three fenced code blocks, fences and info strings stripped.
fn extract_code_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            match current.take() {
                Some(lines) => {
                    let block = lines.join("\n").trim().to_string();
                    if !block.is_empty() {
                        blocks.push(block);
                        if blocks.len() == MAX_CODE_EXAMPLES {
                            break;
                        }
                    }
                }
                None => current = Some(Vec::new()),
            }
        } else if let Some(lines) = &mut current {
            lines.push(line);
        }
    }

    blocks
}

/// Collect up to five list items whose stripped text falls in the
/// principle length band.
fn extract_key_principles(content: &str) -> Vec<String> {
    let mut principles = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_start();
        let item = if let Some(rest) = trimmed.strip_prefix("- ") {
            Some(rest)
        } else if let Some(rest) = trimmed.strip_prefix("* ") {
            Some(rest)
        } else {
            trimmed
                .split_once(". ")
                .filter(|(prefix, _)| !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()))
                .map(|(_, rest)| rest)
        };

        let Some(item) = item else { continue };
        let stripped = clean_content(item);
        let length = stripped.chars().count();
        if (PRINCIPLE_MIN_CHARS..=PRINCIPLE_MAX_CHARS).contains(&length) {
            principles.push(stripped);
            if principles.len() == MAX_KEY_PRINCIPLES {
                break;
            }
        }
    }

    principles
}
