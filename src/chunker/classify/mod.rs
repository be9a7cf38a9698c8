#[cfg(test)]
mod tests;

use std::hash::Hasher;
use std::path::Path;
use std::sync::OnceLock;

use fancy_regex::Regex;
use pulldown_cmark::{Event, Options, Parser};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use super::{Chunk, estimate_token_count, split_sentences};

/// Structural role of a chunk, assigned by an ordered first-match-wins
/// rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Code,
    CodeExample,
    Chapter,
    Section,
    Philosophy,
    Example,
    Practice,
    Definition,
    Instruction,
    General,
}

impl SectionType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SectionType::Code => "code",
            SectionType::CodeExample => "code_example",
            SectionType::Chapter => "chapter",
            SectionType::Section => "section",
            SectionType::Philosophy => "philosophy",
            SectionType::Example => "example",
            SectionType::Practice => "practice",
            SectionType::Definition => "definition",
            SectionType::Instruction => "instruction",
            SectionType::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }
}

/// Structured metadata derived per chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub category: String,
    pub section_type: SectionType,
    /// Header depth of the originating section, 0-6
    pub semantic_level: u8,
    pub has_code: bool,
    pub has_philosophy: bool,
    pub quality_tier: QualityTier,
    /// Lower-case dictionary hits, ordered and deduplicated, at most 10
    pub keywords: Vec<String>,
}

const MAX_KEYWORDS: usize = 10;

/// Fixed term dictionaries scanned in order for keyword extraction.
/// The corpus mixes Russian and English long-form writing.
static PHILOSOPHY_TERMS: &[&str] = &[
    "философия",
    "принцип",
    "смысл",
    "ценность",
    "мудрость",
    "осознанность",
    "этика",
    "philosophy",
    "principle",
    "meaning",
    "wisdom",
    "mindfulness",
];

static PRACTICE_TERMS: &[&str] = &[
    "практика",
    "упражнение",
    "привычка",
    "метод",
    "ритуал",
    "дисциплина",
    "practice",
    "exercise",
    "habit",
    "method",
    "routine",
    "discipline",
];

static CONCEPT_TERMS: &[&str] = &[
    "система",
    "модель",
    "стратегия",
    "процесс",
    "алгоритм",
    "структура",
    "system",
    "model",
    "strategy",
    "process",
    "algorithm",
    "structure",
];

/// Ordered path-substring heuristics for the document category.
/// First match wins; the default is `general`.
static CATEGORY_RULES: &[(&[&str], &str)] = &[
    (&["philosophy", "философ"], "philosophy"),
    (&["practice", "практик", "habit"], "practice"),
    (&["code", "dev", "код", "програм"], "development"),
    (&["health", "здоров"], "health"),
    (&["business", "бизнес", "финанс"], "business"),
    (&["journal", "note", "заметк", "дневник"], "notes"),
];

/// Signals feeding the section-type rule table.
pub(crate) struct SectionSignals<'a> {
    pub clean_lower: &'a str,
    pub code_density: f64,
    pub has_fence: bool,
    pub level: u8,
}

/// Ordered `(predicate, label)` pairs evaluated top-to-bottom; the first
/// matching predicate wins.
static SECTION_TYPE_RULES: &[(fn(&SectionSignals) -> bool, SectionType)] = &[
    (|s| s.code_density >= 0.4, SectionType::Code),
    (|s| s.has_fence, SectionType::CodeExample),
    (|s| s.level == 1, SectionType::Chapter),
    (|s| s.level == 2, SectionType::Section),
    (
        |s| contains_any(s.clean_lower, PHILOSOPHY_TERMS),
        SectionType::Philosophy,
    ),
    (
        |s| contains_any(s.clean_lower, &["например", "пример", "for example", "e.g."]),
        SectionType::Example,
    ),
    (
        |s| contains_any(s.clean_lower, PRACTICE_TERMS),
        SectionType::Practice,
    ),
    (
        |s| contains_any(s.clean_lower, &["определение", "— это", "термин", "definition", "is defined as"]),
        SectionType::Definition,
    ),
    (
        |s| contains_any(s.clean_lower, &["шаг ", "инструкция", "как ", "how to", "step "]),
        SectionType::Instruction,
    ),
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn has_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"```|~~~|`[^`\n]+`|\bfn\s+\w+\s*\(|\bdef\s+\w+\s*\(|\bclass\s+\w+")
            .expect("code regex is valid")
    })
}

fn has_philosophy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)философ|мудрост|осознанн|смысл жизни|ценност|philosoph|wisdom|mindful")
            .expect("philosophy regex is valid")
    })
}

/// Assemble a [`Chunk`] from an accepted piece of section text.
pub(crate) fn build_chunk(
    piece: &str,
    semantic_level: u8,
    source_path: &str,
    chunk_index: usize,
) -> Chunk {
    let content = piece.trim().to_string();
    let clean_content = clean_content(&content);
    let clean_lower = clean_content.to_lowercase();

    let has_fence = content.contains("```") || content.contains("~~~");
    let signals = SectionSignals {
        clean_lower: &clean_lower,
        code_density: code_density(&content),
        has_fence,
        level: semantic_level,
    };

    let has_code = has_code_regex().is_match(&content).unwrap_or(false);
    let has_philosophy = has_philosophy_regex().is_match(&content).unwrap_or(false);

    let token_count = estimate_token_count(&content);
    let metadata = ChunkMetadata {
        category: categorize_path(source_path),
        section_type: classify_section_type(&signals),
        semantic_level,
        has_code,
        has_philosophy,
        quality_tier: quality_tier(&content, &clean_content, has_code),
        keywords: extract_keywords(&clean_lower),
    };

    let title = derive_title(&content, &clean_content);
    let content_hash = content_hash(&content);

    Chunk {
        source_path: source_path.to_string(),
        source_file: source_file_name(source_path),
        chunk_index,
        title,
        content,
        clean_content,
        token_count,
        content_hash,
        metadata,
    }
}

/// Strip markdown down to visible text for embedding input: header marks,
/// emphasis, code fences, link syntax, decorative symbols and control
/// characters all go; whitespace collapses to single spaces.
#[inline]
pub fn clean_content(content: &str) -> String {
    let mut text = String::with_capacity(content.len());
    let parser = Parser::new_ext(content, Options::empty());

    for event in parser {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            Event::End(_) => text.push(' '),
            _ => {}
        }
    }

    let filtered: String = text
        .chars()
        .map(|c| if is_decorative(c) || c.is_control() { ' ' } else { c })
        .collect();

    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_decorative(c: char) -> bool {
    matches!(c,
        '\u{2190}'..='\u{21FF}'   // arrows
        | '\u{2500}'..='\u{257F}' // box drawing
        | '\u{25A0}'..='\u{25FF}' // geometric shapes
        | '\u{2600}'..='\u{27BF}' // misc symbols, dingbats
        | '\u{1F300}'..='\u{1FAFF}' // emoji blocks
    )
}

/// First header text, else a 10-100 character first sentence, else nothing.
fn derive_title(content: &str, clean_content: &str) -> Option<String> {
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let title = trimmed.trim_start_matches('#').trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }

    split_sentences(clean_content)
        .into_iter()
        .next()
        .filter(|s| (10..=100).contains(&s.chars().count()))
}

fn classify_section_type(signals: &SectionSignals<'_>) -> SectionType {
    SECTION_TYPE_RULES
        .iter()
        .find(|(predicate, _)| predicate(signals))
        .map_or(SectionType::General, |&(_, label)| label)
}

/// Fraction of lines inside fenced code blocks.
fn code_density(content: &str) -> f64 {
    let mut in_fence = false;
    let mut code_lines = 0usize;
    let mut total_lines = 0usize;

    for line in content.lines() {
        total_lines += 1;
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            code_lines += 1;
        } else if in_fence {
            code_lines += 1;
        }
    }

    if total_lines == 0 {
        0.0
    } else {
        code_lines as f64 / total_lines as f64
    }
}

/// Additive quality score over length, sentence count, structure, examples
/// and code presence.
fn quality_tier(content: &str, clean_content: &str, has_code: bool) -> QualityTier {
    let mut score = 0u32;

    let chars = clean_content.chars().count();
    if chars >= 400 {
        score += 1;
    }
    if chars >= 1200 {
        score += 1;
    }

    if split_sentences(clean_content).len() >= 3 {
        score += 1;
    }

    let structural = content.lines().any(|line| {
        let t = line.trim_start();
        t.starts_with("- ")
            || t.starts_with("* ")
            || t.starts_with('#')
            || t.chars().next().is_some_and(|c| c.is_ascii_digit()) && t.contains(". ")
    });
    if structural {
        score += 1;
    }

    let lower = clean_content.to_lowercase();
    if contains_any(&lower, &["например", "пример", "for example", "e.g."]) {
        score += 1;
    }

    if has_code {
        score += 1;
    }

    match score {
        4.. => QualityTier::High,
        2..=3 => QualityTier::Medium,
        _ => QualityTier::Low,
    }
}

/// Ordered, deduplicated dictionary hits, capped at [`MAX_KEYWORDS`].
fn extract_keywords(clean_lower: &str) -> Vec<String> {
    let mut keywords = Vec::new();

    for dictionary in [PHILOSOPHY_TERMS, PRACTICE_TERMS, CONCEPT_TERMS] {
        for term in dictionary {
            if keywords.len() >= MAX_KEYWORDS {
                return keywords;
            }
            if clean_lower.contains(term) && !keywords.iter().any(|k| k == term) {
                keywords.push((*term).to_string());
            }
        }
    }

    keywords
}

/// Category from ordered path-substring heuristics; default `general`.
#[inline]
pub fn categorize_path(source_path: &str) -> String {
    let lower = source_path.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(needles, _)| contains_any(&lower, needles))
        .map_or_else(|| "general".to_string(), |&(_, label)| label.to_string())
}

/// XxHash64 over the trimmed content, formatted as 16 hex digits.
#[inline]
pub fn content_hash(content: &str) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(content.trim().as_bytes());
    format!("{:016x}", hasher.finish())
}

fn source_file_name(source_path: &str) -> String {
    Path::new(source_path)
        .file_name()
        .map_or_else(|| source_path.to_string(), |f| f.to_string_lossy().into_owned())
}
