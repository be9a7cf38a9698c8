use super::*;

#[test]
fn categories_follow_path_heuristics() {
    assert_eq!(categorize_path("philosophy/stoicism.md"), "philosophy");
    assert_eq!(categorize_path("Философия/дихотомия.md"), "philosophy");
    assert_eq!(categorize_path("habits/morning.md"), "practice");
    assert_eq!(categorize_path("dev/rust-notes.md"), "development");
    assert_eq!(categorize_path("здоровье/сон.md"), "health");
    assert_eq!(categorize_path("random/misc.md"), "general");
}

#[test]
fn content_hash_ignores_surrounding_whitespace() {
    assert_eq!(content_hash("стабильный текст"), content_hash("  стабильный текст \n"));
    assert_ne!(content_hash("один"), content_hash("другой"));

    let hash = content_hash("anything");
    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn clean_content_strips_markup_to_visible_text() {
    let markdown = "# Заголовок\n\nSome **bold** text with [a link](https://example.com) and `code`. 🚀";
    let clean = clean_content(markdown);

    assert!(clean.contains("Заголовок"));
    assert!(clean.contains("bold"));
    assert!(clean.contains("a link"));
    assert!(clean.contains("code"));
    assert!(!clean.contains('#'));
    assert!(!clean.contains("**"));
    assert!(!clean.contains("https://example.com"));
    assert!(!clean.contains('🚀'));
    // Whitespace collapses to single spaces.
    assert!(!clean.contains("  "));
}

#[test]
fn title_prefers_header_over_first_sentence() {
    let with_header = build_chunk("## Утренний ритуал\n\nТекст секции.", 2, "practice/a.md", 0);
    assert_eq!(with_header.title.as_deref(), Some("Утренний ритуал"));

    let from_sentence = build_chunk(
        "Discipline is the bridge between goals and results. More follows.",
        0,
        "notes/a.md",
        0,
    );
    assert_eq!(
        from_sentence.title.as_deref(),
        Some("Discipline is the bridge between goals and results.")
    );

    // A first sentence outside the 10-100 char band yields no title.
    let too_short = build_chunk("Hi. Then a much longer second sentence follows here.", 0, "notes/a.md", 0);
    assert_eq!(too_short.title, None);
}

#[test]
fn section_type_rules_apply_in_order() {
    // Mostly fenced lines classify as code regardless of level.
    let code = build_chunk("```rust\nfn main() {}\nlet x = 1;\n```\nnote", 3, "dev/a.md", 0);
    assert_eq!(code.metadata.section_type, SectionType::Code);

    // A fence inside prose is a code example.
    let example = build_chunk(
        "Много пояснительного текста вокруг вставки.\nЕщё строки текста здесь.\nИ ещё одна строка.\nПлюс дополнительная.\n```\nlet x = 1;\n```\nЗаключение после вставки.\nФинальная строка текста.\nСовсем финальная.\nИ последняя строка.",
        3,
        "dev/a.md",
        0,
    );
    assert_eq!(example.metadata.section_type, SectionType::CodeExample);

    let chapter = build_chunk("# Глава\n\nОбычный текст.", 1, "notes/a.md", 0);
    assert_eq!(chapter.metadata.section_type, SectionType::Chapter);

    let section = build_chunk("## Раздел\n\nОбычный текст.", 2, "notes/a.md", 0);
    assert_eq!(section.metadata.section_type, SectionType::Section);

    let philosophy = build_chunk("### Тема\n\nФилософия повседневной жизни.", 3, "notes/a.md", 0);
    assert_eq!(philosophy.metadata.section_type, SectionType::Philosophy);

    let example_marker = build_chunk("### Тема\n\nНапример, утренний распорядок.", 3, "notes/a.md", 0);
    assert_eq!(example_marker.metadata.section_type, SectionType::Example);

    let general = build_chunk("Обычный текст без маркеров.", 0, "notes/a.md", 0);
    assert_eq!(general.metadata.section_type, SectionType::General);
}

#[test]
fn code_detection_covers_fences_and_signatures() {
    let fenced = build_chunk("Текст.\n```\nx = 1\n```", 3, "dev/a.md", 0);
    assert!(fenced.metadata.has_code);

    let inline = build_chunk("Вызовите `cargo build` в терминале.", 3, "dev/a.md", 0);
    assert!(inline.metadata.has_code);

    let signature = build_chunk("Пример: fn parse(input: &str) возвращает результат.", 3, "dev/a.md", 0);
    assert!(signature.metadata.has_code);

    let prose = build_chunk("Просто обычный текст без кода.", 3, "notes/a.md", 0);
    assert!(!prose.metadata.has_code);
}

#[test]
fn philosophy_detection_is_case_insensitive() {
    let russian = build_chunk("Мудрость приходит с опытом.", 0, "notes/a.md", 0);
    assert!(russian.metadata.has_philosophy);

    let english = build_chunk("A short note on Philosophy of mind.", 0, "notes/a.md", 0);
    assert!(english.metadata.has_philosophy);

    let neither = build_chunk("Список покупок на неделю.", 0, "notes/a.md", 0);
    assert!(!neither.metadata.has_philosophy);
}

#[test]
fn quality_tier_rewards_length_structure_and_examples() {
    let rich = format!(
        "## Практика\n\n{}\n\n- Первый пункт списка\n- Второй пункт списка\n\nНапример, `cargo test` запускает проверки.",
        "Это насыщенное предложение с деталями и контекстом. ".repeat(12)
    );
    let high = build_chunk(&rich, 2, "practice/a.md", 0);
    assert_eq!(high.metadata.quality_tier, QualityTier::High);

    let low = build_chunk("Коротко.", 0, "notes/a.md", 0);
    assert_eq!(low.metadata.quality_tier, QualityTier::Low);
}

#[test]
fn keywords_are_ordered_deduplicated_and_capped() {
    let text = "Философия и практика: система привычек, дисциплина, модель, стратегия, \
                процесс, алгоритм, структура, метод, ритуал и снова философия.";
    let chunk = build_chunk(text, 0, "notes/a.md", 0);

    let keywords = &chunk.metadata.keywords;
    assert_eq!(keywords.len(), 10);
    // Dictionary order: philosophy terms first, then practice, then concepts.
    assert_eq!(keywords[0], "философия");
    assert!(keywords.contains(&"практика".to_string()));
    // No duplicates despite repeated mentions.
    let unique: std::collections::HashSet<&String> = keywords.iter().collect();
    assert_eq!(unique.len(), keywords.len());
}

#[test]
fn source_file_is_the_path_basename() {
    let chunk = build_chunk("## Раздел\n\nТекст.", 2, "philosophy/nested/file.md", 0);
    assert_eq!(chunk.source_file, "file.md");
    assert_eq!(chunk.source_path, "philosophy/nested/file.md");
}
