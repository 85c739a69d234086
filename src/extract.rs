//! Heuristic text scanners: citation markers in free text, and
//! title/authors/abstract/year from raw document text.
//!
//! None of these functions fail. Text that matches nothing yields an empty
//! list or empty fields.

use crate::models::{CitationMarker, ExtractedMetadata, MarkerKind};

use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static MARKER_PATTERNS: Lazy<Vec<(MarkerKind, Regex)>> = Lazy::new(|| {
    vec![
        // [12]
        (
            MarkerKind::IeeeNumeric,
            Regex::new(r"\[(\d+)\]").expect("valid numeric marker regex"),
        ),
        // (Smith, 2023), (Jones et al., 2022)
        (
            MarkerKind::AuthorYear,
            Regex::new(r"\(([A-Z][a-z]+(?:\s+et\s+al\.)?),?\s+(\d{4})\)")
                .expect("valid author-year marker regex"),
        ),
        (
            MarkerKind::Superscript,
            Regex::new(r"[¹²³⁴⁵⁶⁷⁸⁹⁰]").expect("valid superscript marker regex"),
        ),
    ]
});

static NAME_PAIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][a-z]+\s+[A-Z][a-z]+").expect("valid name pair regex"));
static ABSTRACT_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^abstract[:\-\s]*").expect("valid abstract regex"));
static NUMBERED_SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.?\s").expect("valid section regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("valid year regex"));

const TITLE_CHARS: std::ops::Range<usize> = 10..200;

const AUTHORS_CHARS: std::ops::Range<usize> = 5..150;

/// Scan lines kept by the metadata heuristics.
const METADATA_SCAN_LINES: usize = 20;

/// Abstract continuation window, counted from the "Abstract" line.
const ABSTRACT_WINDOW: usize = 10;

const EARLIEST_YEAR: i32 = 1990;

// ============================================================================
// Citation Markers
// ============================================================================

/// Find every citation marker in `text`, ordered by character position.
///
/// Each pattern is scanned independently over the whole text. Hits with the
/// same matched text at the same position are reported once.
pub fn extract_citations(text: &str) -> Vec<CitationMarker> {
    let mut markers: Vec<CitationMarker> = Vec::new();

    for (kind, re) in MARKER_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let reference = caps
                .get(1)
                .map(|m| m.as_str())
                .unwrap_or(whole.as_str());
            markers.push(CitationMarker {
                kind: *kind,
                matched: whole.as_str().to_string(),
                position: char_offset(text, whole.start()),
                reference: reference.to_string(),
            });
        }
    }

    let mut unique: Vec<CitationMarker> = Vec::with_capacity(markers.len());
    for marker in markers {
        if !unique
            .iter()
            .any(|m| m.matched == marker.matched && m.position == marker.position)
        {
            unique.push(marker);
        }
    }
    unique.sort_by_key(|m| m.position);
    unique
}

fn char_offset(text: &str, byte_offset: usize) -> usize {
    text[..byte_offset].chars().count()
}

// ============================================================================
// Document Metadata
// ============================================================================

/// Best-guess title, authors and abstract from the first non-blank lines.
///
/// Lines are visited in order. A line can fill at most one field. The title
/// is the first line of 10 to 199 characters that is either the very first line
/// or entirely upper case. The authors line is the next line of 5 to 149
/// characters containing a comma or a "Firstname Lastname" pair. Scanning stops at
/// the first line starting with "abstract", which collects up to nine
/// following lines until a new section begins.
pub fn extract_metadata(content: &str) -> ExtractedMetadata {
    let lines: Vec<&str> = content
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut meta = ExtractedMetadata::default();

    for (i, line) in lines.iter().take(METADATA_SCAN_LINES).enumerate() {
        let len = line.chars().count();

        if meta.title.is_empty() && TITLE_CHARS.contains(&len) {
            if *line == line.to_uppercase() || i == 0 {
                meta.title = line.to_string();
                continue;
            }
        }

        if meta.authors.is_empty() && AUTHORS_CHARS.contains(&len) {
            if line.contains(',') || NAME_PAIR_RE.is_match(line) {
                meta.authors = line.to_string();
                continue;
            }
        }

        if line.to_lowercase().starts_with("abstract") {
            let mut text = ABSTRACT_PREFIX_RE.replace(line, "").into_owned();

            let end = lines.len().min(i + ABSTRACT_WINDOW);
            for next in lines.iter().take(end).skip(i + 1) {
                let lower = next.to_lowercase();
                let new_section = lower.starts_with("introduction")
                    || lower.starts_with("keywords")
                    || NUMBERED_SECTION_RE.is_match(next);
                if new_section {
                    break;
                }
                text.push(' ');
                text.push_str(next);
            }

            meta.abstract_text = text.trim().to_string();
            break;
        }
    }

    meta
}

/// Most recent plausible publication year mentioned in `content`.
pub fn extract_year(content: &str) -> Option<i32> {
    extract_year_as_of(content, Utc::now().year())
}

/// Largest four-digit token in `[1990, current_year]`, if any.
pub fn extract_year_as_of(content: &str, current_year: i32) -> Option<i32> {
    YEAR_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<i32>().ok())
        .filter(|y| (EARLIEST_YEAR..=current_year).contains(y))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(markers: &[CitationMarker]) -> Vec<(MarkerKind, &str, usize, &str)> {
        markers
            .iter()
            .map(|m| (m.kind, m.matched.as_str(), m.position, m.reference.as_str()))
            .collect()
    }

    #[test]
    fn test_extracts_all_marker_kinds_in_position_order() {
        let text = "As shown (Smith, 2020) and [3], see also¹ and (Jones et al., 2019).";
        let markers = extract_citations(text);
        assert_eq!(
            summary(&markers),
            vec![
                (MarkerKind::AuthorYear, "(Smith, 2020)", 9, "Smith"),
                (MarkerKind::IeeeNumeric, "[3]", 27, "3"),
                (MarkerKind::Superscript, "¹", 40, "¹"),
                (MarkerKind::AuthorYear, "(Jones et al., 2019)", 46, "Jones et al."),
            ]
        );
    }

    #[test]
    fn test_positions_are_character_offsets() {
        // "é" is two bytes but one character.
        let markers = extract_citations("é [1]");
        assert_eq!(markers[0].position, 2);
    }

    #[test]
    fn test_extraction_is_deterministic_and_unique() {
        let text = "[1] [1] [2] (Doe 2001) ²³";
        let first = extract_citations(text);
        let second = extract_citations(text);
        assert_eq!(first, second);

        for (i, a) in first.iter().enumerate() {
            for b in &first[i + 1..] {
                assert!(!(a.matched == b.matched && a.position == b.position));
            }
        }
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn test_no_markers_in_plain_text() {
        assert!(extract_citations("nothing to see here (lowercase, 2020)").is_empty());
        assert!(extract_citations("").is_empty());
    }

    #[test]
    fn test_metadata_from_typical_first_page() {
        let content = "\n  Attention Is All You Need  \nAshish Vaswani, Noam Shazeer\nGoogle Brain\nAbstract: The dominant sequence models\nare based on recurrent networks.\n1 Introduction\nRecurrent networks...";
        let meta = extract_metadata(content);
        assert_eq!(meta.title, "Attention Is All You Need");
        assert_eq!(meta.authors, "Ashish Vaswani, Noam Shazeer");
        assert_eq!(
            meta.abstract_text,
            "The dominant sequence models are based on recurrent networks."
        );
    }

    #[test]
    fn test_metadata_uppercase_title_after_short_first_line() {
        let content = "arXiv\nA STUDY OF CLIMATE MODELS\nJane Doe\nABSTRACT\nWe study things.\nKeywords: climate";
        let meta = extract_metadata(content);
        assert_eq!(meta.title, "A STUDY OF CLIMATE MODELS");
        assert_eq!(meta.authors, "Jane Doe");
        assert_eq!(meta.abstract_text, "We study things.");
    }

    #[test]
    fn test_metadata_abstract_window_is_bounded() {
        let mut content = String::from("Some Reasonable Title Here\nAbstract");
        for i in 0..15 {
            content.push_str(&format!("\nline{}", i));
        }
        let meta = extract_metadata(&content);
        // nine lines after the heading
        assert_eq!(
            meta.abstract_text,
            "line0 line1 line2 line3 line4 line5 line6 line7 line8"
        );
    }

    #[test]
    fn test_metadata_length_bounds_are_inclusive_below() {
        // exactly 10 and 5 characters
        let meta = extract_metadata("Ten chars!\nA, Bc\nAbstract: x");
        assert_eq!(meta.title, "Ten chars!");
        assert_eq!(meta.authors, "A, Bc");

        let meta = extract_metadata("Nine char\nA, B\nAbstract: x");
        assert_eq!(meta.title, "");
        assert_eq!(meta.authors, "");
    }

    #[test]
    fn test_metadata_of_empty_text_is_blank() {
        assert_eq!(extract_metadata(""), ExtractedMetadata::default());
        assert_eq!(extract_metadata("short"), ExtractedMetadata::default());
    }

    #[test]
    fn test_extract_year_takes_most_recent_in_range() {
        assert_eq!(extract_year_as_of("... 1998 ... 2021 ... 1500 ...", 2024), Some(2021));
        assert_eq!(extract_year_as_of("published 2030, revised 2019", 2024), Some(2019));
        assert_eq!(extract_year_as_of("no years, only 12345 and 1200", 2024), None);
        assert_eq!(extract_year("written in 1995"), Some(1995));
    }
}
