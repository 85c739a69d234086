//! Reference formatting: full references in IEEE/APA/MLA/Chicago, in-text
//! markers for a working set of papers, and bibliographies built from the
//! citations stored in the library.
//!
//! Formatting never fails. Missing fields render as fixed placeholders
//! ("Unknown Author", "Untitled", "n.d." ...), so identical input always
//! yields an identical string.

use crate::error::StoreResult;
use crate::models::{BibliographyEntry, CitationStyle, CitationWithPaper, InTextCitation, Paper};
use crate::store::Library;

use chrono::{Datelike, Utc};

#[cfg(test)]
#[path = "citations_test.rs"]
mod citations_test;

const UNKNOWN_AUTHOR: &str = "Unknown Author";
const UNTITLED: &str = "Untitled";

/// Venue placeholder for references rendered from arbitrary records.
pub const UNKNOWN_VENUE: &str = "Unknown Venue";

/// Venue placeholder for references generated from the library, whose
/// venue-less records come from arXiv ingestion.
pub const INGESTED_VENUE: &str = "arXiv";

// ============================================================================
// Full References
// ============================================================================

/// Render `paper` in `style`, using "Unknown Venue" when no venue is known.
pub fn format_citation(paper: &Paper, style: CitationStyle) -> String {
    format_with_venue(paper, style, UNKNOWN_VENUE)
}

/// Render `paper` in `style`. `fallback_venue` is used when none of
/// `venue`/`journal`/`conference` is set.
pub fn format_with_venue(paper: &Paper, style: CitationStyle, fallback_venue: &str) -> String {
    let authors = non_blank(paper.authors.as_deref()).unwrap_or(UNKNOWN_AUTHOR);
    let title = non_blank(Some(paper.title.as_str())).unwrap_or(UNTITLED);
    let venue = paper.effective_venue().unwrap_or(fallback_venue);

    match style {
        CitationStyle::Ieee => {
            let year = year_or(paper.year, "Unknown Year");
            let pages = non_blank(paper.pages.as_deref())
                .map(|p| format!(", pp. {}", p))
                .unwrap_or_default();
            let doi = non_blank(paper.doi.as_deref())
                .map(|d| format!(", doi: {}", d))
                .unwrap_or_default();
            format!(
                "{}, \"{},\" {}, {}{}{}.",
                ieee_authors(authors),
                title,
                venue,
                year,
                pages,
                doi
            )
        }
        CitationStyle::Apa => format!(
            "{} ({}). {}. {}.",
            first_author(authors),
            year_or(paper.year, "n.d."),
            title,
            venue
        ),
        CitationStyle::Mla => format!(
            "{}. \"{}.\" {}, {}.",
            first_author(authors),
            title,
            venue,
            year_or(paper.year, "n.d.")
        ),
        CitationStyle::Chicago => format!(
            "{}. \"{}.\" {} ({}).",
            first_author(authors),
            title,
            venue,
            year_or(paper.year, "n.d.")
        ),
    }
}

/// Up to three comma-separated names are kept as written; more collapse
/// to "{first} et al.".
fn ieee_authors(authors: &str) -> String {
    let names: Vec<&str> = authors.split(',').map(str::trim).collect();
    if names.len() <= 3 {
        names.join(", ")
    } else {
        format!("{} et al.", names[0])
    }
}

/// Text before the first comma.
fn first_author(authors: &str) -> &str {
    authors.split(',').next().unwrap_or(authors).trim()
}

/// Last whitespace-delimited token of the first author, "Unknown" if none.
fn last_name(authors: Option<&str>) -> String {
    non_blank(authors)
        .map(first_author)
        .and_then(|a| a.split_whitespace().last())
        .unwrap_or("Unknown")
        .to_string()
}

fn year_or(year: Option<i32>, default: &str) -> String {
    year.map(|y| y.to_string())
        .unwrap_or_else(|| default.to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

// ============================================================================
// In-Text Citations
// ============================================================================

/// In-text markers for `papers` in input order.
pub fn in_text_citations(papers: &[Paper], style: CitationStyle) -> Vec<InTextCitation> {
    in_text_citations_as_of(papers, style, Utc::now().year())
}

/// IEEE and Chicago number papers `[1]`, `[2]`... by position. APA and MLA
/// use `(LastName, Year)`; an unknown year is rendered as `current_year`.
pub fn in_text_citations_as_of(
    papers: &[Paper],
    style: CitationStyle,
    current_year: i32,
) -> Vec<InTextCitation> {
    papers
        .iter()
        .enumerate()
        .map(|(i, paper)| {
            let number = i + 1;
            let in_text = match style {
                CitationStyle::Ieee | CitationStyle::Chicago => format!("[{}]", number),
                CitationStyle::Apa | CitationStyle::Mla => format!(
                    "({}, {})",
                    last_name(paper.authors.as_deref()),
                    paper.year.unwrap_or(current_year)
                ),
            };
            InTextCitation {
                id: paper.id.clone(),
                in_text,
                number,
            }
        })
        .collect()
}

// ============================================================================
// Bibliography
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BibliographyFormat {
    Text,
    Json,
}

impl BibliographyFormat {
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            BibliographyFormat::Json
        } else {
            BibliographyFormat::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BibliographyFormat::Text => "text",
            BibliographyFormat::Json => "json",
        }
    }
}

/// `[n] reference` entries separated by blank lines.
pub fn bibliography_text(citations: &[CitationWithPaper]) -> String {
    citations
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c.citation.citation_text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn bibliography_entries(citations: &[CitationWithPaper]) -> Vec<BibliographyEntry> {
    citations
        .iter()
        .enumerate()
        .map(|(i, c)| BibliographyEntry {
            number: i + 1,
            citation: c.citation.citation_text.clone(),
            title: c.title.clone(),
            authors: c.authors.clone(),
            year: c.year,
        })
        .collect()
}

// ============================================================================
// Library Call Site
// ============================================================================

/// Format a stored paper and persist the result as a new citation record.
/// Returns `None` when the paper does not exist.
pub fn generate_citation(
    library: &Library,
    paper_id: &str,
    style: CitationStyle,
) -> StoreResult<Option<String>> {
    let Some(paper) = library.get_paper(paper_id) else {
        return Ok(None);
    };

    let text = format_with_venue(&paper, style, INGESTED_VENUE);
    library.add_citation(paper_id, &text, style)?;
    tracing::debug!(paper_id, %style, "Citation generated");
    Ok(Some(text))
}
