//! Data models for the PaperTrail backend.
//!
//! Persisted records (papers, citations, chat messages, projects, uploads)
//! and the request/response shapes shared by the store, the formatters and
//! the HTTP handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Fresh opaque record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Accept ids written either as strings or as bare JSON numbers
/// (older data files stored numeric ids).
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

// ============================================================================
// Papers
// ============================================================================

/// Topic keywords are stored either as one free-text field or as a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Keywords {
    List(Vec<String>),
    Text(String),
}

impl Keywords {
    /// Flattened text used for substring matching.
    pub fn as_text(&self) -> String {
        match self {
            Keywords::List(items) => items.join(", "),
            Keywords::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Keywords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub upload_date: DateTime<Utc>,
}

impl Paper {
    /// Build a stored record from client-supplied fields. `title` must
    /// already be validated by the caller.
    pub fn from_input(id: String, title: String, input: PaperInput, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            authors: input.authors,
            abstract_text: input.abstract_text,
            year: input.year,
            venue: input.venue,
            journal: input.journal,
            conference: input.conference,
            pages: input.pages,
            doi: input.doi,
            url: input.url,
            pdf_url: input.pdf_url,
            arxiv_id: input.arxiv_id,
            topic: input.topic,
            keywords: input.keywords,
            citation_count: input.citation_count,
            is_selected: false,
            content_text: input.content_text,
            file_path: input.file_path,
            file_name: input.file_name,
            upload_date: now,
        }
    }

    /// Shallow merge: every field present in the patch replaces the stored
    /// value, everything else is left alone. `id` and `upload_date` never
    /// change, and a blank title never replaces the stored one.
    pub fn apply(&mut self, patch: PaperInput) {
        macro_rules! merge {
            ($($field:ident),*) => {
                $(if let Some(v) = patch.$field { self.$field = Some(v); })*
            };
        }

        if let Some(title) = patch.title.filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
        if let Some(selected) = patch.is_selected {
            self.is_selected = selected;
        }
        merge!(
            authors, abstract_text, year, venue, journal, conference, pages, doi, url, pdf_url,
            arxiv_id, topic, keywords, citation_count, content_text, file_path, file_name
        );
    }

    /// Venue used in references: `venue`, then `journal`, then `conference`.
    pub fn effective_venue(&self) -> Option<&str> {
        [&self.venue, &self.journal, &self.conference]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .find(|v| !v.trim().is_empty())
    }

    /// Lowercased `keywords` + `topic` text for recommendation matching.
    pub fn keyword_haystack(&self) -> String {
        let mut text = self
            .keywords
            .as_ref()
            .map(Keywords::as_text)
            .unwrap_or_default();
        if let Some(ref topic) = self.topic {
            text.push(' ');
            text.push_str(topic);
        }
        text.to_lowercase()
    }
}

/// Client-supplied paper fields, used both for creation and for partial
/// updates. Every field is optional here; creation validates `title`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PaperInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Keywords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl PaperInput {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct LibraryStats {
    #[serde(rename = "totalPapers")]
    pub total_papers: usize,
    #[serde(rename = "selectedPapers")]
    pub selected_papers: usize,
    pub topics: BTreeMap<String, usize>,
    #[serde(rename = "yearDistribution")]
    pub year_distribution: BTreeMap<i32, usize>,
}

// ============================================================================
// Citations
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    Ieee,
    Apa,
    Mla,
    Chicago,
}

impl CitationStyle {
    /// Case-insensitive lookup; anything unrecognised is IEEE.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "apa" => CitationStyle::Apa,
            "mla" => CitationStyle::Mla,
            "chicago" => CitationStyle::Chicago,
            _ => CitationStyle::Ieee,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CitationStyle::Ieee => "ieee",
            CitationStyle::Apa => "apa",
            CitationStyle::Mla => "mla",
            CitationStyle::Chicago => "chicago",
        }
    }
}

impl fmt::Display for CitationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for CitationStyle {
    fn default() -> Self {
        CitationStyle::Ieee
    }
}

/// A rendered reference, persisted every time one is generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub paper_id: String,
    pub citation_text: String,
    pub style: CitationStyle,
    pub created_at: DateTime<Utc>,
}

/// A stored citation joined with the bibliographic fields of its paper.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CitationWithPaper {
    #[serde(flatten)]
    pub citation: Citation,
    pub title: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InTextCitation {
    pub id: String,
    #[serde(rename = "inText")]
    pub in_text: String,
    pub number: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BibliographyEntry {
    pub number: usize,
    pub citation: String,
    pub title: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerKind {
    IeeeNumeric,
    AuthorYear,
    Superscript,
}

/// One citation marker found in free text. `position` is a character offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CitationMarker {
    #[serde(rename = "type")]
    pub kind: MarkerKind,
    #[serde(rename = "match")]
    pub matched: String,
    pub position: usize,
    pub reference: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub title: String,
    pub authors: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub paper_context: Option<String>,
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

// ============================================================================
// Uploads
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Upload {
    #[serde(deserialize_with = "id_from_any")]
    pub id: String,
    pub file_name: String,
    pub file_path: String,
    #[serde(default)]
    pub content_hash: Option<String>,
    pub upload_status: ProcessingStatus,
    pub processing_status: ProcessingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

// ============================================================================
// External Results
// ============================================================================

/// One entry parsed from an arXiv Atom feed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ArxivPaper {
    pub id: String,
    pub title: String,
    pub authors: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub published: String,
    pub updated: String,
    #[serde(rename = "arxivUrl")]
    pub arxiv_url: String,
    #[serde(rename = "pdfUrl")]
    pub pdf_url: Option<String>,
    pub categories: Vec<String>,
    pub topic: String,
    pub venue: String,
    pub year: Option<i32>,
    #[serde(rename = "citationCount")]
    pub citation_count: u32,
    pub keywords: Vec<String>,
}

impl ArxivPaper {
    /// Fields stored in the library when a fetched entry is ingested.
    pub fn to_input(&self) -> PaperInput {
        PaperInput {
            title: Some(self.title.clone()),
            authors: Some(self.authors.clone()),
            abstract_text: Some(self.abstract_text.clone()),
            year: self.year,
            venue: Some(self.venue.clone()),
            pdf_url: self.pdf_url.clone(),
            url: Some(self.arxiv_url.clone()),
            arxiv_id: Some(self.id.clone()),
            topic: Some(self.topic.clone()),
            keywords: Some(Keywords::List(self.keywords.clone())),
            citation_count: Some(self.citation_count),
            ..Default::default()
        }
    }
}

/// Output of a text generation call, fallback or remote.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Generation {
    pub response: String,
    pub sources: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_paper() -> Paper {
        Paper::from_input(
            "p1".to_string(),
            "Quantum Algorithms".to_string(),
            PaperInput {
                authors: Some("Smith, J.".to_string()),
                year: Some(2023),
                topic: Some("quantum computing".to_string()),
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_apply_keeps_title_when_patch_title_is_blank() {
        let mut paper = sample_paper();
        paper.apply(PaperInput {
            title: Some("   ".to_string()),
            year: Some(2024),
            ..Default::default()
        });
        assert_eq!(paper.title, "Quantum Algorithms");
        assert_eq!(paper.year, Some(2024));
    }

    #[test]
    fn test_style_parse_is_case_insensitive_with_ieee_fallback() {
        assert_eq!(CitationStyle::parse("APA"), CitationStyle::Apa);
        assert_eq!(CitationStyle::parse(" Chicago "), CitationStyle::Chicago);
        assert_eq!(CitationStyle::parse("mla"), CitationStyle::Mla);
        assert_eq!(CitationStyle::parse("harvard"), CitationStyle::Ieee);
        assert_eq!(CitationStyle::parse(""), CitationStyle::Ieee);
    }

    #[test]
    fn test_apply_is_shallow_merge() {
        let mut paper = sample_paper();
        paper.apply(PaperInput {
            venue: Some("QIP".to_string()),
            is_selected: Some(true),
            ..Default::default()
        });
        assert_eq!(paper.venue.as_deref(), Some("QIP"));
        assert!(paper.is_selected);
        assert_eq!(paper.authors.as_deref(), Some("Smith, J."));
        assert_eq!(paper.year, Some(2023));
        assert_eq!(paper.title, "Quantum Algorithms");
    }

    #[test]
    fn test_effective_venue_prefers_venue_then_journal() {
        let mut paper = sample_paper();
        assert_eq!(paper.effective_venue(), None);
        paper.conference = Some("STOC".to_string());
        assert_eq!(paper.effective_venue(), Some("STOC"));
        paper.journal = Some("Nature".to_string());
        assert_eq!(paper.effective_venue(), Some("Nature"));
        paper.venue = Some("arXiv".to_string());
        assert_eq!(paper.effective_venue(), Some("arXiv"));
    }

    #[test]
    fn test_keyword_haystack_joins_list_and_topic() {
        let mut paper = sample_paper();
        paper.keywords = Some(Keywords::List(vec!["Qubit".into(), "gate".into()]));
        assert_eq!(paper.keyword_haystack(), "qubit, gate quantum computing");
    }

    #[test]
    fn test_numeric_ids_deserialize_as_strings() {
        let json = r#"{"id": 1712345678901.25, "title": "Old", "upload_date": "2024-04-05T12:00:00Z"}"#;
        let paper: Paper = serde_json::from_str(json).unwrap();
        assert_eq!(paper.id, "1712345678901.25");
        assert!(!paper.is_selected);
        assert_eq!(paper.authors, None);
    }

    #[test]
    fn test_keywords_accept_string_or_list() {
        let list: Keywords = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(list.as_text(), "a, b");
        let text: Keywords = serde_json::from_str(r#""climate model""#).unwrap();
        assert_eq!(text.as_text(), "climate model");
    }
}
