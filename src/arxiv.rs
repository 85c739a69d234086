//! arXiv query API client and Atom feed parsing.
//!
//! Topic fetches go through a fixed per-topic query template. Batch fetches
//! run one request per topic, one after another, sleeping `pacing` between
//! requests since the API rejects bursts.

use crate::config::ArxivConfig;
use crate::error::{ArxivError, StoreResult};
use crate::models::ArxivPaper;
use crate::store::Library;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use feed_rs::{model::Entry, parser};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_TOPICS: [&str; 3] = ["machine learning", "quantum computing", "climate change"];

pub const DEFAULT_PAPERS_PER_TOPIC: usize = 20;

pub const DEFAULT_SEARCH_RESULTS: usize = 10;

/// Topic label given to ad-hoc search results.
const SEARCH_TOPIC: &str = "search";

#[derive(Clone)]
pub struct ArxivClient {
    client: Client,
    base_url: String,
    pacing: Duration,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig) -> Result<Self, ArxivError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(ArxivError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pacing: Duration::from_millis(config.pacing_ms),
        })
    }

    /// Most relevant papers for `topic`.
    pub async fn fetch_by_topic(
        &self,
        topic: &str,
        max_results: usize,
    ) -> Result<Vec<ArxivPaper>, ArxivError> {
        info!(topic, max_results, "Fetching arXiv papers");
        let papers = self
            .query(&build_search_query(topic), max_results, topic)
            .await?;
        info!(topic, count = papers.len(), "Fetched arXiv papers");
        Ok(papers)
    }

    /// Free-text search. Results are labelled with the topic "search".
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<ArxivPaper>, ArxivError> {
        self.query(&format!("all:\"{}\"", query), max_results, SEARCH_TOPIC)
            .await
    }

    /// Fetch every topic in order, pausing between requests. The first
    /// failing topic aborts the batch.
    pub async fn fetch_all_topics(
        &self,
        topics: &[String],
        per_topic: usize,
    ) -> Result<Vec<ArxivPaper>, ArxivError> {
        let mut all = Vec::new();
        for (i, topic) in topics.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                debug!(pacing_ms = self.pacing.as_millis(), "Pacing arXiv requests");
                tokio::time::sleep(self.pacing).await;
            }
            all.extend(self.fetch_by_topic(topic, per_topic).await?);
        }
        info!(total = all.len(), topics = topics.len(), "Fetched arXiv papers for all topics");
        Ok(all)
    }

    async fn query(
        &self,
        search_query: &str,
        max_results: usize,
        topic: &str,
    ) -> Result<Vec<ArxivPaper>, ArxivError> {
        let max_results = max_results.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("search_query", search_query),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .send()
            .await
            .map_err(|source| ArxivError::Http {
                topic: topic.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArxivError::Status {
                topic: topic.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| ArxivError::Feed {
            topic: topic.to_string(),
            source,
        })?;
        Ok(parse_feed(&body, topic))
    }
}

/// Store fetched papers in the library, returning their new ids.
pub fn ingest(library: &Library, papers: &[ArxivPaper]) -> StoreResult<Vec<String>> {
    let mut ids = Vec::with_capacity(papers.len());
    for paper in papers {
        ids.push(library.add_paper(paper.to_input())?);
    }
    info!(count = ids.len(), "Stored arXiv papers");
    Ok(ids)
}

// ============================================================================
// Queries
// ============================================================================

pub fn build_search_query(topic: &str) -> String {
    match topic.to_lowercase().as_str() {
        "machine learning" => {
            "all:machine AND all:learning AND (cat:cs.LG OR cat:cs.AI OR cat:stat.ML)".to_string()
        }
        "quantum computing" => {
            "all:quantum AND all:computing AND (cat:quant-ph OR cat:cs.ET)".to_string()
        }
        "climate change" => {
            "all:climate AND all:change AND (cat:physics.ao-ph OR cat:physics.geo-ph)".to_string()
        }
        _ => format!("all:\"{}\"", topic),
    }
}

/// Topic terms that appear in `abstract_text`. Topics without a term list
/// yield nothing.
pub fn topic_keywords(abstract_text: &str, topic: &str) -> Vec<String> {
    let terms: &[&str] = match topic.to_lowercase().as_str() {
        "machine learning" => &[
            "neural",
            "network",
            "algorithm",
            "model",
            "training",
            "deep",
            "classification",
            "regression",
        ],
        "quantum computing" => &[
            "qubit",
            "quantum",
            "entanglement",
            "superposition",
            "gate",
            "circuit",
            "algorithm",
        ],
        "climate change" => &[
            "temperature",
            "carbon",
            "emission",
            "warming",
            "atmosphere",
            "greenhouse",
            "environmental",
        ],
        _ => &[],
    };

    let lower = abstract_text.to_lowercase();
    terms
        .iter()
        .filter(|t| lower.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

// ============================================================================
// Atom Parsing
// ============================================================================

/// Every entry of an arXiv Atom feed. Entries without a title are
/// skipped; a body that is not a feed yields an empty list.
pub fn parse_feed(xml: &str, topic: &str) -> Vec<ArxivPaper> {
    match parser::parse(xml.as_bytes()) {
        Ok(feed) => feed
            .entries
            .into_iter()
            .filter_map(|entry| parse_entry(entry, topic))
            .collect(),
        Err(e) => {
            warn!(topic, error = %e, "Unparseable arXiv feed");
            Vec::new()
        }
    }
}

fn parse_entry(entry: Entry, topic: &str) -> Option<ArxivPaper> {
    let title = entry
        .title
        .as_ref()
        .map(|t| normalize_text(&t.content))
        .filter(|t| !t.is_empty())?;

    let mut authors: Vec<String> = entry
        .authors
        .iter()
        .map(|author| normalize_text(&author.name))
        .filter(|name| !name.is_empty())
        .collect();
    if authors.is_empty() {
        authors.push("Unknown".to_string());
    }

    let abstract_text = entry
        .summary
        .as_ref()
        .map(|s| normalize_text(&s.content))
        .unwrap_or_default();
    let published = entry.published.or(entry.updated);
    let updated = entry.updated.or(entry.published);
    let pdf_url = entry
        .links
        .iter()
        .find(|link| link.media_type.as_deref() == Some("application/pdf"))
        .map(|link| link.href.clone());
    let categories = entry
        .categories
        .iter()
        .map(|c| c.term.clone())
        .collect::<Vec<_>>();
    let abs_url = entry.id.trim().to_string();

    Some(ArxivPaper {
        id: arxiv_id_from_url(&abs_url),
        title,
        authors: authors.join(", "),
        year: published.map(|dt| dt.year()),
        keywords: topic_keywords(&abstract_text, topic),
        abstract_text,
        published: published.map(timestamp).unwrap_or_default(),
        updated: updated.map(timestamp).unwrap_or_default(),
        pdf_url,
        categories,
        arxiv_url: abs_url,
        topic: topic.to_string(),
        venue: "arXiv".to_string(),
        citation_count: 0,
    })
}

/// `http://arxiv.org/abs/2301.00001v1` -> `2301.00001v1`
fn arxiv_id_from_url(url: &str) -> String {
    match url.find("abs/") {
        Some(pos) => url[pos + 4..].to_string(),
        None => url.to_string(),
    }
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Collapse whitespace runs; feeds wrap long titles and abstracts.
fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: search_query=all:quantum</title>
  <entry>
    <id>http://arxiv.org/abs/2301.00001v2</id>
    <updated>2023-02-01T10:00:00Z</updated>
    <published>2023-01-02T18:30:00Z</published>
    <title>Error Correction for
      Superconducting Qubits</title>
    <summary>  We present a quantum gate scheme that improves qubit
      entanglement fidelity &amp; more.</summary>
    <author><name>Alice Smith</name></author>
    <author><name>Bob Jones</name></author>
    <link href="http://arxiv.org/abs/2301.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2301.00001v2" rel="related" type="application/pdf"/>
    <category term="quant-ph" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.ET" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/1999.12345v1</id>
    <published>2019-06-01T00:00:00Z</published>
    <title>No Authors Listed</title>
    <summary>Plain.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_fields() {
        let papers = parse_feed(SAMPLE_FEED, "quantum computing");
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.id, "2301.00001v2");
        assert_eq!(first.title, "Error Correction for Superconducting Qubits");
        assert_eq!(first.authors, "Alice Smith, Bob Jones");
        assert_eq!(
            first.abstract_text,
            "We present a quantum gate scheme that improves qubit entanglement fidelity & more."
        );
        assert_eq!(first.published, "2023-01-02T18:30:00Z");
        assert_eq!(first.updated, "2023-02-01T10:00:00Z");
        assert_eq!(first.arxiv_url, "http://arxiv.org/abs/2301.00001v2");
        assert_eq!(first.pdf_url.as_deref(), Some("http://arxiv.org/pdf/2301.00001v2"));
        assert_eq!(first.categories, vec!["quant-ph", "cs.ET"]);
        assert_eq!(first.year, Some(2023));
        assert_eq!(first.venue, "arXiv");
        assert_eq!(first.citation_count, 0);
        assert_eq!(first.keywords, vec!["qubit", "quantum", "entanglement", "gate"]);
    }

    #[test]
    fn test_parse_feed_defaults() {
        let papers = parse_feed(SAMPLE_FEED, "quantum computing");
        let second = &papers[1];
        assert_eq!(second.authors, "Unknown");
        assert_eq!(second.updated, second.published);
        assert_eq!(second.pdf_url, None);
        assert!(second.categories.is_empty());
        assert_eq!(second.year, Some(2019));
    }

    #[test]
    fn test_parse_feed_garbage_is_empty() {
        assert!(parse_feed("not xml at all", "x").is_empty());
        assert!(parse_feed(r#"<feed xmlns="http://www.w3.org/2005/Atom"></feed>"#, "x").is_empty());
    }

    #[test]
    fn test_parse_feed_decodes_character_references() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2402.00002v1</id>
    <published>2024-02-01T00:00:00Z</published>
    <title>Schr&#246;dinger&#39;s Cat &amp; Qubits</title>
    <summary>Cats.</summary>
    <author><name>Erwin Schr&#xF6;dinger</name></author>
  </entry>
</feed>"#;
        let papers = parse_feed(xml, "search");
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "Schrödinger's Cat & Qubits");
        assert_eq!(papers[0].authors, "Erwin Schrödinger");
    }

    #[test]
    fn test_build_search_query_templates() {
        assert_eq!(
            build_search_query("Quantum Computing"),
            "all:quantum AND all:computing AND (cat:quant-ph OR cat:cs.ET)"
        );
        assert_eq!(build_search_query("graph theory"), "all:\"graph theory\"");
    }

    #[test]
    fn test_topic_keywords_only_for_known_topics() {
        assert_eq!(
            topic_keywords("Deep neural training", "machine learning"),
            vec!["neural", "training", "deep"]
        );
        assert!(topic_keywords("Deep neural training", "search").is_empty());
    }

    #[test]
    fn test_ingest_stores_papers() {
        let library = Library::in_memory();
        let papers = parse_feed(SAMPLE_FEED, "quantum computing");
        let ids = ingest(&library, &papers).unwrap();
        assert_eq!(ids.len(), 2);

        let stored = library.get_paper(&ids[0]).unwrap();
        assert_eq!(stored.arxiv_id.as_deref(), Some("2301.00001v2"));
        assert_eq!(stored.venue.as_deref(), Some("arXiv"));
        assert_eq!(stored.topic.as_deref(), Some("quantum computing"));
        assert_eq!(library.papers_by_topic("quantum computing").len(), 2);
    }
}
