//! Paper recommendations by keyword overlap.
//!
//! A message is reduced to the research terms it mentions (from a fixed
//! vocabulary). Papers whose keywords or topic mention any of them are
//! candidates, ranked by `year * 0.1 + citation_count`.

use crate::models::Paper;
use crate::store::Library;

use std::cmp::Ordering;

pub const DEFAULT_LIMIT: usize = 10;

/// Recommendations attached to a chat reply.
pub const CHAT_LIMIT: usize = 5;

/// Year assumed for papers without one when scoring.
const UNDATED_YEAR: i32 = 2000;

pub const VOCABULARY: &[&str] = &[
    // Machine learning
    "machine learning",
    "neural network",
    "deep learning",
    "algorithm",
    "model",
    "artificial intelligence",
    "AI",
    "classification",
    "regression",
    "clustering",
    "supervised learning",
    "unsupervised learning",
    "reinforcement learning",
    "computer vision",
    "natural language processing",
    "nlp",
    "data mining",
    "big data",
    "statistics",
    "probability",
    "bayesian",
    "optimization",
    // Quantum computing
    "quantum computing",
    "quantum",
    "qubit",
    "entanglement",
    "superposition",
    "quantum algorithm",
    "quantum gate",
    "quantum circuit",
    "quantum mechanics",
    "quantum information",
    "quantum cryptography",
    "quantum simulation",
    // Climate
    "climate change",
    "global warming",
    "carbon",
    "emission",
    "greenhouse",
    "environmental",
    "atmosphere",
    "temperature",
    "climate model",
    "sustainability",
    "renewable energy",
    "carbon footprint",
    "biodiversity",
    // General
    "research",
    "analysis",
    "experiment",
    "methodology",
    "dataset",
    "evaluation",
    "performance",
    "accuracy",
    "precision",
    "recall",
    "validation",
    "testing",
    "training",
    "simulation",
    "modeling",
];

/// Vocabulary terms that occur in `message`, ignoring case, in vocabulary
/// order and without repeats.
pub fn extract_keywords(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut found: Vec<String> = Vec::new();
    for term in VOCABULARY {
        if lower.contains(&term.to_lowercase()) && !found.iter().any(|f| f == term) {
            found.push(term.to_string());
        }
    }
    found
}

pub fn relevance_score(paper: &Paper) -> f64 {
    f64::from(paper.year.unwrap_or(UNDATED_YEAR)) * 0.1
        + f64::from(paper.citation_count.unwrap_or(0))
}

/// Highest score first; equal scores keep their incoming order.
pub fn rank(mut papers: Vec<Paper>, limit: usize) -> Vec<Paper> {
    papers.sort_by(|a, b| {
        relevance_score(b)
            .partial_cmp(&relevance_score(a))
            .unwrap_or(Ordering::Equal)
    });
    papers.truncate(limit);
    papers
}

/// Ranked library papers matching the research terms in `message`.
pub fn recommend_for_message(library: &Library, message: &str, limit: usize) -> Vec<Paper> {
    let keywords = extract_keywords(message);
    if keywords.is_empty() {
        return Vec::new();
    }
    rank(library.papers_by_keywords(&keywords), limit)
}

/// Other papers sharing research terms with `paper`, best first, padded
/// with the rest of the library (newest first) up to `limit`.
pub fn similar_papers(library: &Library, paper: &Paper, limit: usize) -> Vec<Paper> {
    let text = format!(
        "{} {} {}",
        paper.title,
        paper.abstract_text.as_deref().unwrap_or_default(),
        paper.keyword_haystack()
    );
    let keywords = extract_keywords(&text);

    let related: Vec<Paper> = library
        .papers_by_keywords(&keywords)
        .into_iter()
        .filter(|p| p.id != paper.id)
        .collect();
    let mut similar = rank(related, limit);

    if similar.len() < limit {
        for other in library.all_papers() {
            if similar.len() >= limit {
                break;
            }
            if other.id != paper.id && !similar.iter().any(|p| p.id == other.id) {
                similar.push(other);
            }
        }
    }
    similar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Keywords, PaperInput};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn scored(id: &str, year: Option<i32>, citations: Option<u32>) -> Paper {
        Paper::from_input(
            id.to_string(),
            id.to_string(),
            PaperInput {
                year,
                citation_count: citations,
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_extract_keywords_in_vocabulary_order() {
        let keywords = extract_keywords("How do Quantum Gate errors affect Deep Learning?");
        assert_eq!(keywords, vec!["deep learning", "quantum", "quantum gate"]);
    }

    #[test]
    fn test_extract_keywords_none() {
        assert!(extract_keywords("hello there").is_empty());
    }

    #[test]
    fn test_score_formula() {
        let a = scored("A", Some(2020), Some(5));
        let b = scored("B", Some(2023), Some(0));
        assert!((relevance_score(&a) - 207.0).abs() < 1e-9);
        assert!((relevance_score(&b) - 202.3).abs() < 1e-9);
        assert!((relevance_score(&scored("C", None, None)) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_rank_orders_by_score_and_keeps_ties_stable() {
        let papers = vec![
            scored("B", Some(2023), Some(0)),
            scored("A", Some(2020), Some(5)),
            scored("tie1", Some(2010), None),
            scored("tie2", Some(2010), None),
        ];
        let ids: Vec<String> = rank(papers, DEFAULT_LIMIT).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["A", "B", "tie1", "tie2"]);
    }

    #[test]
    fn test_rank_truncates() {
        let papers = (0..20).map(|i| scored(&i.to_string(), Some(2000 + i), None)).collect();
        assert_eq!(rank(papers, 3).len(), 3);
    }

    #[test]
    fn test_recommend_for_message_uses_library() {
        let library = Library::in_memory();
        library
            .add_paper(PaperInput {
                topic: Some("quantum computing".into()),
                year: Some(2019),
                citation_count: Some(40),
                ..PaperInput::titled("Cited")
            })
            .unwrap();
        library
            .add_paper(PaperInput {
                keywords: Some(Keywords::Text("qubit, quantum".into())),
                year: Some(2024),
                ..PaperInput::titled("Recent")
            })
            .unwrap();
        library
            .add_paper(PaperInput {
                topic: Some("climate change".into()),
                ..PaperInput::titled("Off topic")
            })
            .unwrap();

        let titles: Vec<String> = recommend_for_message(&library, "tell me about quantum", 10)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Cited", "Recent"]);
        assert!(recommend_for_message(&library, "hello", 10).is_empty());
    }

    #[test]
    fn test_similar_papers_excludes_self_and_pads() {
        let library = Library::in_memory();
        let base = library
            .add_paper(PaperInput {
                topic: Some("quantum computing".into()),
                ..PaperInput::titled("Base")
            })
            .unwrap();
        library
            .add_paper(PaperInput {
                topic: Some("quantum computing".into()),
                ..PaperInput::titled("Sibling")
            })
            .unwrap();
        library.add_paper(PaperInput::titled("Filler")).unwrap();

        let base = library.get_paper(&base).unwrap();
        let titles: Vec<String> = similar_papers(&library, &base, 5)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Sibling", "Filler"]);
    }
}
