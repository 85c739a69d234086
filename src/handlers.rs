//! HTTP route handlers for the PaperTrail API.
//!
//! Every handler answers with JSON carrying a `success` flag. Failures are
//! returned as [`AppError`] and rendered by its `IntoResponse`.

use crate::arxiv::{self, DEFAULT_PAPERS_PER_TOPIC, DEFAULT_SEARCH_RESULTS, DEFAULT_TOPICS};
use crate::citations::{
    bibliography_entries, bibliography_text, format_with_venue, generate_citation,
    in_text_citations, BibliographyFormat, INGESTED_VENUE,
};
use crate::documents::{
    extract_paper, sha256_hex, stored_file_name, DocumentKind, MAX_FILES_PER_UPLOAD,
    MAX_UPLOAD_BYTES,
};
use crate::error::{AppError, AppResult};
use crate::extract::extract_citations;
use crate::llm::{
    chat_citation_prompt, chat_populate_prompt, generic_suggestions, suggestion_prompt,
    summary_prompt, Suggestion,
};
use crate::models::{CitationStyle, Paper, PaperInput, ProcessingStatus, ProjectInput, Role};
use crate::recommend::{self, CHAT_LIMIT};
use crate::{validate_path_within, AppState};

use axum::{
    extract::{
        multipart::{Field, MultipartError},
        FromRequest, Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// `axum::Json` whose rejections use the API error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

const DEFAULT_HISTORY_LIMIT: usize = 50;

const DEFAULT_SIMILAR_LIMIT: usize = 5;

const NO_CONTENT: &str = "Content not extracted yet";

fn papers_for(state: &AppState, ids: &[String]) -> Vec<Paper> {
    ids.iter().filter_map(|id| state.library.get_paper(id)).collect()
}

fn not_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Health
// ============================================================================

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "API endpoint not found",
        })),
    )
}

// ============================================================================
// Papers
// ============================================================================

pub async fn list_papers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let papers = state.library.all_papers();
    Json(json!({
        "success": true,
        "count": papers.len(),
        "papers": papers,
    }))
}

pub async fn get_paper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let paper = state
        .library
        .get_paper(&id)
        .ok_or_else(|| AppError::not_found("Paper"))?;
    Ok(Json(json!({ "success": true, "paper": paper })))
}

pub async fn create_paper(
    State(state): State<Arc<AppState>>,
    JsonBody(input): JsonBody<PaperInput>,
) -> AppResult<impl IntoResponse> {
    if not_blank(input.title.as_deref()).is_none() {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let id = state.library.add_paper(input)?;
    info!(paper_id = %id, "Paper added");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "paperId": id,
            "message": "Paper added successfully",
        })),
    ))
}

/// Unknown ids are a successful no-op.
pub async fn update_paper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<PaperInput>,
) -> AppResult<Json<Value>> {
    if patch.title.is_some() && not_blank(patch.title.as_deref()).is_none() {
        return Err(AppError::Validation("Title cannot be empty".to_string()));
    }

    state.library.update_paper(&id, patch)?;
    Ok(Json(json!({
        "success": true,
        "message": "Paper updated successfully",
    })))
}

pub async fn delete_paper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.library.delete_paper(&id)?;
    Ok(Json(json!({
        "success": true,
        "message": "Paper deleted successfully",
    })))
}

pub async fn search_papers(
    State(state): State<Arc<AppState>>,
    Path(query): Path<String>,
) -> AppResult<Json<Value>> {
    let Some(query) = not_blank(Some(query.as_str())) else {
        return Err(AppError::Validation("Search query is required".to_string()));
    };

    let papers = state.library.search_papers(query);
    Ok(Json(json!({
        "success": true,
        "query": query,
        "count": papers.len(),
        "papers": papers,
    })))
}

pub async fn selected_papers(State(state): State<Arc<AppState>>) -> Json<Value> {
    let papers = state.library.selected_papers();
    Json(json!({
        "success": true,
        "count": papers.len(),
        "papers": papers,
    }))
}

#[derive(Deserialize)]
pub struct SelectRequest {
    #[serde(rename = "isSelected", default)]
    pub is_selected: bool,
}

pub async fn select_paper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<SelectRequest>,
) -> AppResult<Json<Value>> {
    state.library.set_selection(&id, body.is_selected)?;
    let verb = if body.is_selected { "selected" } else { "deselected" };
    Ok(Json(json!({
        "success": true,
        "message": format!("Paper {} successfully", verb),
    })))
}

pub async fn paper_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let paper = state
        .library
        .get_paper(&id)
        .ok_or_else(|| AppError::not_found("Paper"))?;

    let has_content = not_blank(paper.content_text.as_deref()).is_some();
    Ok(Json(json!({
        "success": true,
        "paperId": paper.id,
        "title": paper.title,
        "content": paper.content_text.as_deref().unwrap_or(NO_CONTENT),
        "abstract": paper.abstract_text,
        "hasContent": has_content,
    })))
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub async fn similar_papers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Value>> {
    let base = state
        .library
        .get_paper(&id)
        .ok_or_else(|| AppError::not_found("Paper"))?;

    let limit = query.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT);
    let similar = recommend::similar_papers(&state.library, &base, limit);
    Ok(Json(json!({
        "success": true,
        "basePaper": base,
        "count": similar.len(),
        "similarPapers": similar,
    })))
}

// ============================================================================
// Citations
// ============================================================================

#[derive(Deserialize, Default)]
pub struct StyleRequest {
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl StyleRequest {
    fn style(&self) -> CitationStyle {
        self.style.as_deref().map(CitationStyle::parse).unwrap_or_default()
    }
}

pub async fn generate_paper_citation(
    State(state): State<Arc<AppState>>,
    Path(paper_id): Path<String>,
    JsonBody(body): JsonBody<StyleRequest>,
) -> AppResult<Json<Value>> {
    let style = body.style();
    let citation = generate_citation(&state.library, &paper_id, style)?
        .ok_or_else(|| AppError::not_found("Paper"))?;

    Ok(Json(json!({
        "success": true,
        "paperId": paper_id,
        "style": style,
        "citation": citation,
    })))
}

pub async fn cite_selected(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<StyleRequest>,
) -> AppResult<Json<Value>> {
    let style = body.style();
    let selected = state.library.selected_papers();

    if selected.is_empty() {
        return Ok(Json(json!({
            "success": true,
            "message": "No papers selected",
            "citations": [],
        })));
    }

    let mut citations = Vec::with_capacity(selected.len());
    for paper in &selected {
        let citation = generate_citation(&state.library, &paper.id, style)?;
        citations.push(json!({
            "paperId": paper.id,
            "title": paper.title,
            "citation": citation,
        }));
    }

    Ok(Json(json!({
        "success": true,
        "style": style,
        "totalPapers": selected.len(),
        "citations": citations,
    })))
}

pub async fn citations_by_style(
    State(state): State<Arc<AppState>>,
    Path(style): Path<String>,
) -> Json<Value> {
    let style = CitationStyle::parse(&style);
    let citations = state.library.citations_by_style(style);
    Json(json!({
        "success": true,
        "style": style,
        "count": citations.len(),
        "citations": citations,
    }))
}

/// Bibliography of every citation stored for a style.
pub async fn bibliography(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<StyleRequest>,
) -> Json<Value> {
    let style = body.style();
    let format = body
        .format
        .as_deref()
        .map(BibliographyFormat::parse)
        .unwrap_or(BibliographyFormat::Text);
    let citations = state.library.citations_by_style(style);

    if citations.is_empty() {
        let empty = match format {
            BibliographyFormat::Json => json!([]),
            BibliographyFormat::Text => json!(""),
        };
        return Json(json!({
            "success": true,
            "message": "No citations found",
            "bibliography": empty,
        }));
    }

    let bibliography = match format {
        BibliographyFormat::Json => json!(bibliography_entries(&citations)),
        BibliographyFormat::Text => json!(bibliography_text(&citations)),
    };
    Json(json!({
        "success": true,
        "style": style,
        "format": format.as_str(),
        "count": citations.len(),
        "bibliography": bibliography,
    }))
}

#[derive(Deserialize)]
pub struct ExtractRequest {
    #[serde(default)]
    pub text: String,
}

pub async fn extract_markers(JsonBody(body): JsonBody<ExtractRequest>) -> Json<Value> {
    let markers = extract_citations(&body.text);
    Json(json!({
        "success": true,
        "count": markers.len(),
        "citations": markers,
    }))
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub selected_papers: Vec<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub current_section: Option<String>,
    #[serde(default)]
    pub current_content: Option<String>,
    #[serde(default)]
    pub citation_style: Option<String>,
    #[serde(default)]
    pub summary_type: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn chat_message(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ChatRequest>,
) -> AppResult<Json<Value>> {
    let Some(message) = not_blank(body.message.as_deref()) else {
        return Err(AppError::Validation("Message is required".to_string()));
    };

    let recommended = recommend::recommend_for_message(&state.library, message, CHAT_LIMIT);
    let papers = papers_for(&state, &body.selected_papers);
    let generation = state
        .assistant
        .generate_content(&papers, "general", message)
        .await;

    if let Some(session) = not_blank(body.session_id.as_deref()) {
        let context = (!body.selected_papers.is_empty()).then(|| body.selected_papers.join(","));
        state
            .library
            .save_chat_message(session, Role::User, message, context)?;
        state
            .library
            .save_chat_message(session, Role::Assistant, &generation.response, None)?;
    }

    Ok(Json(json!({
        "success": true,
        "response": generation.response,
        "sources": generation.sources,
        "type": generation.kind,
        "selectedPapers": body.selected_papers.len(),
        "recommendedPapers": recommended,
    })))
}

pub async fn chat_populate(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ChatRequest>,
) -> AppResult<Json<Value>> {
    let Some(section) = not_blank(body.section.as_deref()) else {
        return Err(AppError::Validation("Section type is required".to_string()));
    };

    let papers = papers_for(&state, &body.selected_papers);
    let prompt = chat_populate_prompt(section, body.current_content.as_deref());
    let generation = state
        .assistant
        .generate_content(&papers, section, &prompt)
        .await;

    Ok(Json(json!({
        "success": true,
        "content": generation.response,
        "section": section,
        "papersUsed": body.selected_papers.len(),
    })))
}

/// Generated citation text plus the deterministic in-text markers and
/// references for the same papers.
pub async fn chat_cite(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ChatRequest>,
) -> AppResult<Json<Value>> {
    if body.selected_papers.is_empty() {
        return Err(AppError::Validation(
            "No papers selected for citation".to_string(),
        ));
    }

    let style_name = body.citation_style.as_deref().unwrap_or("ieee");
    let style = CitationStyle::parse(style_name);
    let papers = papers_for(&state, &body.selected_papers);
    let generation = state
        .assistant
        .generate_content(&papers, "citation", &chat_citation_prompt(style_name))
        .await;

    let references: Vec<String> = papers
        .iter()
        .map(|p| format_with_venue(p, style, INGESTED_VENUE))
        .collect();

    Ok(Json(json!({
        "success": true,
        "citations": generation.response,
        "inText": in_text_citations(&papers, style),
        "references": references,
        "style": style_name,
        "count": papers.len(),
    })))
}

pub async fn chat_summarize(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ChatRequest>,
) -> AppResult<Json<Value>> {
    if body.selected_papers.is_empty() {
        return Err(AppError::Validation(
            "No papers selected for summarization".to_string(),
        ));
    }

    let summary_type = body.summary_type.as_deref().unwrap_or("general");
    let papers = papers_for(&state, &body.selected_papers);
    let generation = state
        .assistant
        .generate_content(&papers, "summary", summary_prompt(summary_type))
        .await;

    Ok(Json(json!({
        "success": true,
        "summary": generation.response,
        "type": summary_type,
        "papersCount": papers.len(),
    })))
}

pub async fn chat_suggestions(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ChatRequest>,
) -> Json<Value> {
    let section = body.current_section.as_deref().unwrap_or_default();
    let mut suggestions: Vec<Suggestion> = Vec::new();

    if !body.selected_papers.is_empty() {
        let papers = papers_for(&state, &body.selected_papers);
        let prompt = suggestion_prompt(section, body.current_content.as_deref().unwrap_or_default());
        let generation = state
            .assistant
            .generate_content(&papers, "suggestions", &prompt)
            .await;
        suggestions.push(Suggestion::generated(generation.response));
    }
    suggestions.extend(generic_suggestions(section));

    Json(json!({
        "success": true,
        "suggestions": suggestions,
    }))
}

pub async fn chat_recommendations(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ChatRequest>,
) -> Json<Value> {
    let limit = body.limit.unwrap_or(CHAT_LIMIT);

    let mut papers = match not_blank(body.message.as_deref()) {
        Some(message) => {
            recommend::recommend_for_message(&state.library, message, recommend::DEFAULT_LIMIT)
        }
        None if !body.keywords.is_empty() => state.library.papers_by_keywords(&body.keywords),
        None => Vec::new(),
    };
    papers.truncate(limit);

    Json(json!({
        "success": true,
        "totalFound": papers.len(),
        "recommendedPapers": papers,
        "searchCriteria": {
            "message": body.message,
            "keywords": body.keywords,
        },
    }))
}

pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state.library.chat_history(&session_id, limit);
    Json(json!({
        "success": true,
        "history": history,
    }))
}

pub async fn clear_chat_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> AppResult<Json<Value>> {
    state.library.clear_chat_history(&session_id)?;
    Ok(Json(json!({
        "success": true,
        "message": "Chat history cleared",
    })))
}

// ============================================================================
// ArXiv
// ============================================================================

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArxivRequest {
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub papers_per_topic: Option<usize>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub confirm: Option<String>,
}

/// Fetch papers for each topic from arXiv and store them.
pub async fn arxiv_populate(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ArxivRequest>,
) -> AppResult<Json<Value>> {
    let topics = body
        .topics
        .unwrap_or_else(|| DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect());
    let per_topic = body.papers_per_topic.unwrap_or(DEFAULT_PAPERS_PER_TOPIC);

    info!(topics = ?topics, per_topic, "Populating library from arXiv");
    let papers = state.arxiv.fetch_all_topics(&topics, per_topic).await?;
    let ids = arxiv::ingest(&state.library, &papers)?;

    let summary: Vec<Value> = papers
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "title": p.title,
                "authors": p.authors,
                "topic": p.topic,
                "year": p.year,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully populated database with {} papers", ids.len()),
        "topics": topics,
        "papersAdded": ids.len(),
        "papers": summary,
    })))
}

pub async fn arxiv_search(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ArxivRequest>,
) -> AppResult<Json<Value>> {
    let Some(query) = not_blank(body.query.as_deref()) else {
        return Err(AppError::Validation("Query is required".to_string()));
    };

    let max_results = body.max_results.unwrap_or(DEFAULT_SEARCH_RESULTS);
    let papers = state.arxiv.search(query, max_results).await?;
    Ok(Json(json!({
        "success": true,
        "query": query,
        "results": papers.len(),
        "papers": papers,
    })))
}

pub async fn arxiv_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "success": true,
        "stats": state.library.stats(),
    }))
}

pub async fn arxiv_topic(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
) -> Json<Value> {
    let papers = state.library.papers_by_topic(&topic);
    Json(json!({
        "success": true,
        "topic": topic,
        "count": papers.len(),
        "papers": papers,
    }))
}

/// Papers matching explicit keywords, topped up with papers matching the
/// research terms found in a free-text prompt. Each paper appears once.
pub async fn arxiv_recommendations(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ArxivRequest>,
) -> Json<Value> {
    let limit = body.limit.unwrap_or(recommend::DEFAULT_LIMIT);

    let mut papers = if body.keywords.is_empty() {
        Vec::new()
    } else {
        state.library.papers_by_keywords(&body.keywords)
    };

    let extracted = body
        .prompt
        .as_deref()
        .map(recommend::extract_keywords)
        .unwrap_or_default();
    if papers.len() < limit && !extracted.is_empty() {
        papers.extend(state.library.papers_by_keywords(&extracted));
    }

    let mut unique: Vec<Paper> = Vec::with_capacity(limit);
    for paper in papers {
        if unique.len() >= limit {
            break;
        }
        if !unique.iter().any(|p| p.id == paper.id) {
            unique.push(paper);
        }
    }

    Json(json!({
        "success": true,
        "totalFound": unique.len(),
        "recommendedPapers": unique,
        "searchCriteria": {
            "keywords": body.keywords,
            "extractedKeywords": extracted,
            "prompt": body.prompt,
        },
    }))
}

pub async fn arxiv_clear(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<ArxivRequest>,
) -> AppResult<Json<Value>> {
    if body.confirm.as_deref() != Some("yes") {
        return Err(AppError::Validation(
            r#"Please confirm database clearing by sending { "confirm": "yes" }"#.to_string(),
        ));
    }

    state.library.clear_all()?;
    warn!("Library cleared");
    Ok(Json(json!({
        "success": true,
        "message": "Database cleared successfully",
    })))
}

// ============================================================================
// Uploads
// ============================================================================

struct ReceivedFile {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

fn multipart_error(e: MultipartError) -> AppError {
    AppError::Validation(format!("Invalid upload: {}", e.body_text()))
}

/// Buffer one file field, refusing anything over the per-file limit.
async fn read_upload(mut field: Field<'_>) -> AppResult<ReceivedFile> {
    let file_name = field.file_name().unwrap_or("upload").to_string();
    let content_type = field.content_type().map(str::to_string);

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        let size = data.len() + chunk.len();
        if size > MAX_UPLOAD_BYTES {
            return Err(AppError::PayloadTooLarge {
                size,
                limit: MAX_UPLOAD_BYTES,
            });
        }
        data.extend_from_slice(&chunk);
    }

    Ok(ReceivedFile {
        file_name,
        content_type,
        data,
    })
}

struct StoredPaper {
    upload_id: String,
    paper_id: String,
    file_name: String,
    title: String,
}

/// Save the file, record the upload, extract its text and add a paper.
/// If anything after the save fails, the upload is marked failed and the
/// file is removed.
async fn store_upload(state: &AppState, field: &str, file: ReceivedFile) -> AppResult<StoredPaper> {
    let kind = DocumentKind::detect(&file.file_name, file.content_type.as_deref())?;
    let stored_name = stored_file_name(field, kind);
    let path = state.uploads_dir.join(&stored_name);

    fs::write(&path, &file.data)
        .map_err(|e| AppError::Internal(format!("Failed to save upload: {}", e)))?;
    let path_text = path.to_string_lossy().into_owned();
    let upload_id = match state.library.record_upload(
        &stored_name,
        &path_text,
        Some(sha256_hex(&file.data)),
    ) {
        Ok(id) => id,
        Err(e) => {
            discard_file(&path);
            return Err(e.into());
        }
    };

    let added = extract_into_library(state, &path, &stored_name, file.file_name).await;
    let (paper_id, title) = match added {
        Ok(added) => added,
        Err(e) => {
            if let Err(status_err) = state.library.update_upload_status(
                &upload_id,
                ProcessingStatus::Failed,
                Some(e.to_string()),
            ) {
                warn!(%upload_id, error = %status_err, "Failed to mark upload as failed");
            }
            discard_file(&path);
            return Err(e);
        }
    };
    state
        .library
        .update_upload_status(&upload_id, ProcessingStatus::Completed, None)?;

    info!(%upload_id, %paper_id, file = %stored_name, "Upload processed");
    Ok(StoredPaper {
        upload_id,
        paper_id,
        file_name: stored_name,
        title,
    })
}

async fn extract_into_library(
    state: &AppState,
    path: &FsPath,
    stored_name: &str,
    original_name: String,
) -> AppResult<(String, String)> {
    let source = path.to_path_buf();
    let extracted = tokio::task::spawn_blocking(move || extract_paper(&source, &original_name))
        .await
        .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))?;

    let paper_id = state.library.add_paper(PaperInput {
        file_path: Some(path.to_string_lossy().into_owned()),
        file_name: Some(stored_name.to_string()),
        ..extracted.to_input()
    })?;
    Ok((paper_id, extracted.title))
}

fn discard_file(path: &FsPath) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove stored upload");
    }
}

/// Single file in the `paper` field.
pub async fn upload_paper(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("paper") {
            continue;
        }

        let file = read_upload(field).await?;
        let stored = store_upload(&state, "paper", file).await?;
        return Ok(Json(json!({
            "success": true,
            "uploadId": stored.upload_id,
            "paperId": stored.paper_id,
            "filename": stored.file_name,
            "title": stored.title,
            "message": "Paper uploaded and processed successfully",
        })));
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}

/// Up to ten files in the `papers` field. A bad file is reported in
/// `errors` without failing the others.
pub async fn upload_papers(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut uploaded: Vec<Value> = Vec::new();
    let mut errors: Vec<Value> = Vec::new();
    let mut total = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("papers") {
            continue;
        }
        total += 1;
        if total > MAX_FILES_PER_UPLOAD {
            return Err(AppError::Validation(format!(
                "Too many files, at most {} per upload",
                MAX_FILES_PER_UPLOAD
            )));
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let result = match read_upload(field).await {
            Ok(file) => store_upload(&state, "papers", file).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(stored) => uploaded.push(json!({
                "uploadId": stored.upload_id,
                "paperId": stored.paper_id,
                "filename": stored.file_name,
                "title": stored.title,
                "success": true,
            })),
            Err(e) => {
                warn!(file = %file_name, error = %e, "Upload failed");
                errors.push(json!({
                    "filename": file_name,
                    "error": e.to_string(),
                }));
            }
        }
    }

    if total == 0 {
        return Err(AppError::Validation("No files uploaded".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "total_files": total,
        "successful": uploaded.len(),
        "failed": errors.len(),
        "uploaded": uploaded,
        "errors": errors,
    })))
}

/// Re-run text extraction on a paper's stored file and merge the result.
pub async fn process_upload(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> AppResult<Json<Value>> {
    let paper = state
        .library
        .get_paper(&file_id)
        .ok_or_else(|| AppError::not_found("Paper"))?;
    let Some(file_path) = paper.file_path.clone() else {
        return Err(AppError::Validation("Paper has no stored file".to_string()));
    };

    let original_name = paper.file_name.clone().unwrap_or_else(|| file_path.clone());
    let extracted = tokio::task::spawn_blocking(move || {
        extract_paper(&PathBuf::from(file_path), &original_name)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))?;

    let updated = extracted.to_input();
    state.library.update_paper(&file_id, updated.clone())?;

    Ok(Json(json!({
        "success": true,
        "paperId": file_id,
        "updatedData": updated,
        "message": "Paper reprocessed successfully",
    })))
}

pub async fn upload_status(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> AppResult<Json<Value>> {
    let upload = state
        .library
        .get_upload(&upload_id)
        .ok_or_else(|| AppError::not_found("Upload"))?;
    Ok(Json(json!({ "success": true, "upload": upload })))
}

/// Remove a paper and its stored file. A file that cannot be removed is
/// logged and the record is deleted anyway.
pub async fn delete_upload(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> AppResult<Json<Value>> {
    let paper = state
        .library
        .get_paper(&file_id)
        .ok_or_else(|| AppError::not_found("Paper"))?;

    if let Some(ref file_path) = paper.file_path {
        match validate_path_within(&state.uploads_dir, &PathBuf::from(file_path)) {
            Ok(path) => {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Could not delete uploaded file");
                }
            }
            Err(e) => warn!(path = %file_path, error = %e, "Refusing to delete file"),
        }
    }

    state.library.delete_paper(&file_id)?;
    Ok(Json(json!({
        "success": true,
        "message": "File and paper record deleted successfully",
    })))
}

// ============================================================================
// Projects
// ============================================================================

pub async fn list_projects(State(state): State<Arc<AppState>>) -> Json<Value> {
    let projects = state.library.all_projects();
    Json(json!({
        "success": true,
        "count": projects.len(),
        "projects": projects,
    }))
}

/// Create a project, or update the one that already has this name.
pub async fn save_project(
    State(state): State<Arc<AppState>>,
    JsonBody(input): JsonBody<ProjectInput>,
) -> AppResult<Json<Value>> {
    let Some(name) = not_blank(input.name.as_deref()).map(str::to_string) else {
        return Err(AppError::Validation("Project name is required".to_string()));
    };

    let project = state.library.save_project(&name, input)?;
    Ok(Json(json!({ "success": true, "project": project })))
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let project = state
        .library
        .get_project(&id)
        .ok_or_else(|| AppError::not_found("Project"))?;
    Ok(Json(json!({ "success": true, "project": project })))
}
