//! PaperTrail library: re-exports for testing and external use.
//!
//! The server binary in `main.rs` only wires configuration and logging
//! around [`build_router`]; everything else lives here so integration tests
//! can drive the real router.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub mod arxiv;
pub mod citations;
pub mod config;
pub mod documents;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod llm;
pub mod models;
pub mod recommend;
pub mod store;

use arxiv::ArxivClient;
use documents::{MAX_FILES_PER_UPLOAD, MAX_UPLOAD_BYTES};
use llm::Assistant;
use store::Library;

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    pub library: Library,
    pub assistant: Assistant,
    pub arxiv: ArxivClient,
    pub uploads_dir: PathBuf,
}

impl AppState {
    /// Bundle the services; creates `uploads_dir` if it is missing.
    pub fn new(
        library: Library,
        assistant: Assistant,
        arxiv: ArxivClient,
        uploads_dir: impl Into<PathBuf>,
    ) -> std::io::Result<Self> {
        let uploads_dir = uploads_dir.into();
        fs::create_dir_all(&uploads_dir)?;
        Ok(Self {
            library,
            assistant,
            arxiv,
            uploads_dir,
        })
    }
}

/// Validate that a constructed path stays within the given base directory.
/// Returns the validated path on success, or an error message on failure.
/// For files that do not exist yet, validates the parent directory.
pub fn validate_path_within(base: &PathBuf, target: &PathBuf) -> Result<PathBuf, String> {
    let canonical_base = fs::canonicalize(base)
        .map_err(|e| format!("Cannot resolve base directory: {}", e))?;

    let canonical = if target.exists() {
        fs::canonicalize(target).map_err(|e| format!("Cannot resolve path: {}", e))?
    } else {
        let parent = target.parent().ok_or("No parent directory")?;
        let canonical_parent = fs::canonicalize(parent)
            .map_err(|e| format!("Cannot resolve parent: {}", e))?;
        match target.file_name() {
            Some(name) => canonical_parent.join(name),
            None => return Err("No file name".to_string()),
        }
    };

    if canonical.starts_with(&canonical_base) {
        Ok(canonical)
    } else {
        Err("Path escapes base directory".to_string())
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: Arc<AppState>) -> Router {
    let uploads = Router::new()
        .route("/api/upload/paper", post(handlers::upload_paper))
        .route("/api/upload/papers", post(handlers::upload_papers))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * MAX_FILES_PER_UPLOAD));

    Router::new()
        .route("/health", get(handlers::health))
        // Papers
        .route("/api/papers", get(handlers::list_papers).post(handlers::create_paper))
        .route(
            "/api/papers/{id}",
            get(handlers::get_paper)
                .put(handlers::update_paper)
                .delete(handlers::delete_paper),
        )
        .route("/api/papers/search/{query}", get(handlers::search_papers))
        .route("/api/papers/selected/list", get(handlers::selected_papers))
        .route("/api/papers/{id}/select", patch(handlers::select_paper))
        .route("/api/papers/{id}/content", get(handlers::paper_content))
        .route("/api/papers/{id}/similar", get(handlers::similar_papers))
        // Citations
        .route(
            "/api/citations/generate/{paper_id}",
            post(handlers::generate_paper_citation),
        )
        .route("/api/citations/selected", post(handlers::cite_selected))
        .route("/api/citations/bibliography", post(handlers::bibliography))
        .route("/api/citations/style/{style}", get(handlers::citations_by_style))
        .route("/api/citations/extract", post(handlers::extract_markers))
        // Chat
        .route("/api/chat/message", post(handlers::chat_message))
        .route("/api/chat/populate", post(handlers::chat_populate))
        .route("/api/chat/cite", post(handlers::chat_cite))
        .route("/api/chat/summarize", post(handlers::chat_summarize))
        .route("/api/chat/suggestions", post(handlers::chat_suggestions))
        .route("/api/chat/recommendations", post(handlers::chat_recommendations))
        .route(
            "/api/chat/history/{session_id}",
            get(handlers::chat_history).delete(handlers::clear_chat_history),
        )
        // ArXiv
        .route("/api/arxiv/populate", post(handlers::arxiv_populate))
        .route("/api/arxiv/search", post(handlers::arxiv_search))
        .route("/api/arxiv/recommendations", post(handlers::arxiv_recommendations))
        .route("/api/arxiv/clear", post(handlers::arxiv_clear))
        .route("/api/arxiv/stats", get(handlers::arxiv_stats))
        .route("/api/arxiv/topics/{topic}", get(handlers::arxiv_topic))
        // Uploads
        .merge(uploads)
        .route("/api/upload/process/{file_id}", post(handlers::process_upload))
        .route("/api/upload/status/{upload_id}", get(handlers::upload_status))
        .route("/api/upload/file/{file_id}", axum::routing::delete(handlers::delete_upload))
        // Projects
        .route("/api/projects", get(handlers::list_projects).post(handlers::save_project))
        .route("/api/projects/{id}", get(handlers::get_project))
        .nest_service("/uploads", ServeDir::new(&state.uploads_dir))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Re-export commonly used types
pub use citations::{format_citation, generate_citation, in_text_citations};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use extract::{extract_citations, extract_metadata, extract_year};
pub use models::{CitationStyle, Paper, PaperInput};
pub use recommend::{extract_keywords, relevance_score};
pub use store::{JsonFiles, MemoryPersistence, Persistence};
