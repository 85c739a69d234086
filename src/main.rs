//! PaperTrail server: a research-paper library with citation formatting,
//! an assistant for drafting, arXiv ingestion and document uploads.
//!
//! The application is organized into the following modules:
//!
//! - `config`: environment-driven settings
//! - `store`: papers, citations, chat, projects and uploads as JSON files
//! - `citations`, `extract`, `recommend`: formatting and text heuristics
//! - `llm`, `arxiv`: outbound clients
//! - `documents`: upload allow-list and text extraction
//! - `handlers`: HTTP route handlers

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use papertrail::arxiv::ArxivClient;
use papertrail::config::{Config, LogFormat};
use papertrail::llm::Assistant;
use papertrail::store::{JsonFiles, Library};
use papertrail::{build_router, AppState};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(&config);

    let persistence = JsonFiles::new(&config.storage.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.storage.data_dir.display())
    })?;
    let library = Library::open(persistence);
    let assistant = Assistant::from_config(&config.llm).context("Failed to build LLM client")?;
    let arxiv = ArxivClient::new(&config.arxiv).context("Failed to build arXiv client")?;

    let state = AppState::new(library, assistant, arxiv, &config.storage.uploads_dir)
        .context("Failed to create uploads directory")?;
    let app = build_router(Arc::new(state));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "PaperTrail server running");
    info!(
        data_dir = %config.storage.data_dir.display(),
        uploads_dir = %config.storage.uploads_dir.display(),
        "Storage"
    );
    if config.llm.enabled {
        info!(model = %config.llm.model, base_url = %config.llm.base_url, "Assistant: remote model with canned fallback");
    } else {
        info!("Assistant: canned responses only (set LLM_ENABLED=true to use a model)");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer())
                .init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
