//! The library: every persisted collection, held in memory and written back
//! wholesale after each mutation.
//!
//! Storage is injected through [`Persistence`]; [`JsonFiles`] keeps one
//! pretty-printed JSON array per collection under the data directory and
//! [`MemoryPersistence`] keeps them in a map (tests, ephemeral runs).
//!
//! Missing ids are never errors: `get_*` returns `None`, updates and
//! deletes are no-ops. A collection file that cannot be read or parsed
//! loads as empty (a warning is logged) and is overwritten by the next
//! mutation of that collection.

use chrono::Utc;
use rayon::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::models::{
    new_id, ChatMessage, Citation, CitationStyle, CitationWithPaper, LibraryStats, Paper,
    PaperInput, ProcessingStatus, Project, ProjectInput, Role, Upload,
};

// ============================================================================
// Persistence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Papers,
    Citations,
    ChatHistory,
    Projects,
    Uploads,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Papers,
        Collection::Citations,
        Collection::ChatHistory,
        Collection::Projects,
        Collection::Uploads,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Papers => "papers",
            Collection::Citations => "citations",
            Collection::ChatHistory => "chat_history",
            Collection::Projects => "projects",
            Collection::Uploads => "uploads",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.name())
    }
}

/// Whole-document storage for one collection at a time.
pub trait Persistence: Send + Sync {
    /// Raw contents of the collection, `None` if it was never written.
    fn load(&self, collection: Collection) -> io::Result<Option<String>>;

    /// Replace the collection's contents.
    fn save(&self, collection: Collection, contents: &str) -> io::Result<()>;
}

/// One JSON file per collection under a data directory.
pub struct JsonFiles {
    dir: PathBuf,
}

impl JsonFiles {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }
}

impl Persistence for JsonFiles {
    fn load(&self, collection: Collection) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(collection)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, collection: Collection, contents: &str) -> io::Result<()> {
        fs::write(self.path(collection), contents)
    }
}

#[derive(Default)]
pub struct MemoryPersistence {
    files: Mutex<HashMap<Collection, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with raw contents, as if it had been written earlier.
    pub fn with(self, collection: Collection, contents: &str) -> Self {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection, contents.to_string());
        self
    }

    pub fn contents(&self, collection: Collection) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&collection)
            .cloned()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, collection: Collection) -> io::Result<Option<String>> {
        Ok(self.contents(collection))
    }

    fn save(&self, collection: Collection, contents: &str) -> io::Result<()> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection, contents.to_string());
        Ok(())
    }
}

impl<P: Persistence + ?Sized> Persistence for std::sync::Arc<P> {
    fn load(&self, collection: Collection) -> io::Result<Option<String>> {
        (**self).load(collection)
    }

    fn save(&self, collection: Collection, contents: &str) -> io::Result<()> {
        (**self).save(collection, contents)
    }
}

// ============================================================================
// Library
// ============================================================================

#[derive(Default)]
struct Collections {
    papers: Vec<Paper>,
    citations: Vec<Citation>,
    chat_history: Vec<ChatMessage>,
    projects: Vec<Project>,
    uploads: Vec<Upload>,
}

impl Collections {
    fn papers_mut(&mut self) -> &mut Vec<Paper> {
        &mut self.papers
    }

    fn citations_mut(&mut self) -> &mut Vec<Citation> {
        &mut self.citations
    }

    fn chat_history_mut(&mut self) -> &mut Vec<ChatMessage> {
        &mut self.chat_history
    }

    fn projects_mut(&mut self) -> &mut Vec<Project> {
        &mut self.projects
    }

    fn uploads_mut(&mut self) -> &mut Vec<Upload> {
        &mut self.uploads
    }
}

pub struct Library {
    persistence: Box<dyn Persistence>,
    data: RwLock<Collections>,
}

impl Library {
    /// Load every collection from `persistence`.
    pub fn open(persistence: impl Persistence + 'static) -> Self {
        let data = Collections {
            papers: load_collection(&persistence, Collection::Papers),
            citations: load_collection(&persistence, Collection::Citations),
            chat_history: load_collection(&persistence, Collection::ChatHistory),
            projects: load_collection(&persistence, Collection::Projects),
            uploads: load_collection(&persistence, Collection::Uploads),
        };

        info!(
            papers = data.papers.len(),
            citations = data.citations.len(),
            messages = data.chat_history.len(),
            projects = data.projects.len(),
            uploads = data.uploads.len(),
            "Library loaded"
        );

        Self {
            persistence: Box::new(persistence),
            data: RwLock::new(data),
        }
    }

    /// Empty library backed by memory only.
    pub fn in_memory() -> Self {
        Self::open(MemoryPersistence::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy of one collection and write the copy back in
    /// full. The in-memory collection is replaced only after the write
    /// succeeds, so a failed save leaves memory matching storage.
    ///
    /// `change` returns `None` when it changed nothing; no write happens
    /// then. Called with the write guard held so saves never interleave.
    fn commit<T, R>(
        &self,
        data: &mut Collections,
        collection: Collection,
        slot: fn(&mut Collections) -> &mut Vec<T>,
        change: impl FnOnce(&mut Vec<T>) -> Option<R>,
    ) -> StoreResult<Option<R>>
    where
        T: Clone + Serialize,
    {
        let current = slot(data);
        let mut next = current.clone();
        let Some(result) = change(&mut next) else {
            return Ok(None);
        };
        self.save(collection, &next)?;
        *current = next;
        Ok(Some(result))
    }

    fn save<T: Serialize>(&self, collection: Collection, items: &[T]) -> StoreResult<()> {
        let name = collection.name();
        let contents = to_json(name, items)?;
        self.persistence
            .save(collection, &contents)
            .map_err(|source| StoreError::Io {
                collection: name,
                source,
            })?;
        debug!(collection = name, bytes = contents.len(), "Collection flushed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Papers
    // ------------------------------------------------------------------------

    /// Store a new paper and return its fresh id. A blank or missing title
    /// is stored as "Untitled"; callers that need a title validate first.
    pub fn add_paper(&self, input: PaperInput) -> StoreResult<String> {
        let title = input
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let id = new_id();
        let paper = Paper::from_input(id.clone(), title, input, Utc::now());

        let mut data = self.write();
        self.commit(&mut data, Collection::Papers, Collections::papers_mut, |papers| {
            papers.push(paper);
            Some(())
        })?;
        Ok(id)
    }

    pub fn get_paper(&self, id: &str) -> Option<Paper> {
        self.read().papers.iter().find(|p| p.id == id).cloned()
    }

    /// Every paper, newest first.
    pub fn all_papers(&self) -> Vec<Paper> {
        self.read().papers.iter().rev().cloned().collect()
    }

    /// Merge `patch` into the paper. Returns whether the paper existed.
    pub fn update_paper(&self, id: &str, patch: PaperInput) -> StoreResult<bool> {
        let mut data = self.write();
        let updated = self.commit(&mut data, Collection::Papers, Collections::papers_mut, |papers| {
            let paper = papers.iter_mut().find(|p| p.id == id)?;
            paper.apply(patch);
            Some(())
        })?;
        Ok(updated.is_some())
    }

    /// Remove the paper. Citations that reference it are left in place.
    pub fn delete_paper(&self, id: &str) -> StoreResult<bool> {
        let mut data = self.write();
        let removed = self.commit(&mut data, Collection::Papers, Collections::papers_mut, |papers| {
            let before = papers.len();
            papers.retain(|p| p.id != id);
            (papers.len() != before).then_some(())
        })?;
        Ok(removed.is_some())
    }

    pub fn set_selection(&self, id: &str, selected: bool) -> StoreResult<bool> {
        self.update_paper(
            id,
            PaperInput {
                is_selected: Some(selected),
                ..Default::default()
            },
        )
    }

    /// Case-insensitive substring match on title, authors or abstract.
    pub fn search_papers(&self, query: &str) -> Vec<Paper> {
        let needle = query.to_lowercase();
        let contains = |field: &Option<String>| {
            field
                .as_deref()
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false)
        };

        let data = self.read();
        let mut matches: Vec<Paper> = data
            .papers
            .par_iter()
            .filter(|p| {
                p.title.to_lowercase().contains(&needle)
                    || contains(&p.authors)
                    || contains(&p.abstract_text)
            })
            .cloned()
            .collect();
        matches.reverse();
        matches
    }

    pub fn selected_papers(&self) -> Vec<Paper> {
        self.read()
            .papers
            .iter()
            .rev()
            .filter(|p| p.is_selected)
            .cloned()
            .collect()
    }

    /// Papers whose keywords/topic contain any of `keywords`, ignoring case.
    pub fn papers_by_keywords(&self, keywords: &[String]) -> Vec<Paper> {
        let needles: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if needles.is_empty() {
            return Vec::new();
        }

        self.read()
            .papers
            .iter()
            .rev()
            .filter(|p| {
                let haystack = p.keyword_haystack();
                needles.iter().any(|n| haystack.contains(n.as_str()))
            })
            .cloned()
            .collect()
    }

    /// Papers filed under exactly `topic`, most recent and most cited first.
    pub fn papers_by_topic(&self, topic: &str) -> Vec<Paper> {
        let mut papers: Vec<Paper> = self
            .read()
            .papers
            .iter()
            .rev()
            .filter(|p| p.topic.as_deref() == Some(topic))
            .cloned()
            .collect();
        papers.sort_by(|a, b| {
            b.year
                .cmp(&a.year)
                .then_with(|| b.citation_count.unwrap_or(0).cmp(&a.citation_count.unwrap_or(0)))
        });
        papers
    }

    pub fn stats(&self) -> LibraryStats {
        let data = self.read();
        let mut stats = LibraryStats {
            total_papers: data.papers.len(),
            selected_papers: data.papers.iter().filter(|p| p.is_selected).count(),
            ..Default::default()
        };
        for paper in &data.papers {
            if let Some(ref topic) = paper.topic {
                *stats.topics.entry(topic.clone()).or_insert(0) += 1;
            }
            if let Some(year) = paper.year {
                *stats.year_distribution.entry(year).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Drop all papers, citations and chat history. Collections are cleared
    /// one at a time; a failed save stops before the remaining ones.
    pub fn clear_all(&self) -> StoreResult<()> {
        let mut data = self.write();
        self.commit(&mut data, Collection::Papers, Collections::papers_mut, |papers| {
            papers.clear();
            Some(())
        })?;
        self.commit(&mut data, Collection::Citations, Collections::citations_mut, |citations| {
            citations.clear();
            Some(())
        })?;
        self.commit(&mut data, Collection::ChatHistory, Collections::chat_history_mut, |chat| {
            chat.clear();
            Some(())
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Citations
    // ------------------------------------------------------------------------

    /// Append a citation record. Regenerating never replaces an older one.
    pub fn add_citation(
        &self,
        paper_id: &str,
        citation_text: &str,
        style: CitationStyle,
    ) -> StoreResult<Citation> {
        let citation = Citation {
            id: new_id(),
            paper_id: paper_id.to_string(),
            citation_text: citation_text.to_string(),
            style,
            created_at: Utc::now(),
        };

        let mut data = self.write();
        self.commit(&mut data, Collection::Citations, Collections::citations_mut, |citations| {
            citations.push(citation.clone());
            Some(())
        })?;
        Ok(citation)
    }

    /// Citations of one style joined with their papers, most recent paper
    /// year first. Citations whose paper is gone are skipped.
    pub fn citations_by_style(&self, style: CitationStyle) -> Vec<CitationWithPaper> {
        let data = self.read();
        let mut joined: Vec<CitationWithPaper> = data
            .citations
            .iter()
            .filter(|c| c.style == style)
            .filter_map(|c| {
                let paper = data.papers.iter().find(|p| p.id == c.paper_id)?;
                Some(CitationWithPaper {
                    citation: c.clone(),
                    title: paper.title.clone(),
                    authors: paper.authors.clone(),
                    year: paper.year,
                    venue: paper.venue.clone(),
                })
            })
            .collect();
        joined.sort_by(|a, b| b.year.cmp(&a.year));
        joined
    }

    // ------------------------------------------------------------------------
    // Chat history
    // ------------------------------------------------------------------------

    pub fn save_chat_message(
        &self,
        session_id: &str,
        role: Role,
        message: &str,
        paper_context: Option<String>,
    ) -> StoreResult<String> {
        let entry = ChatMessage {
            id: new_id(),
            session_id: session_id.to_string(),
            role,
            message: message.to_string(),
            timestamp: Utc::now(),
            paper_context,
        };
        let id = entry.id.clone();

        let mut data = self.write();
        self.commit(&mut data, Collection::ChatHistory, Collections::chat_history_mut, |chat| {
            chat.push(entry);
            Some(())
        })?;
        Ok(id)
    }

    /// The last `limit` messages of a session in chronological order.
    pub fn chat_history(&self, session_id: &str, limit: usize) -> Vec<ChatMessage> {
        let mut messages: Vec<ChatMessage> = self
            .read()
            .chat_history
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        let skip = messages.len().saturating_sub(limit);
        messages.split_off(skip)
    }

    pub fn clear_chat_history(&self, session_id: &str) -> StoreResult<()> {
        let mut data = self.write();
        self.commit(&mut data, Collection::ChatHistory, Collections::chat_history_mut, |chat| {
            chat.retain(|m| m.session_id != session_id);
            Some(())
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    /// Upsert by name: a project with the same name is updated in place and
    /// keeps its id and creation time.
    pub fn save_project(&self, name: &str, input: ProjectInput) -> StoreResult<Project> {
        let now = Utc::now();
        let mut data = self.write();

        let project = match data.projects.iter().find(|p| p.name == name) {
            Some(existing) => {
                let mut project = existing.clone();
                if input.title.is_some() {
                    project.title = input.title;
                }
                if let Some(sections) = input.sections {
                    project.sections = sections;
                }
                if let Some(metadata) = input.metadata {
                    project.metadata = metadata;
                }
                project.last_modified = now;
                project
            }
            None => Project {
                id: new_id(),
                name: name.to_string(),
                title: input.title,
                sections: input.sections.unwrap_or_default(),
                metadata: input.metadata.unwrap_or_default(),
                created_at: now,
                last_modified: now,
            },
        };

        let saved = project.clone();
        self.commit(&mut data, Collection::Projects, Collections::projects_mut, |projects| {
            match projects.iter_mut().find(|p| p.id == saved.id) {
                Some(slot) => *slot = saved,
                None => projects.push(saved),
            }
            Some(())
        })?;
        Ok(project)
    }

    pub fn get_project(&self, id: &str) -> Option<Project> {
        self.read().projects.iter().find(|p| p.id == id).cloned()
    }

    pub fn all_projects(&self) -> Vec<Project> {
        self.read().projects.clone()
    }

    // ------------------------------------------------------------------------
    // Uploads
    // ------------------------------------------------------------------------

    pub fn record_upload(
        &self,
        file_name: &str,
        file_path: &str,
        content_hash: Option<String>,
    ) -> StoreResult<String> {
        let upload = Upload {
            id: new_id(),
            file_name: file_name.to_string(),
            file_path: file_path.to_string(),
            content_hash,
            upload_status: ProcessingStatus::Completed,
            processing_status: ProcessingStatus::Pending,
            error_message: None,
            uploaded_at: Utc::now(),
        };
        let id = upload.id.clone();

        let mut data = self.write();
        self.commit(&mut data, Collection::Uploads, Collections::uploads_mut, |uploads| {
            uploads.push(upload);
            Some(())
        })?;
        Ok(id)
    }

    pub fn update_upload_status(
        &self,
        id: &str,
        status: ProcessingStatus,
        error_message: Option<String>,
    ) -> StoreResult<bool> {
        let mut data = self.write();
        let updated = self.commit(&mut data, Collection::Uploads, Collections::uploads_mut, |uploads| {
            let upload = uploads.iter_mut().find(|u| u.id == id)?;
            upload.processing_status = status;
            if error_message.is_some() {
                upload.error_message = error_message;
            }
            Some(())
        })?;
        Ok(updated.is_some())
    }

    pub fn get_upload(&self, id: &str) -> Option<Upload> {
        self.read().uploads.iter().find(|u| u.id == id).cloned()
    }
}

fn load_collection<T: DeserializeOwned>(
    persistence: &dyn Persistence,
    collection: Collection,
) -> Vec<T> {
    let raw = match persistence.load(collection) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(collection = collection.name(), error = %e, "Cannot read collection, starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            warn!(
                collection = collection.name(),
                error = %e,
                "Collection is not valid JSON, starting empty; it will be overwritten on the next change"
            );
            Vec::new()
        }
    }
}

fn to_json<T: Serialize>(collection: &'static str, items: &[T]) -> StoreResult<String> {
    serde_json::to_string_pretty(items).map_err(|source| StoreError::Serialize {
        collection,
        source,
    })
}
