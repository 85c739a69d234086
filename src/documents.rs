//! Uploaded document handling: type allow-list, stored file naming, and
//! text extraction for PDF, DOCX and DOC files.
//!
//! Extraction is blocking (it may shell out to `pdftotext`); callers on the
//! async runtime should run it through `spawn_blocking`.

use crate::error::DocumentError;
use crate::extract::{extract_metadata, extract_year};
use crate::models::PaperInput;

use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};
use zip::ZipArchive;

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub const MAX_FILES_PER_UPLOAD: usize = 10;

/// Content stored for a paper whose file could not be read.
pub const EXTRACTION_FAILED: &str = "Content extraction failed";

const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

// ============================================================================
// File Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Doc,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            "doc" => Some(DocumentKind::Doc),
            _ => None,
        }
    }

    /// Both the extension and, when the client sent one, the MIME type must
    /// be on the allow-list.
    pub fn detect(file_name: &str, content_type: Option<&str>) -> Result<Self, DocumentError> {
        let kind = Self::from_path(Path::new(file_name)).ok_or_else(|| {
            DocumentError::Unsupported(format!(
                "{}: only PDF, DOC, and DOCX files are allowed",
                file_name
            ))
        })?;

        if let Some(mime) = content_type {
            let mime = mime.split(';').next().unwrap_or(mime).trim().to_lowercase();
            if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
                return Err(DocumentError::Unsupported(format!(
                    "{}: content type {} is not allowed",
                    file_name, mime
                )));
            }
        }

        Ok(kind)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Docx => "docx",
            DocumentKind::Doc => "doc",
        }
    }
}

/// `{field}-{millis}-{random}.{ext}`, unique enough for one uploads directory.
pub fn stored_file_name(field: &str, kind: DocumentKind) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}-{}.{}", field, millis, suffix, kind.extension())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Text Extraction
// ============================================================================

fn run_pdftotext(path: &Path) -> Result<String, DocumentError> {
    let output = Command::new("pdftotext")
        .arg(path.as_os_str())
        .arg("-")
        .output()
        .map_err(|e| {
            DocumentError::Extraction(format!("Failed to run pdftotext: {}. Is poppler installed?", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DocumentError::Extraction(format!("pdftotext failed: {}", stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn run_pdf_extract(path: &Path) -> Result<String, DocumentError> {
    let bytes = std::fs::read(path)
        .map_err(|e| DocumentError::Extraction(format!("Cannot read PDF: {}", e)))?;
    pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| DocumentError::Extraction(format!("pdf-extract failed: {}", e)))
}

/// Try `pdftotext` and `pdf-extract` and keep whichever produced more text.
fn extract_pdf_text(path: &Path) -> Result<String, DocumentError> {
    let mut candidates: Vec<String> = Vec::new();
    let mut last_error = None;

    for result in [run_pdftotext(path), run_pdf_extract(path)] {
        match result {
            Ok(text) if !text.trim().is_empty() => candidates.push(text),
            Ok(_) => {}
            Err(e) => {
                debug!(path = %path.display(), error = %e, "PDF extractor failed");
                last_error = Some(e);
            }
        }
    }

    candidates
        .into_iter()
        .max_by_key(|t| t.trim().len())
        .ok_or_else(|| {
            last_error.unwrap_or_else(|| DocumentError::Extraction("PDF contains no text".to_string()))
        })
}

/// Paragraph text of `word/document.xml`, one paragraph per line.
fn extract_docx_text(path: &Path) -> Result<String, DocumentError> {
    let file = File::open(path)
        .map_err(|e| DocumentError::Extraction(format!("Cannot open DOCX: {}", e)))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| DocumentError::Extraction(format!("Invalid DOCX archive: {}", e)))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| DocumentError::Extraction(format!("Missing word/document.xml: {}", e)))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| DocumentError::Extraction(format!("Cannot read word/document.xml: {}", e)))?;

    Ok(docx_xml_to_text(&xml))
}

static XML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid xml tag regex"));

fn docx_xml_to_text(xml: &str) -> String {
    let spaced = xml
        .replace("</w:p>", "\n")
        .replace("<w:tab/>", "\t")
        .replace("<w:br/>", "\n");
    XML_TAG_RE
        .replace_all(&spaced, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, DocumentError> {
    match kind {
        DocumentKind::Pdf => extract_pdf_text(path),
        DocumentKind::Docx => extract_docx_text(path),
        DocumentKind::Doc => std::fs::read(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| DocumentError::Extraction(format!("Cannot read DOC: {}", e))),
    }
}

// ============================================================================
// Paper Data
// ============================================================================

/// Bibliographic fields recovered from an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPaper {
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
    pub content_text: String,
    pub year: Option<i32>,
}

impl ExtractedPaper {
    pub fn to_input(&self) -> PaperInput {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        PaperInput {
            title: Some(self.title.clone()),
            authors: non_empty(&self.authors),
            abstract_text: non_empty(&self.abstract_text),
            content_text: Some(self.content_text.clone()),
            year: self.year,
            ..Default::default()
        }
    }
}

/// Read `path` and guess its metadata. Never fails: when the text cannot be
/// extracted the title falls back to the file stem and the content is
/// [`EXTRACTION_FAILED`].
pub fn extract_paper(path: &Path, original_name: &str) -> ExtractedPaper {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original_name)
        .to_string();

    let text = DocumentKind::from_path(Path::new(original_name))
        .or_else(|| DocumentKind::from_path(path))
        .ok_or_else(|| DocumentError::Unsupported(original_name.to_string()))
        .and_then(|kind| extract_text(path, kind));

    match text {
        Ok(content) => {
            let meta = extract_metadata(&content);
            ExtractedPaper {
                title: if meta.title.is_empty() { stem } else { meta.title },
                authors: meta.authors,
                abstract_text: meta.abstract_text,
                year: extract_year(&content),
                content_text: content,
            }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Text extraction failed, using file name");
            ExtractedPaper {
                title: stem,
                authors: String::new(),
                abstract_text: String::new(),
                content_text: EXTRACTION_FAILED.to_string(),
                year: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_allows_listed_types() {
        assert_eq!(DocumentKind::detect("a.PDF", Some("application/pdf")).unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::detect("a.doc", Some("application/msword")).unwrap(), DocumentKind::Doc);
        assert_eq!(DocumentKind::detect("a.docx", None).unwrap(), DocumentKind::Docx);
    }

    #[test]
    fn test_detect_rejects_other_types() {
        assert!(DocumentKind::detect("notes.txt", Some("text/plain")).is_err());
        assert!(DocumentKind::detect("paper.pdf", Some("text/html")).is_err());
        assert!(DocumentKind::detect("no_extension", None).is_err());
    }

    #[test]
    fn test_stored_file_name_shape() {
        let name = stored_file_name("paper", DocumentKind::Pdf);
        assert!(name.starts_with("paper-"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(name.split('-').count(), 3);
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_docx_xml_to_text() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Deep Models</w:t></w:r></w:p><w:p><w:r><w:t>A &amp; B</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(docx_xml_to_text(xml), "Deep Models\nA & B\n");
    }

    #[test]
    fn test_extract_docx_from_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.docx");
        {
            let file = File::create(&path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(
                br#"<w:document><w:body><w:p><w:t>A Survey Of Quantum Error Correction</w:t></w:p><w:p><w:t>Alice Smith, Bob Jones</w:t></w:p><w:p><w:t>Published 2021</w:t></w:p></w:body></w:document>"#,
            )
            .unwrap();
            zip.finish().unwrap();
        }

        let paper = extract_paper(&path, "paper.docx");
        assert_eq!(paper.title, "A Survey Of Quantum Error Correction");
        assert_eq!(paper.authors, "Alice Smith, Bob Jones");
        assert_eq!(paper.year, Some(2021));
    }

    #[test]
    fn test_doc_is_read_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.doc");
        std::fs::write(&path, "LEGACY DOCUMENT TITLE\nbody").unwrap();
        let paper = extract_paper(&path, "old.doc");
        assert_eq!(paper.title, "LEGACY DOCUMENT TITLE");
        assert_eq!(paper.content_text, "LEGACY DOCUMENT TITLE\nbody");
    }

    #[test]
    fn test_failed_extraction_falls_back_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, "not a zip").unwrap();

        let paper = extract_paper(&path, "My Draft.docx");
        assert_eq!(paper.title, "My Draft");
        assert_eq!(paper.content_text, EXTRACTION_FAILED);
        assert_eq!(paper.year, None);

        let input = paper.to_input();
        assert_eq!(input.authors, None);
        assert_eq!(input.title.as_deref(), Some("My Draft"));
    }
}
