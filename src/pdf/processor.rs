// src/pdf/processor.rs
// PDF corpus loading: directory listing and per-page text extraction.

use crate::parser::clean_text;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("No PDF documents found in {0}")]
    NoDocuments(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub page: usize,
    pub content: String,
}

/// Lists `*.pdf` files directly under `dir`, sorted by file name.
pub fn list_pdf_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Seahash over file names, sizes and modification times.
pub fn corpus_fingerprint(files: &[PathBuf]) -> String {
    let mut buf = Vec::new();
    for path in files {
        buf.extend_from_slice(path.to_string_lossy().as_bytes());
        if let Ok(meta) = std::fs::metadata(path) {
            buf.extend_from_slice(&meta.len().to_le_bytes());
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            buf.extend_from_slice(&mtime.to_le_bytes());
        }
        buf.push(0);
    }
    format!("{:016x}", seahash::hash(&buf))
}

/// One cleaned document per non-empty page; `page` is the zero-based page
/// number in the file.
pub fn page_documents(source: &str, pages: &[String]) -> Vec<Document> {
    pages
        .iter()
        .map(|text| clean_text(text))
        .enumerate()
        .filter(|(_, content)| !content.is_empty())
        .map(|(page, content)| Document {
            source: source.to_string(),
            page,
            content,
        })
        .collect()
}

/// Extracts every PDF under `dir`. Files that fail to parse are skipped.
pub fn load_pdf_directory(dir: &Path) -> Result<Vec<Document>, PdfError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "PDF directory does not exist");
        return Err(PdfError::NoDocuments(dir.display().to_string()));
    }

    let files = list_pdf_files(dir);
    let mut docs = Vec::new();
    for path in &files {
        let source = path.display().to_string();
        // pdf-extract panics on some malformed fonts
        match std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path)) {
            Ok(Ok(pages)) => {
                let pages = page_documents(&source, &pages);
                debug!(source = %source, pages = pages.len(), "Extracted PDF");
                docs.extend(pages);
            }
            Ok(Err(e)) => {
                warn!(source = %source, error = %e, "Skipping unreadable PDF");
            }
            Err(_) => {
                warn!(source = %source, "PDF extraction panicked; skipping");
            }
        }
    }

    if docs.is_empty() {
        return Err(PdfError::NoDocuments(dir.display().to_string()));
    }
    info!(dir = %dir.display(), files = files.len(), pages = docs.len(), "Loaded PDF corpus");
    Ok(docs)
}
