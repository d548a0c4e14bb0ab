use std::fs;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::chunk_text::{chunk_pages, Chunk, PageText};
use crate::config::Config;
use crate::error::{RagError, Result};

/// SHA-256 of the raw file bytes, hex encoded. Identifies an upload for caching.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentFingerprint(pub String);

impl DocumentFingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn of_file(path: &Path) -> Result<Self> {
        Ok(Self::of_bytes(&fs::read(path)?))
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

/// Loads a single PDF and splits it into chunks. Never returns an empty list.
pub fn ingest(cfg: &Config, path: &Path) -> Result<Vec<Chunk>> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(RagError::ingestion(&display, "file does not exist"));
    }
    if !path.is_file() {
        return Err(RagError::ingestion(&display, "path is not a file"));
    }
    if !is_pdf(path) {
        return Err(RagError::ingestion(&display, "only PDF files are supported"));
    }

    let bytes = fs::read(path)
        .map_err(|e| RagError::ingestion(&display, format!("cannot read file: {}", e)))?;
    let pages = extract_pages(&bytes, cfg.pdf_extract_timeout)
        .map_err(|message| RagError::ingestion(&display, message))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| display.clone());
    let chunks = chunk_pages(&name, &pages, cfg);
    if chunks.is_empty() {
        return Err(RagError::ingestion(&display, "document contains no extractable text"));
    }

    tracing::info!(
        file = %name,
        pages = pages.len(),
        chunks = chunks.len(),
        "document ingested"
    );
    Ok(chunks)
}

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Page-by-page text via lopdf, falling back to pdf-extract over the whole file.
fn extract_pages(bytes: &[u8], timeout: Duration) -> std::result::Result<Vec<PageText>, String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| format!("not a readable PDF: {}", e))?;

    let mut pages = Vec::new();
    for number in doc.get_pages().keys().copied() {
        match doc.extract_text(&[number]) {
            Ok(text) => {
                let text = clean_text(&text);
                if !text.is_empty() {
                    pages.push(PageText { number, text });
                }
            }
            Err(e) => tracing::debug!(page = number, "lopdf could not extract page: {}", e),
        }
    }
    if !pages.is_empty() {
        return Ok(pages);
    }

    tracing::warn!("lopdf found no text, trying pdf-extract");
    let data = bytes.to_vec();
    let text = run_with_timeout(timeout, move || {
        pdf_extract::extract_text_from_mem(&data).map_err(|e| e.to_string())
    })?
    .map_err(|e| format!("text extraction failed: {}", e))?;
    let text = clean_text(&text);
    if text.is_empty() {
        return Err("document contains no extractable text".to_string());
    }
    Ok(vec![PageText { number: 1, text }])
}

/// Runs `work` on its own thread and gives up after `timeout`.
///
/// pdf-extract can panic or loop forever on malformed fonts. A thread that
/// times out is left behind; it cannot be cancelled.
fn run_with_timeout<T, F>(timeout: Duration, work: F) -> std::result::Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("pdf-extract".to_string())
        .spawn(move || {
            let _ = tx.send(work());
        })
        .map_err(|e| format!("cannot start text extraction: {}", e))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            tracing::error!(?timeout, "pdf-extract did not finish in time");
            Err(format!("text extraction timed out after {:?}", timeout))
        }
        // The worker dropped its sender without a result, i.e. it panicked.
        Err(RecvTimeoutError::Disconnected) => Err("text extraction crashed".to_string()),
    }
}

fn clean_text(raw: &str) -> String {
    raw.replace('\0', "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
