use serde::Serialize;

use crate::config::Config;

/// A fragment of a document that is embedded and retrieved on its own.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Chunk {
    /// File name the chunk was read from.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Position of the chunk within the document.
    pub index: usize,
    pub text: String,
}

/// Text of one PDF page.
#[derive(Clone, Debug)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Splits every page separately so each chunk keeps a single page attribution.
pub fn chunk_pages(source: &str, pages: &[PageText], cfg: &Config) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for text in split_windows(&page.text, cfg.chunk_size, cfg.chunk_overlap) {
            chunks.push(Chunk {
                source: source.to_string(),
                page: page.number,
                index: chunks.len(),
                text,
            });
        }
    }
    chunks
}

/// Character windows of `size` with `overlap`, preferring to end on whitespace.
pub fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if size == 0 || chars.len() <= size {
        let trimmed = text.trim();
        return if trimmed.is_empty() {
            vec![]
        } else {
            vec![trimmed.to_string()]
        };
    }
    let overlap = if overlap >= size { size / 4 } else { overlap };

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            end = snap_to_whitespace(&chars, start, end, size);
        }
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            windows.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        // Always advance, even when the overlap would step back past `start`.
        start = end.saturating_sub(overlap).max(start + 1);
    }
    windows
}

fn snap_to_whitespace(chars: &[char], start: usize, end: usize, size: usize) -> usize {
    let floor = end - size / 4;
    (floor.max(start + 1)..end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(end)
}
