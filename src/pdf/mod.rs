//! Per-page text sources.
//!
//! A [`PageSource`] maps a file to its pages as `(number, text)` pairs,
//! numbered from 1 without gaps. Pages without extractable text (scanned
//! images, blank pages) come back with empty text rather than being skipped,
//! so numbering always matches the source file.

use crate::types::{AppError, PageText, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Page separator in plain-text sources, as written by `pdftotext`.
pub const FORM_FEED: char = '\x0C';

#[async_trait]
pub trait PageSource: Send + Sync {
    /// Read every page of `path` in order.
    ///
    /// # Errors
    ///
    /// [`AppError::Extraction`] if the file cannot be read or parsed.
    async fn read_pages(&self, path: &Path) -> Result<Vec<PageText>>;

    fn name(&self) -> &'static str;
}

/// PDF text extraction with `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageSource;

#[async_trait]
impl PageSource for PdfPageSource {
    async fn read_pages(&self, path: &Path) -> Result<Vec<PageText>> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_pdf(&path))
            .await
            .map_err(|e| AppError::Internal(format!("PDF extraction task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "pdf"
    }
}

fn extract_pdf(path: &Path) -> Result<Vec<PageText>> {
    let document = lopdf::Document::load(path)
        .map_err(|e| AppError::Extraction(format!("{}: {}", path.display(), e)))?;

    // get_pages is keyed by 1-based page number, in order
    let pages: Vec<PageText> = document
        .get_pages()
        .keys()
        .map(|&number| {
            let text = document.extract_text(&[number]).unwrap_or_else(|e| {
                warn!(path = %path.display(), page = number, error = %e, "page has no extractable text");
                String::new()
            });
            PageText::new(number, text)
        })
        .collect();

    debug!(path = %path.display(), pages = pages.len(), "extracted PDF text");
    Ok(pages)
}

/// Plain-text files, one page per form-feed separated section.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextPageSource;

#[async_trait]
impl PageSource for TextPageSource {
    async fn read_pages(&self, path: &Path) -> Result<Vec<PageText>> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::Extraction(format!("{}: {}", path.display(), e)))?;
        Ok(split_pages(&content))
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// Split text on form feeds into numbered pages.
///
/// A trailing form feed closes the last page instead of opening an empty
/// one. Text with no form feed is a single page.
pub fn split_pages(content: &str) -> Vec<PageText> {
    let body = content.strip_suffix(FORM_FEED).unwrap_or(content);
    body.split(FORM_FEED)
        .enumerate()
        .map(|(i, text)| PageText::new(i as u32 + 1, text))
        .collect()
}

/// Choose a page source by file extension: `.pdf` is parsed as PDF,
/// everything else is read as plain text.
pub fn page_source_for(path: &Path) -> Box<dyn PageSource> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        Box::new(PdfPageSource)
    } else {
        Box::new(TextPageSource)
    }
}
