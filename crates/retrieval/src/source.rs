//! Page-level text sources for documents on disk.

use crate::error::{Result, RetrievalError};
use docrag_chunker::PageText;
use std::path::Path;

/// Text of a loaded document, ready for chunking
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadedDocument {
    /// Pages in the file, including the ones that yielded no text
    pub total_pages: usize,
    /// 1-based page numbers with trimmed, non-empty text, in page order
    pub pages: Vec<PageText>,
}

impl LoadedDocument {
    /// Build from raw per-page text in file order; page numbers start at 1.
    pub fn from_raw_pages<I, S>(raw_pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut total_pages = 0;
        let mut pages = Vec::new();
        for (index, raw) in raw_pages.into_iter().enumerate() {
            total_pages += 1;
            let text = raw.as_ref().trim();
            if !text.is_empty() {
                pages.push((index as u32 + 1, text.to_string()));
            }
        }
        Self { total_pages, pages }
    }
}

/// Anything that can turn a file into per-page text.
///
/// Implementations are called from a blocking thread.
pub trait PageSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedDocument>;
}

/// PDF text extraction via `lopdf`
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageSource;

impl PdfPageSource {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl PageSource for PdfPageSource {
    fn load(&self, path: &Path) -> Result<LoadedDocument> {
        let document = lopdf::Document::load(path).map_err(|e| RetrievalError::Pdf {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let page_numbers: Vec<u32> = document.get_pages().into_keys().collect();
        let raw_pages = page_numbers.iter().map(|&number| {
            document.extract_text(&[number]).unwrap_or_else(|e| {
                log::warn!(
                    "{}: no text extracted from page {number}: {e}",
                    path.display()
                );
                String::new()
            })
        });

        let loaded = LoadedDocument::from_raw_pages(raw_pages);
        log::info!(
            "Loaded {}: {} pages, {} with text",
            path.display(),
            loaded.total_pages,
            loaded.pages.len()
        );
        Ok(loaded)
    }
}
