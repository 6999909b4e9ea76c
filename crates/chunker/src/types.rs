use serde::{Deserialize, Serialize};

/// One page of extracted document text: `(page_number, text)`
pub type PageText = (u32, String);

/// A contiguous window of one page's text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of the chunk within one chunking call (0-based)
    pub chunk_id: usize,

    /// The window's text
    pub text: String,

    /// Page the window was cut from (1-based)
    pub page_number: u32,
}

impl TextChunk {
    /// Create a new text chunk
    #[must_use]
    pub const fn new(chunk_id: usize, text: String, page_number: u32) -> Self {
        Self {
            chunk_id,
            text,
            page_number,
        }
    }

    /// Length of the chunk in characters
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
