use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::types::{PageText, TextChunk};
use std::collections::BTreeSet;

/// Fixed-window text chunker
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker, rejecting configurations whose windows never advance
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Chunk pages in order, assigning ids from one counter shared by all pages
    #[must_use]
    pub fn chunk(&self, pages: &[PageText]) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut next_id = 0usize;

        for (page_number, text) in pages {
            let before = chunks.len();
            self.chunk_page(*page_number, text, &mut next_id, &mut chunks);
            log::trace!(
                "page {page_number}: {} chars -> {} chunks",
                text.chars().count(),
                chunks.len() - before
            );
        }

        chunks
    }

    fn chunk_page(
        &self,
        page_number: u32,
        text: &str,
        next_id: &mut usize,
        out: &mut Vec<TextChunk>,
    ) {
        if text.trim().is_empty() {
            return;
        }

        // Byte offset of every char, so windows are cut on char boundaries.
        let offsets: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        let len = offsets.len();
        let byte_at = |char_idx: usize| offsets.get(char_idx).copied().unwrap_or(text.len());

        let stride = self.config.stride();
        let mut start = 0usize;
        while start < len {
            let end = (start + self.config.chunk_size).min(len);
            out.push(TextChunk::new(
                *next_id,
                text[byte_at(start)..byte_at(end)].to_string(),
                page_number,
            ));
            *next_id += 1;
            start += stride;
        }
    }

    /// Get configuration
    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Get statistics about chunking
    #[must_use]
    pub fn get_stats(chunks: &[TextChunk]) -> ChunkingStats {
        let lengths: Vec<usize> = chunks.iter().map(TextChunk::char_len).collect();
        let total_chars: usize = lengths.iter().sum();
        ChunkingStats {
            total_chunks: chunks.len(),
            pages: chunks
                .iter()
                .map(|c| c.page_number)
                .collect::<BTreeSet<_>>()
                .len(),
            total_chars,
            avg_chars_per_chunk: if chunks.is_empty() {
                0
            } else {
                total_chars / chunks.len()
            },
            min_chars: lengths.iter().copied().min().unwrap_or(0),
            max_chars: lengths.iter().copied().max().unwrap_or(0),
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

/// One-shot form of [`Chunker::chunk`]
pub fn chunk_pages(pages: &[PageText], chunk_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    let chunker = Chunker::new(ChunkerConfig::new(chunk_size, overlap))?;
    Ok(chunker.chunk(pages))
}

/// Statistics about chunking results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub pages: usize,
    pub total_chars: usize,
    pub avg_chars_per_chunk: usize,
    pub min_chars: usize,
    pub max_chars: usize,
}

impl std::fmt::Display for ChunkingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Chunks: {} | Pages: {} | Chars: {} | Avg: {} | Range: {}-{}",
            self.total_chunks,
            self.pages,
            self.total_chars,
            self.avg_chars_per_chunk,
            self.min_chars,
            self.max_chars
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkerError;
    use pretty_assertions::assert_eq;

    fn page(number: u32, text: &str) -> PageText {
        (number, text.to_string())
    }

    #[test]
    fn test_short_page_is_one_chunk() {
        let chunks = Chunker::default().chunk(&[page(1, "hello world")]);
        assert_eq!(chunks, vec![TextChunk::new(0, "hello world".to_string(), 1)]);
    }

    #[test]
    fn test_windows_overlap() {
        let chunks = chunk_pages(&[page(4, "abcdefghij")], 4, 1).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "defg", "ghij", "j"]);
        assert!(chunks.iter().all(|c| c.page_number == 4));
    }

    #[test]
    fn test_ids_continue_across_pages() {
        let chunks = chunk_pages(&[page(1, "aaaaaa"), page(3, "bbb")], 4, 2).unwrap();
        let ids: Vec<(usize, u32)> = chunks.iter().map(|c| (c.chunk_id, c.page_number)).collect();
        assert_eq!(ids, vec![(0, 1), (1, 1), (2, 1), (3, 3)]);
    }

    #[test]
    fn test_blank_pages_produce_nothing() {
        let chunks = Chunker::default().chunk(&[page(1, ""), page(2, "  \n\t "), page(3, "x")]);
        assert_eq!(chunks, vec![TextChunk::new(0, "x".to_string(), 3)]);
    }

    #[test]
    fn test_multibyte_text_is_cut_on_chars() {
        let chunks = chunk_pages(&[page(1, "żółć€abc")], 3, 1).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["żół", "łć€", "€ab", "bc"]);
    }

    #[test]
    fn test_rejects_non_advancing_windows() {
        let err = chunk_pages(&[page(1, "abc")], 100, 100).unwrap_err();
        assert!(matches!(err, ChunkerError::InvalidConfig(_)));
        assert!(Chunker::new(ChunkerConfig::new(10, 20)).is_err());
    }

    #[test]
    fn test_chunking_stats() {
        let chunks = chunk_pages(&[page(1, &"a".repeat(650)), page(2, &"b".repeat(200))], 500, 100)
            .unwrap();
        let stats = Chunker::get_stats(&chunks);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.total_chars, 950);
        assert_eq!(stats.min_chars, 200);
        assert_eq!(stats.max_chars, 500);
        assert_eq!(
            stats.to_string(),
            "Chunks: 3 | Pages: 2 | Chars: 950 | Avg: 316 | Range: 200-500"
        );
    }

    #[test]
    fn test_empty_stats() {
        let stats = Chunker::get_stats(&[]);
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.avg_chars_per_chunk, 0);
        assert_eq!(stats.min_chars, 0);
    }
}
