use docrag_chunker::TextChunk;
use docrag_vector_store::SearchHit;
use serde::{Deserialize, Serialize};

/// Outcome of indexing one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_name: String,
    pub total_pages: usize,
    pub indexed_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub top_k: usize,
    pub hits: Vec<SearchHit>,
}

/// Chunks a document would produce, without embedding or storing them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionResult {
    pub document_name: String,
    pub total_pages: usize,
    pub total_chunks: usize,
    pub chunks: Vec<TextChunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub records: usize,
    /// `None` until the first record fixes the dimension
    pub dimension: Option<usize>,
    pub store_path: String,
}
