//! # docrag Retrieval
//!
//! Ties chunking, embedding and the vector store into one service.
//!
//! ```text
//! documents_dir/<filename>
//!     │
//!     ├──> PageSource (PDF)  → [(page_number, text)]
//!     ├──> Chunker           → overlapping windows
//!     ├──> Embedder          → one batch per document
//!     └──> VectorStore       → append + persist
//!
//! query ──> Embedder ──> VectorStore::search ──> top-k hits
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docrag_retrieval::{RetrievalConfig, RetrievalService};
//! use docrag_vector_store::EmbeddingModel;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RetrievalConfig::load(None)?;
//!     let service = RetrievalService::open(&config, Arc::new(EmbeddingModel::new()?)).await?;
//!
//!     let report = service.index_file("handbook.pdf").await?;
//!     println!("{} chunks from {} pages", report.indexed_chunks, report.total_pages);
//!
//!     for hit in service.search("vacation policy", 5).await?.hits {
//!         println!("{:.3} {}", hit.score, hit.text);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod service;
mod source;
mod types;

pub use config::{
    RetrievalConfig, CHUNK_SIZE_ENV, CONFIG_ENV, DEFAULT_DOCUMENTS_DIR, DEFAULT_STORE_PATH,
    DOCUMENTS_DIR_ENV, OVERLAP_ENV, STORE_PATH_ENV,
};
pub use error::{ErrorKind, Result, RetrievalError};
pub use service::RetrievalService;
pub use source::{LoadedDocument, PageSource, PdfPageSource};
pub use types::{IndexReport, IngestionResult, SearchResponse, StoreStats};
