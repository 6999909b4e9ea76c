use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::source::{LoadedDocument, PageSource, PdfPageSource};
use crate::types::{IndexReport, IngestionResult, SearchResponse, StoreStats};
use docrag_chunker::{Chunker, ChunkerConfig, PageText};
use docrag_vector_store::{Embedder, Metadata, MetadataValue, VectorStore, VectorStoreError};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Indexes documents into a [`VectorStore`] and answers similarity queries over it.
///
/// Share one instance behind an `Arc`. Searches run concurrently; an indexing
/// call holds the write lock only while appending and persisting.
pub struct RetrievalService {
    store: RwLock<VectorStore>,
    embedder: Arc<dyn Embedder>,
    source: Arc<dyn PageSource>,
    chunker: Chunker,
    documents_dir: PathBuf,
}

impl RetrievalService {
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        source: Arc<dyn PageSource>,
        chunker: ChunkerConfig,
        documents_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        if let Some(stored) = store.dimension() {
            if stored != embedder.dimension() {
                return Err(VectorStoreError::InvalidDimension {
                    expected: stored,
                    actual: embedder.dimension(),
                }
                .into());
            }
        }

        Ok(Self {
            store: RwLock::new(store),
            embedder,
            source,
            chunker: Chunker::new(chunker)?,
            documents_dir: documents_dir.into(),
        })
    }

    /// Validate `config`, open its store and read documents as PDFs
    pub async fn open(config: &RetrievalConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let store = VectorStore::open(&config.store_path).await?;
        Self::new(
            store,
            embedder,
            Arc::new(PdfPageSource::new()),
            config.chunker,
            &config.documents_dir,
        )
    }

    #[must_use]
    pub fn with_page_source(mut self, source: Arc<dyn PageSource>) -> Self {
        self.source = source;
        self
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    pub fn chunker_config(&self) -> ChunkerConfig {
        *self.chunker.config()
    }

    /// Chunk, embed and store already-extracted pages
    pub async fn index_document(
        &self,
        document_name: &str,
        pages: &[PageText],
    ) -> Result<IndexReport> {
        self.index_pages(document_name, pages, pages.len()).await
    }

    /// Load `filename` from the documents directory and index it
    pub async fn index_file(&self, filename: &str) -> Result<IndexReport> {
        let loaded = self.load(filename).await?;
        self.index_pages(filename, &loaded.pages, loaded.total_pages)
            .await
    }

    /// Chunk `filename` the way [`index_file`](Self::index_file) would, without storing anything
    pub async fn preview_file(&self, filename: &str) -> Result<IngestionResult> {
        let loaded = self.load(filename).await?;
        let chunks = self.chunker.chunk(&loaded.pages);
        Ok(IngestionResult {
            document_name: filename.to_string(),
            total_pages: loaded.total_pages,
            total_chunks: chunks.len(),
            chunks,
        })
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchResponse> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.read().await.search(&vector, top_k)?;
        log::debug!("Query {query:?} (top_k={top_k}): {} hits", hits.len());
        Ok(SearchResponse {
            query: query.to_string(),
            top_k,
            hits,
        })
    }

    pub async fn stats(&self) -> StoreStats {
        let store = self.store.read().await;
        StoreStats {
            records: store.len(),
            dimension: store.dimension(),
            store_path: store.path().display().to_string(),
        }
    }

    async fn index_pages(
        &self,
        document_name: &str,
        pages: &[PageText],
        total_pages: usize,
    ) -> Result<IndexReport> {
        let chunks = self.chunker.chunk(pages);
        let mut report = IndexReport {
            document_name: document_name.to_string(),
            total_pages,
            indexed_chunks: 0,
        };
        if chunks.is_empty() {
            log::info!("{document_name}: no text to index ({total_pages} pages)");
            return Ok(report);
        }

        let mut texts = Vec::with_capacity(chunks.len());
        let mut metadatas = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            metadatas.push(Metadata::from([
                ("document".to_string(), MetadataValue::from(document_name)),
                ("page_number".to_string(), MetadataValue::from(chunk.page_number)),
                ("chunk_id".to_string(), MetadataValue::Int(chunk.chunk_id as i64)),
            ]));
            texts.push(chunk.text);
        }

        log::debug!("{document_name}: embedding {} chunks", texts.len());
        let vectors = self.embedder.embed_batch(&texts).await?;

        report.indexed_chunks = texts.len();
        self.store.write().await.add(vectors, texts, metadatas).await?;
        log::info!(
            "Indexed {document_name}: {} chunks from {total_pages} pages",
            report.indexed_chunks
        );
        Ok(report)
    }

    async fn load(&self, filename: &str) -> Result<LoadedDocument> {
        let path = self.resolve_document(filename).await?;
        let source = Arc::clone(&self.source);
        tokio::task::spawn_blocking(move || source.load(&path))
            .await
            .map_err(|e| RetrievalError::Io(std::io::Error::other(e)))?
    }

    async fn resolve_document(&self, filename: &str) -> Result<PathBuf> {
        let not_found = || RetrievalError::NotFound(filename.to_string());
        if !is_confined(filename) {
            return Err(not_found());
        }

        let path = self.documents_dir.join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(not_found()),
        }
    }
}

/// Relative path that stays inside the directory it is joined to
fn is_confined(filename: &str) -> bool {
    let mut components = Path::new(filename).components().peekable();
    components.peek().is_some()
        && components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
