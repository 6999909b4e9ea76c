use async_trait::async_trait;
use docrag_chunker::ChunkerConfig;
use docrag_retrieval::{
    ErrorKind, LoadedDocument, PageSource, Result, RetrievalConfig, RetrievalService,
};
use docrag_vector_store::{Embedder, EmbeddingModel, VectorStore};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 32;

/// Stub embedder that records how it is called
struct CountingEmbedder {
    inner: EmbeddingModel,
    batches: AtomicUsize,
    texts: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: EmbeddingModel::stub(DIM),
            batches: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed_batch(&self, texts: &[String]) -> docrag_vector_store::Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

/// In-memory documents keyed by file name
#[derive(Default)]
struct FakePages {
    documents: HashMap<String, LoadedDocument>,
    loads: AtomicUsize,
}

impl PageSource for FakePages {
    fn load(&self, path: &Path) -> Result<LoadedDocument> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let name = path.file_name().unwrap().to_string_lossy();
        Ok(self.documents.get(name.as_ref()).cloned().unwrap_or_default())
    }
}

fn letters(len: usize, seed: u8) -> String {
    (0..len)
        .map(|i| char::from(b'a' + ((i + seed as usize) % 26) as u8))
        .collect()
}

struct Fixture {
    dir: TempDir,
    embedder: Arc<CountingEmbedder>,
    pages: Arc<FakePages>,
    service: RetrievalService,
}

impl Fixture {
    fn store_path(&self) -> PathBuf {
        self.dir.path().join("vectors").join("store.drvs")
    }
}

async fn fixture(documents: Vec<(&str, LoadedDocument)>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let docs_dir = dir.path().join("raw");
    std::fs::create_dir_all(&docs_dir).unwrap();

    let mut pages = FakePages::default();
    for (name, loaded) in documents {
        std::fs::write(docs_dir.join(name), b"%PDF-stand-in").unwrap();
        pages.documents.insert(name.to_string(), loaded);
    }
    let pages = Arc::new(pages);
    let embedder = CountingEmbedder::new();

    let store = VectorStore::open(dir.path().join("vectors").join("store.drvs"))
        .await
        .unwrap();
    let service = RetrievalService::new(
        store,
        embedder.clone(),
        pages.clone(),
        ChunkerConfig::new(500, 100),
        &docs_dir,
    )
    .unwrap();

    Fixture {
        dir,
        embedder,
        pages,
        service,
    }
}

fn two_page_report() -> LoadedDocument {
    LoadedDocument {
        total_pages: 2,
        pages: vec![(1, letters(650, 0)), (2, letters(200, 7))],
    }
}

#[tokio::test]
async fn indexing_a_file_embeds_once_and_is_searchable() {
    let fx = fixture(vec![("report.pdf", two_page_report())]).await;

    let report = fx.service.index_file("report.pdf").await.unwrap();
    assert_eq!(report.document_name, "report.pdf");
    assert_eq!(report.total_pages, 2);
    assert_eq!(report.indexed_chunks, 3);
    assert_eq!(fx.embedder.batches.load(Ordering::SeqCst), 1);
    assert_eq!(fx.embedder.texts.load(Ordering::SeqCst), 3);

    let response = fx.service.search(&letters(120, 0), 2).await.unwrap();
    assert_eq!(response.top_k, 2);
    assert!(response.hits.len() <= 2);
    assert!(!response.hits.is_empty());
    for hit in &response.hits {
        assert_eq!(hit.metadata["document"].as_str(), Some("report.pdf"));
    }

    let stats = fx.service.stats().await;
    assert_eq!(stats.records, 3);
    assert_eq!(stats.dimension, Some(DIM));
    assert_eq!(stats.store_path, fx.store_path().display().to_string());
}

#[tokio::test]
async fn chunk_metadata_carries_page_and_chunk_id() {
    let fx = fixture(vec![]).await;
    fx.service
        .index_document("direct.pdf", &two_page_report().pages)
        .await
        .unwrap();

    let reopened = VectorStore::open(fx.store_path()).await.unwrap();
    let located: Vec<(i64, i64)> = reopened
        .metadatas()
        .iter()
        .map(|m| {
            (
                m["page_number"].as_i64().unwrap(),
                m["chunk_id"].as_i64().unwrap(),
            )
        })
        .collect();
    assert_eq!(located, vec![(1, 0), (1, 1), (2, 2)]);
    assert_eq!(reopened.texts()[1].chars().count(), 250);
}

#[tokio::test]
async fn missing_file_fails_before_any_work() {
    let fx = fixture(vec![("report.pdf", two_page_report())]).await;

    for name in ["absent.pdf", "../raw/report.pdf", "/report.pdf", ""] {
        let err = fx.service.index_file(name).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound, "{name}: {err}");
    }
    std::fs::create_dir(fx.dir.path().join("raw").join("folder.pdf")).unwrap();
    let err = fx.service.preview_file("folder.pdf").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(fx.pages.loads.load(Ordering::SeqCst), 0);
    assert_eq!(fx.embedder.batches.load(Ordering::SeqCst), 0);
    assert_eq!(fx.service.stats().await.records, 0);
    assert!(!fx.store_path().exists());
}

#[tokio::test]
async fn document_without_text_indexes_nothing() {
    let blank = LoadedDocument {
        total_pages: 3,
        pages: vec![],
    };
    let fx = fixture(vec![("scan.pdf", blank)]).await;

    let report = fx.service.index_file("scan.pdf").await.unwrap();
    assert_eq!(report.total_pages, 3);
    assert_eq!(report.indexed_chunks, 0);
    assert_eq!(fx.embedder.batches.load(Ordering::SeqCst), 0);
    assert!(!fx.store_path().exists());
}

#[tokio::test]
async fn preview_chunks_without_storing() {
    let fx = fixture(vec![("report.pdf", two_page_report())]).await;

    let preview = fx.service.preview_file("report.pdf").await.unwrap();
    assert_eq!(preview.total_pages, 2);
    assert_eq!(preview.total_chunks, 3);
    assert_eq!(
        preview
            .chunks
            .iter()
            .map(|c| (c.chunk_id, c.page_number, c.char_len()))
            .collect::<Vec<_>>(),
        vec![(0, 1, 500), (1, 1, 250), (2, 2, 200)]
    );
    assert_eq!(fx.embedder.batches.load(Ordering::SeqCst), 0);
    assert_eq!(fx.service.stats().await.records, 0);
}

#[tokio::test]
async fn search_on_empty_store_returns_no_hits() {
    let fx = fixture(vec![]).await;
    let response = fx.service.search("anything", 5).await.unwrap();
    assert_eq!(response.query, "anything");
    assert!(response.hits.is_empty());

    let stats = fx.service.stats().await;
    assert_eq!(stats.records, 0);
    assert_eq!(stats.dimension, None);
}

#[tokio::test]
async fn reopened_store_must_match_embedder_dimension() {
    let fx = fixture(vec![]).await;
    fx.service
        .index_document("a.pdf", &[(1, "some text".to_string())])
        .await
        .unwrap();

    let store = VectorStore::open(fx.store_path()).await.unwrap();
    let err = RetrievalService::new(
        store,
        Arc::new(EmbeddingModel::stub(DIM * 2)),
        fx.pages.clone(),
        ChunkerConfig::default(),
        fx.dir.path(),
    )
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[tokio::test]
async fn invalid_chunking_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = RetrievalConfig {
        store_path: dir.path().join("store.drvs"),
        documents_dir: dir.path().to_path_buf(),
        chunker: ChunkerConfig::new(100, 100),
    };
    let err = RetrievalService::open(&config, Arc::new(EmbeddingModel::stub(DIM)))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn searches_see_whole_batches_only() {
    let fx = fixture(vec![]).await;
    let service = Arc::new(fx.service);
    let pages: Vec<_> = (1..=6).map(|p| (p, letters(800, p as u8))).collect();
    // 800 chars per page at 500/100 -> 2 chunks, 12 per document
    let per_document = 12;

    let writer = {
        let service = Arc::clone(&service);
        let pages = pages.clone();
        tokio::spawn(async move {
            for doc in 0..4 {
                service
                    .index_document(&format!("doc-{doc}.pdf"), &pages)
                    .await
                    .unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        readers.push(tokio::spawn(async move {
            for _ in 0..20 {
                let records = service.stats().await.records;
                assert_eq!(records % per_document, 0, "partial append visible");
                let hits = service.search("abc", 1000).await.unwrap().hits;
                assert_eq!(hits.len() % per_document, 0, "partial append visible");
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(service.stats().await.records, 4 * per_document);
}
