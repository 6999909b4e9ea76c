//! # docrag Vector Store
//!
//! Exact similarity search over document chunk embeddings, persisted to a single file.
//!
//! ## Features
//!
//! - **Exact top-k search** by dot product over a dense `(N, D)` matrix
//! - **Deterministic ranking**: ties resolve to the earliest inserted record
//! - **Dimension safety**: the first record fixes `D`, later mismatches are rejected
//! - **Durable snapshots**: every `add` atomically rewrites the store file
//! - **Pluggable embeddings** behind the [`Embedder`] trait (ONNX Runtime or stub)
//!
//! ## Architecture
//!
//! ```text
//! texts[]
//!     │
//!     ├──> Embedder (batch)
//!     │      └─> unit vectors [D]
//!     │
//!     ├──> VectorStore
//!     │      ├─> matrix (N, D) · query  → scores
//!     │      └─> texts[N], metadatas[N]
//!     │
//!     └──> Store file
//!            └─> header + f32 matrix + JSON payload
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docrag_vector_store::{Embedder, EmbeddingModel, Metadata, VectorStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let embedder = EmbeddingModel::stub(384);
//!     let mut store = VectorStore::open("data/vectors/store.drvs").await?;
//!
//!     let texts = vec!["PDF chunk text".to_string()];
//!     let vectors = embedder.embed_batch(&texts).await?;
//!     store.add(vectors, texts, vec![Metadata::new()]).await?;
//!
//!     let query = embedder.embed("chunk").await?;
//!     for hit in store.search(&query, 5)? {
//!         println!("{:.3}: {}", hit.score, hit.text);
//!     }
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod format;
mod store;
mod types;

pub use embeddings::{
    normalize, Embedder, EmbeddingMode, EmbeddingModel, EmbeddingOptions, DEFAULT_MODEL_ID,
    EMBEDDING_MODEL_ENV, EMBEDDING_MODE_ENV, MODEL_DIR_ENV,
};
pub use error::{Result, VectorStoreError};
pub use format::STORE_FORMAT_VERSION;
pub use store::VectorStore;
pub use types::{Metadata, MetadataValue, SearchHit};
