//! # docrag Chunker
//!
//! Splits page-tagged document text into overlapping, fixed-size character windows.
//!
//! ## Windowing
//!
//! ```text
//! page text (L chars)
//!     │
//!     ├──> [0, cs)
//!     ├──> [cs - ov, 2cs - ov)
//!     ├──> ...
//!     └──> [k(cs - ov), L)      last window may be shorter
//! ```
//!
//! Every page is windowed independently, in page order. Chunk ids are assigned
//! from a single counter that runs across all pages of one call, starting at 0.
//!
//! ## Example
//!
//! ```rust
//! use docrag_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let pages = vec![(1, "a".repeat(650)), (2, "b".repeat(200))];
//!
//! let chunks = chunker.chunk(&pages);
//! assert_eq!(chunks.len(), 3);
//! assert_eq!(chunks[1].page_number, 1);
//! assert_eq!(chunks[2].chunk_id, 2);
//! ```

mod chunker;
mod config;
mod error;
mod types;

pub use chunker::{chunk_pages, Chunker, ChunkingStats};
pub use config::{ChunkerConfig, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
pub use error::{ChunkerError, Result};
pub use types::{PageText, TextChunk};
