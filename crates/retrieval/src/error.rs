use docrag_chunker::ChunkerError;
use docrag_vector_store::VectorStoreError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Chunker error: {0}")]
    Chunker(#[from] ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Failed to read PDF {}: {message}", path.display())]
    Pdf { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by callers to pick a response (e.g. an HTTP status)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Configuration,
    DimensionMismatch,
    StorageIo,
    Embedding,
    InvalidInput,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Configuration => "configuration_error",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::StorageIo => "storage_io_error",
            Self::Embedding => "embedding_error",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl RetrievalError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Chunker(_) | Self::Config(_) => ErrorKind::Configuration,
            Self::VectorStore(err) => match err {
                VectorStoreError::InvalidDimension { .. } => ErrorKind::DimensionMismatch,
                VectorStoreError::IoError(_)
                | VectorStoreError::CorruptStore(_)
                | VectorStoreError::SerializationError(_) => ErrorKind::StorageIo,
                VectorStoreError::EmbeddingError(_) => ErrorKind::Embedding,
                VectorStoreError::LengthMismatch { .. }
                | VectorStoreError::InvalidMetadata { .. } => ErrorKind::InvalidInput,
            },
            Self::Pdf { .. } => ErrorKind::InvalidInput,
            Self::Io(_) => ErrorKind::StorageIo,
        }
    }
}
