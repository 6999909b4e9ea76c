use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Corrupt store file: {0}")]
    CorruptStore(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid metadata value for '{key}': {message}")]
    InvalidMetadata { key: String, message: String },

    #[error(
        "Mismatched batch lengths: {vectors} vectors, {texts} texts, {metadatas} metadatas"
    )]
    LengthMismatch {
        vectors: usize,
        texts: usize,
        metadatas: usize,
    },
}
