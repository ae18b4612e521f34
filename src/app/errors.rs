use crate::entries::StoreError;
use crate::ingest::ContentProcessingError;
use crate::openai::EmbeddingError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("entry not found")]
    NotFound,

    #[error("collection {0:?} already has entries")]
    AlreadyExists(String),

    #[error("comments cannot be nested: {0} is itself a comment")]
    NestedComment(String),

    #[error("entry {0} is not a comment")]
    NotAComment(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("content processing failed: {0}")]
    ContentProcessing(#[from] ContentProcessingError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
