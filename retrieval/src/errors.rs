use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No index for collection: {0}")]
    IndexMissing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;
