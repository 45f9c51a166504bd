use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid edge: {0}")]
    InvalidEdge(String),

    #[error("Graph store not configured")]
    StoreMissing,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
