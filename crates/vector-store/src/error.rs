use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// The learned model could not be loaded; callers may degrade to the hash embedder.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid vector: component {index} is {value}")]
    InvalidVector { index: usize, value: f32 },
}

/// Length must be `expected` and every component finite
pub(crate) fn ensure_vector(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(VectorStoreError::InvalidDimension {
            expected,
            actual: vector.len(),
        });
    }
    if let Some((index, &value)) = vector.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(VectorStoreError::InvalidVector { index, value });
    }
    Ok(())
}
