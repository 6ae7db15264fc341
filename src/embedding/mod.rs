//! Embedding provider abstraction and the vector blob codec.
//!
//! This module defines the interface for text embedding generation and the
//! conversion between embedding vectors and the raw float32 byte blobs the
//! vector store expects, both for stored records and for query parameters.

pub mod fastembed;

use async_trait::async_trait;
use thiserror::Error;

/// Failures while producing or decoding embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Text the model cannot embed, such as an empty string
    #[error("Invalid input text: {0}")]
    InvalidInput(String),

    /// Configuration error (e.g., model could not be loaded)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A byte blob does not hold a whole number of float32 values
    #[error("Invalid vector blob: {0} bytes is not a multiple of 4")]
    InvalidBlob(usize),

    /// Other unexpected errors
    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Shorthand for results carrying an [`EmbeddingError`].
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Turns free text into fixed-length vectors.
///
/// The dimension must
/// match the dimension of the vectors stored in the index, otherwise the store
/// rejects the query.
///
/// # Example
/// ```ignore
/// let provider = FastEmbedProvider::with_default_model()?;
/// let embedding = provider.embed("What is a transformer?").await?;
/// let blob = vector_to_bytes(&embedding);
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one piece of text.
    ///
    /// # Errors
    /// Fails on empty text or when the model errors.
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed several texts in one model call.
    ///
    /// # Returns
    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model, for logs.
    fn model_name(&self) -> &str;
}

/// Serialize a vector to little-endian float32 bytes.
///
/// The output is exactly `4 * vector.len()` bytes, the layout of a
/// `FLOAT32` vector field.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Deserialize little-endian float32 bytes back into a vector.
///
/// # Errors
/// Returns `EmbeddingError::InvalidBlob` if the length is not a multiple of 4
pub fn bytes_to_vector(bytes: &[u8]) -> EmbeddingResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(EmbeddingError::InvalidBlob(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
