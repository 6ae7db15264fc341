//! Paper record providers.
//!
//! The `PaperProvider` trait abstracts where the precomputed paper records come
//! from, so the bulk loader does not depend on a particular file format.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PaperRecord;

pub mod json;

/// Errors that can occur when reading records from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to read from the data source
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the data format
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Trait for sourcing paper records.
///
/// Records returned by a provider already carry their embedding vector; the
/// loader writes them as-is and never embeds abstracts itself.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    /// Fetch all available records from this provider.
    async fn fetch_papers(&self) -> ProviderResult<Vec<PaperRecord>>;

    /// Fetch at most `limit` records.
    async fn fetch_papers_limit(&self, limit: usize) -> ProviderResult<Vec<PaperRecord>> {
        let all_papers = self.fetch_papers().await?;
        Ok(all_papers.into_iter().take(limit).collect())
    }

    /// Get the total number of records available from this provider.
    async fn count_papers(&self) -> ProviderResult<usize> {
        self.fetch_papers().await.map(|papers| papers.len())
    }

    /// Get a human-readable name of this provider, used in logs.
    fn name(&self) -> &str;
}
