//! Document store adapter.
//!
//! Wraps a [`VectorStore`] and an [`EmbeddingProvider`] and exposes vector
//! search in the uniform [`Document`] shape the QA pipeline consumes. Text
//! queries are embedded first; every query vector is sent to the store as a
//! little-endian float32 blob.
//!
//! Only plain vector search with tag filters is supported. Options the store
//! cannot honour are rejected with [`AdapterError::NotImplemented`] before any
//! embedding or store call is made.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::embedding::{vector_to_bytes, EmbeddingError, EmbeddingProvider};
use crate::models::{Document, DocumentMeta, Filters};
use crate::pipeline::{PipelineError, PipelineResult, Retriever};
use crate::query::{QueryError, VectorQuery, SCORE_FIELD};
use crate::storage::{SearchHit, StorageError, VectorStore};

/// Errors returned by the adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The requested option is outside what the adapter supports
    #[error("{0} is not implemented for this document store")]
    NotImplemented(&'static str),

    /// The query vector does not match the index dimension
    #[error("Query vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding the query text failed
    #[error("Embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    /// The query could not be built
    #[error("Query error: {0}")]
    QueryError(#[from] QueryError),

    /// The store rejected the query
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// What to search with.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    /// Free text, embedded before searching
    Text(String),
    /// A ready query vector
    Vector(Vec<f32>),
}

/// Per-query options.
///
/// Only `index` and `scale_score` are honoured; setting any other option
/// makes the query fail with [`AdapterError::NotImplemented`].
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Search this index instead of the configured one
    pub index: Option<String>,

    /// Decode and return stored vectors
    pub return_embedding: bool,

    /// Extra request headers
    pub headers: Option<HashMap<String, String>>,

    /// A raw query replacing the built one
    pub custom_query: Option<String>,

    /// Require every query term to match
    pub all_terms_must_match: bool,

    /// Scale scores to a 0-100 range rounded to one decimal
    pub scale_score: bool,
}

impl QueryOptions {
    fn check_supported(&self) -> AdapterResult<()> {
        if self.return_embedding {
            return Err(AdapterError::NotImplemented("return_embedding"));
        }
        if self.headers.is_some() {
            return Err(AdapterError::NotImplemented("headers"));
        }
        if self.custom_query.is_some() {
            return Err(AdapterError::NotImplemented("custom_query"));
        }
        if self.all_terms_must_match {
            return Err(AdapterError::NotImplemented("all_terms_must_match"));
        }
        Ok(())
    }
}

/// Document store over a vector index.
pub struct RedisDocumentStore<S, E>
where
    S: VectorStore,
    E: EmbeddingProvider,
{
    store: S,
    embedder: E,
    index: String,
    search_type: String,
}

impl<S, E> RedisDocumentStore<S, E>
where
    S: VectorStore,
    E: EmbeddingProvider,
{
    pub fn new(store: S, embedder: E, config: &AppConfig) -> Self {
        info!(
            "Document store on index {:?} using {} ({} dimensions)",
            config.index_name,
            embedder.model_name(),
            embedder.dimension()
        );
        Self {
            store,
            embedder,
            index: config.index_name.clone(),
            search_type: config.search_type.clone(),
        }
    }

    /// Name of the index queried by default.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Run a vector search.
    ///
    /// # Errors
    /// - `AdapterError::NotImplemented` for unsupported options, before any
    ///   other work
    /// - `AdapterError::DimensionMismatch` if a supplied vector has the wrong
    ///   length
    /// - embedding, query and storage errors from the collaborators
    pub async fn query_by_embedding(
        &self,
        input: QueryInput,
        filters: &Filters,
        top_k: usize,
        options: &QueryOptions,
    ) -> AdapterResult<Vec<Document>> {
        options.check_supported()?;

        let vector = match input {
            QueryInput::Text(text) => self.embedder.embed(&text).await?,
            QueryInput::Vector(vector) => vector,
        };
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(AdapterError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let query = VectorQuery::builder()
            .years(&filters.date_range)
            .categories(&filters.categories)
            .search_type(&self.search_type)
            .number_of_results(top_k)
            .build()?;

        let index = options.index.as_deref().unwrap_or(&self.index);
        let hits = self
            .store
            .search(index, &query, &vector_to_bytes(&vector))
            .await?;
        debug!("{} hits from index {:?}", hits.len(), index);

        Ok(hits
            .iter()
            .map(|hit| convert_hit_to_document(hit, options.scale_score))
            .collect())
    }

    /// Search with free text, scores scaled to 0-100.
    pub async fn query(
        &self,
        text: &str,
        filters: &Filters,
        top_k: usize,
    ) -> AdapterResult<Vec<Document>> {
        let options = QueryOptions {
            scale_score: true,
            ..QueryOptions::default()
        };
        self.query_by_embedding(QueryInput::Text(text.to_string()), filters, top_k, &options)
            .await
    }
}

#[async_trait]
impl<S, E> Retriever for RedisDocumentStore<S, E>
where
    S: VectorStore,
    E: EmbeddingProvider,
{
    async fn retrieve(
        &self,
        query: &str,
        filters: &Filters,
        top_k: usize,
    ) -> PipelineResult<Vec<Document>> {
        self.query(query, filters, top_k)
            .await
            .map_err(|e| PipelineError::RetrievalError(e.to_string()))
    }
}

/// Scale a raw score to 0-100, rounded to one decimal.
pub fn scale_score(score: f32) -> f32 {
    (score * 1000.0).round() / 10.0
}

/// Convert a raw hit into a document.
///
/// The stored vector is never decoded; a missing or unparsable score reads
/// as 0.
pub fn convert_hit_to_document(hit: &SearchHit, scale: bool) -> Document {
    let score = hit
        .text(SCORE_FIELD)
        .and_then(|raw| raw.trim().parse::<f32>().ok())
        .unwrap_or(0.0);

    Document {
        id: hit.text("paper_id").unwrap_or_else(|| hit.key.clone()),
        content: hit.text_or_empty("abstract"),
        content_type: "text".to_string(),
        meta: DocumentMeta {
            name: hit.text_or_empty("title"),
            categories: hit.text_or_empty("categories"),
            update_date: hit.text_or_empty("update_date"),
        },
        score: if scale { scale_score(score) } else { score },
        embedding: None,
    }
}
