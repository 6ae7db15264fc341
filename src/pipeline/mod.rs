//! Retriever + reader question answering.
//!
//! A question flows through two stages:
//!
//! 1. A [`Retriever`] returns the most similar documents for the question,
//!    restricted by the filters.
//! 2. A [`Reader`] extracts an answer span from each document.
//!
//! [`ExtractiveQaPipeline`] runs both stages one after the other and returns
//! the best answers, highest score first. The dashboard only sees the
//! [`QaPipeline`] trait, so tests can substitute a fake.

pub mod reader;

pub use reader::HttpReader;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{sort_by_score, Answer, Document, Filters};

/// Errors that can occur while answering a question.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The retriever failed
    #[error("Retrieval failed: {0}")]
    RetrievalError(String),

    /// The reader endpoint failed or returned an error status
    #[error("Reader failed: {0}")]
    ReaderError(String),

    /// The reader returned something that is not an answer
    #[error("Invalid reader response: {0}")]
    InvalidResponse(String),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Source of candidate documents.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `top_k` documents for `query`, honouring `filters`.
    async fn retrieve(
        &self,
        query: &str,
        filters: &Filters,
        top_k: usize,
    ) -> PipelineResult<Vec<Document>>;
}

/// Extractive reader.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Extract answers to `question` from `documents`, keeping the best `top_k`.
    async fn read(
        &self,
        question: &str,
        documents: &[Document],
        top_k: usize,
    ) -> PipelineResult<Vec<Answer>>;
}

/// Answers together with the documents they were read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Answers, highest score first
    pub answers: Vec<Answer>,

    /// Retrieved documents, in retrieval order
    pub documents: Vec<Document>,
}

/// Question answering as seen by the dashboard.
#[async_trait]
pub trait QaPipeline: Send + Sync {
    /// Answer `question` over the documents matching `filters`.
    async fn answer(&self, question: &str, filters: &Filters) -> PipelineResult<PipelineOutput>;
}

/// Retriever followed by an extractive reader.
pub struct ExtractiveQaPipeline<R, D>
where
    R: Retriever,
    D: Reader,
{
    retriever: R,
    reader: D,
    top_k_retriever: usize,
    top_k_reader: usize,
}

impl<R, D> ExtractiveQaPipeline<R, D>
where
    R: Retriever,
    D: Reader,
{
    pub fn new(retriever: R, reader: D, top_k_retriever: usize, top_k_reader: usize) -> Self {
        Self {
            retriever,
            reader,
            top_k_retriever,
            top_k_reader,
        }
    }
}

#[async_trait]
impl<R, D> QaPipeline for ExtractiveQaPipeline<R, D>
where
    R: Retriever,
    D: Reader,
{
    async fn answer(&self, question: &str, filters: &Filters) -> PipelineResult<PipelineOutput> {
        let documents = self
            .retriever
            .retrieve(question, filters, self.top_k_retriever)
            .await?;
        debug!("Retrieved {} documents", documents.len());

        if documents.is_empty() {
            return Ok(PipelineOutput::default());
        }

        let mut answers = self
            .reader
            .read(question, &documents, self.top_k_reader)
            .await?;
        sort_by_score(&mut answers);
        answers.truncate(self.top_k_reader);
        info!(
            "Answered from {} documents, {} answers kept",
            documents.len(),
            answers.len()
        );

        Ok(PipelineOutput { answers, documents })
    }
}
