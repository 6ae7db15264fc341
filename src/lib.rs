//! Paper QA - question answering over arXiv abstracts.
//!
//! This library wires a Redis vector index, a local embedding model and an
//! external extractive reader into a small search-and-answer application.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **config**: Connection settings read from the environment
//! - **models**: Core data structures (PaperRecord, Document, Answer, etc.)
//! - **embedding**: Text embedding generation and the float32 blob codec
//! - **provider**: Sources of precomputed paper records
//! - **storage**: Vector store abstraction and the Redis implementation
//! - **query**: Vector search query construction
//! - **ingestion**: Offline bulk loader
//! - **document_store**: Adapter from raw store hits to documents
//! - **pipeline**: Retriever + reader question answering
//! - **presentation**: Pure rendering of answers and session state
//! - **server**: Browser dashboard
//!
//! # Workflow
//!
//! ## Offline Loading
//!
//! 1. Read paper records (with precomputed vectors) from a file
//! 2. Skip everything if the store is already populated
//! 3. Write each record as a flat hash with a float32 vector blob
//! 4. Create one vector search index over the key prefix
//!
//! ## Online Question Answering
//!
//! 1. Receive a question and year filters from the dashboard
//! 2. Embed the question and run a KNN query against the index
//! 3. Ask the reader to extract an answer span from each retrieved abstract
//! 4. Render answers sorted by descending score
//!
//! # Example
//!
//! ```ignore
//! use paper_qa::{
//!     config::AppConfig,
//!     document_store::RedisDocumentStore,
//!     embedding::fastembed::FastEmbedProvider,
//!     pipeline::{ExtractiveQaPipeline, HttpReader, QaPipeline},
//!     storage::redis::RedisStore,
//!     Filters,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let store = RedisStore::connect(&config.redis).await?;
//!     let embedder = FastEmbedProvider::with_default_model()?;
//!     let documents = RedisDocumentStore::new(store, embedder, &config);
//!     let reader = HttpReader::new(config.reader_url()?, config.qa_reader_token.clone());
//!     let pipe = ExtractiveQaPipeline::new(documents, reader, config.top_k_retriever, config.top_k_reader);
//!
//!     let output = pipe.answer("What are the symptoms of coronavirus?", &Filters::default()).await?;
//!     for answer in output.answers {
//!         println!("{} ({:.2})", answer.answer, answer.score);
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod document_store;
pub mod embedding;
pub mod ingestion;
pub mod models;
pub mod pipeline;
pub mod presentation;
pub mod provider;
pub mod query;
pub mod server;
pub mod storage;

// Re-export commonly used types at the crate root
pub use embedding::EmbeddingProvider;
pub use models::{Answer, Document, Filters, PaperRecord, Span};
pub use pipeline::{QaPipeline, Reader};
pub use storage::VectorStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dimension of the paper vectors stored in the index
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

/// Key prefix shared by every paper hash
pub const KEY_PREFIX: &str = "paper_vector:";

/// Default name of the vector search index
pub const DEFAULT_INDEX_NAME: &str = "papers";

/// Default vector search clause keyword
pub const DEFAULT_SEARCH_TYPE: &str = "KNN";
