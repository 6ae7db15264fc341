//! Vector store abstraction.
//!
//! This module defines the operations the application needs from the remote
//! key-value/vector store: counting entries, writing flat records, creating
//! the vector index, and running vector queries. The Redis implementation
//! lives in [`redis`]; tests substitute in-memory fakes.

pub mod redis;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

use crate::query::VectorQuery;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection to the store failed
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    /// A command was rejected or failed
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// The store replied with an unexpected shape
    #[error("Unexpected response: {0}")]
    ResponseError(String),

    /// A configuration value does not name a known option
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Field name/value pairs of one flat record.
///
/// Values are raw bytes so the vector blob can sit next to text fields.
pub type HashFields = Vec<(String, Vec<u8>)>;

/// Structure of the vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// Brute-force exact search
    Flat,
    /// Approximate search over a navigable small-world graph
    Hnsw,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Flat => "FLAT",
            IndexType::Hnsw => "HNSW",
        }
    }

    /// Distance metric the loader pairs with this index type.
    pub fn default_metric(&self) -> DistanceMetric {
        match self {
            IndexType::Flat => DistanceMetric::L2,
            IndexType::Hnsw => DistanceMetric::InnerProduct,
        }
    }
}

impl FromStr for IndexType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FLAT" => Ok(IndexType::Flat),
            "HNSW" => Ok(IndexType::Hnsw),
            other => Err(StorageError::InvalidOption(format!("unknown index type {other:?}"))),
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance metric of the vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    L2,
    InnerProduct,
    Cosine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::L2 => "L2",
            DistanceMetric::InnerProduct => "IP",
            DistanceMetric::Cosine => "COSINE",
        }
    }
}

/// Definition of the single search index over the paper hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    /// Index name
    pub name: String,

    /// Key prefix covered by the index
    pub prefix: String,

    /// Name of the vector field
    pub vector_field: String,

    /// Flat or HNSW
    pub index_type: IndexType,

    /// Vector dimension
    pub dimension: usize,

    /// Distance metric
    pub metric: DistanceMetric,

    /// Expected number of vectors
    pub capacity: usize,

    /// Fields indexed as tags for filtering
    pub tag_fields: Vec<String>,
}

impl IndexDefinition {
    /// Index over the paper layout: `vector` plus `categories` and `year` tags.
    pub fn for_papers(
        name: &str,
        prefix: &str,
        index_type: IndexType,
        dimension: usize,
        capacity: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            vector_field: "vector".to_string(),
            index_type,
            dimension,
            metric: index_type.default_metric(),
            capacity,
            tag_fields: vec!["categories".to_string(), "year".to_string()],
        }
    }

    /// Override the distance metric.
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Arguments of `FT.CREATE`, starting with the index name.
    pub fn to_args(&self) -> Vec<String> {
        let mut attributes = vec![
            "TYPE".to_string(),
            "FLOAT32".to_string(),
            "DIM".to_string(),
            self.dimension.to_string(),
            "DISTANCE_METRIC".to_string(),
            self.metric.as_str().to_string(),
            "INITIAL_CAP".to_string(),
            self.capacity.to_string(),
        ];
        if self.index_type == IndexType::Flat {
            attributes.push("BLOCK_SIZE".to_string());
            attributes.push(self.capacity.to_string());
        }

        let mut args = vec![
            self.name.clone(),
            "ON".to_string(),
            "HASH".to_string(),
            "PREFIX".to_string(),
            "1".to_string(),
            self.prefix.clone(),
            "SCHEMA".to_string(),
            self.vector_field.clone(),
            "VECTOR".to_string(),
            self.index_type.as_str().to_string(),
            attributes.len().to_string(),
        ];
        args.extend(attributes);
        for tag in &self.tag_fields {
            args.push(tag.clone());
            args.push("TAG".to_string());
        }
        args
    }
}

/// One raw document returned by a vector query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHit {
    /// Store key of the document
    pub key: String,

    /// Returned fields, as raw bytes
    pub fields: HashMap<String, Vec<u8>>,
}

impl SearchHit {
    /// A returned field decoded as text, lossily.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    }

    /// A returned field as text, empty when absent.
    pub fn text_or_empty(&self, name: &str) -> String {
        self.text(name).unwrap_or_default()
    }
}

/// Trait for vector store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Total number of keys in the logical database.
    async fn count_entries(&self) -> StorageResult<usize>;

    /// Write one flat record under `key`.
    async fn write_record(&self, key: &str, fields: HashFields) -> StorageResult<()>;

    /// Create the search index.
    async fn create_index(&self, definition: &IndexDefinition) -> StorageResult<()>;

    /// Run a vector query against `index` with `vector` bound to the query's
    /// parameter.
    async fn search(
        &self,
        index: &str,
        query: &VectorQuery,
        vector: &[u8],
    ) -> StorageResult<Vec<SearchHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_index_args() {
        let definition = IndexDefinition::for_papers("papers", "paper_vector:", IndexType::Flat, 768, 1000);
        let args = definition.to_args();
        assert_eq!(
            args,
            vec![
                "papers", "ON", "HASH", "PREFIX", "1", "paper_vector:", "SCHEMA", "vector", "VECTOR",
                "FLAT", "10", "TYPE", "FLOAT32", "DIM", "768", "DISTANCE_METRIC", "L2",
                "INITIAL_CAP", "1000", "BLOCK_SIZE", "1000", "categories", "TAG", "year", "TAG",
            ]
        );
    }

    #[test]
    fn test_hnsw_index_args() {
        let definition = IndexDefinition::for_papers("papers", "paper_vector:", IndexType::Hnsw, 768, 50)
            .with_metric(DistanceMetric::Cosine);
        let args = definition.to_args();
        assert_eq!(&args[9..11], &["HNSW", "8"]);
        assert!(args.windows(2).any(|w| w == ["DISTANCE_METRIC", "COSINE"]));
        assert!(!args.contains(&"BLOCK_SIZE".to_string()));
    }

    #[test]
    fn test_index_type_parsing() {
        assert_eq!("flat".parse::<IndexType>().unwrap(), IndexType::Flat);
        assert_eq!(" HNSW ".parse::<IndexType>().unwrap(), IndexType::Hnsw);
        assert!("ivf".parse::<IndexType>().is_err());
        assert_eq!(IndexType::Hnsw.default_metric(), DistanceMetric::InnerProduct);
    }

    #[test]
    fn test_search_hit_text() {
        let mut hit = SearchHit::default();
        hit.fields.insert("title".to_string(), b"Attention".to_vec());
        assert_eq!(hit.text("title").as_deref(), Some("Attention"));
        assert_eq!(hit.text_or_empty("doi"), "");
    }
}
