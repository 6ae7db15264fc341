//! Offline bulk loader.
//!
//! Writes precomputed paper records into the vector store and builds the
//! search index over them. The loader is meant to run once against an empty
//! database:
//!
//! ```ignore
//! use std::sync::Arc;
//! use paper_qa::ingestion::{BulkLoader, LoaderConfig};
//! use paper_qa::provider::json::JsonFilePaperProvider;
//! use paper_qa::storage::redis::RedisStore;
//!
//! let store = Arc::new(RedisStore::connect(&config.redis).await?);
//! let loader = BulkLoader::new(store, LoaderConfig::from_app(&config));
//! let provider = JsonFilePaperProvider::from_file("data/arxiv_embeddings.jsonl").await?;
//! let stats = loader.load_from_provider(&provider).await?;
//! println!("Written: {}, skipped: {}", stats.written, stats.skipped);
//! ```
//!
//! The loader:
//! - Skips everything when the store already holds more than a fixed number of
//!   entries (a coarse re-run guard, not a duplicate check)
//! - Writes each record as a flat hash with the vector as a float32 blob
//! - Keeps a bounded number of writes in flight
//! - Creates exactly one index once every write has succeeded
//!
//! A failed write aborts the load. Nothing is retried or rolled back.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::embedding::vector_to_bytes;
use crate::models::PaperRecord;
use crate::provider::{PaperProvider, ProviderError};
use crate::storage::{HashFields, IndexDefinition, IndexType, VectorStore};
use crate::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_INDEX_NAME, KEY_PREFIX};

/// Store size above which loading is skipped.
pub const SKIP_THRESHOLD: usize = 300;

/// Maximum number of writes in flight.
pub const WRITE_CONCURRENCY: usize = 100;

/// Errors that can occur during loading.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Provider operation failed
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A write task panicked or was cancelled
    #[error("Write task failed: {0}")]
    TaskFailed(String),
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Progress callback. Receives the number of records written since the
/// previous call, not a running total.
pub type ProgressFn = Arc<dyn Fn(usize) + Send + Sync>;

/// Loader settings.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Name of the index to create
    pub index_name: String,

    /// Key prefix of every record
    pub prefix: String,

    /// Index structure to create
    pub index_type: IndexType,

    /// Expected vector dimension
    pub dimension: usize,

    /// Skip loading when the store holds more entries than this
    pub skip_threshold: usize,

    /// Maximum number of concurrent writes
    pub concurrency: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            prefix: KEY_PREFIX.to_string(),
            index_type: IndexType::Hnsw,
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            skip_threshold: SKIP_THRESHOLD,
            concurrency: WRITE_CONCURRENCY,
        }
    }
}

impl LoaderConfig {
    /// Loader settings matching the application configuration.
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            index_name: config.index_name.clone(),
            index_type: config.index_type,
            ..Self::default()
        }
    }
}

/// Outcome of a load.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    /// Entries found in the store before loading
    pub existing_entries: usize,

    /// Whether the load was skipped by the re-run guard
    pub skipped: bool,

    /// Number of records written
    pub written: usize,

    /// Whether the index was created
    pub index_created: bool,
}

/// Bulk loader coordinating record writes and index creation.
pub struct BulkLoader<S>
where
    S: VectorStore + 'static,
{
    store: Arc<S>,
    config: LoaderConfig,
    progress: Option<ProgressFn>,
}

impl<S> BulkLoader<S>
where
    S: VectorStore + 'static,
{
    pub fn new(store: Arc<S>, config: LoaderConfig) -> Self {
        Self {
            store,
            config,
            progress: None,
        }
    }

    /// Report each finished write to `progress`.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Store key of a record.
    pub fn record_key(&self, id: &str) -> String {
        format!("{}{}", self.config.prefix, id)
    }

    /// Flatten a record: text fields first, then the vector as raw bytes.
    pub fn record_fields(record: PaperRecord) -> HashFields {
        let blob = vector_to_bytes(&record.vector);
        let mut fields: HashFields = record
            .to_fields()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.into_bytes()))
            .collect();
        fields.push(("vector".to_string(), blob));
        fields
    }

    /// Load records from a provider.
    pub async fn load_from_provider<P>(&self, provider: &P) -> IngestionResult<LoadStats>
    where
        P: PaperProvider,
    {
        // The guard runs before any record is fetched.
        if let Some(stats) = self.already_loaded().await? {
            return Ok(stats);
        }

        info!("Reading records from {}", provider.name());
        let records = provider.fetch_papers().await?;
        self.write_all(records, existing).await
    }

    /// Load the given records.
    ///
    /// # Errors
    /// Returns `IngestionError::InvalidInput` if a vector has the wrong
    /// dimension (checked before any write), and `IngestionError::StorageError`
    /// if any write or the index creation fails
    pub async fn load(&self, records: Vec<PaperRecord>) -> IngestionResult<LoadStats> {
        let existing = self.existing_entries().await?;
        if existing > self.config.skip_threshold {
            return Ok(self.skipped(existing));
        }
        self.write_all(records, existing).await
    }

    /// Skip statistics when the store already holds more than the threshold,
    /// `None` when a load should go ahead. Lets callers avoid reading input
    /// they would not write.
    pub async fn already_loaded(&self) -> IngestionResult<Option<LoadStats>> {
        let existing = self.existing_entries().await?;
        Ok((existing > self.config.skip_threshold).then(|| self.skipped(existing)))
    }

    async fn existing_entries(&self) -> IngestionResult<usize> {
        self.store
            .count_entries()
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))
    }

    fn skipped(&self, existing: usize) -> LoadStats {
        info!("papers already loaded ({} entries in store), skipping", existing);
        LoadStats {
            existing_entries: existing,
            skipped: true,
            ..LoadStats::default()
        }
    }

    async fn write_all(&self, records: Vec<PaperRecord>, existing: usize) -> IngestionResult<LoadStats> {
        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.len() != self.config.dimension)
        {
            return Err(IngestionError::InvalidInput(format!(
                "paper {} has a {}-dimensional vector, expected {}",
                bad.id,
                bad.vector.len(),
                self.config.dimension
            )));
        }

        let total = records.len();
        if total == 0 {
            warn!("No records to load");
        }
        info!(
            "Loading {} papers with at most {} concurrent writes",
            total, self.config.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut written = 0;

        for record in records {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| IngestionError::TaskFailed(e.to_string()))?;
            let store = Arc::clone(&self.store);
            let key = self.record_key(&record.id);
            let fields = Self::record_fields(record);

            tasks.spawn(async move {
                let result = store.write_record(&key, fields).await;
                drop(permit);
                result.map_err(|e| IngestionError::StorageError(format!("{}: {}", key, e)))
            });

            // Reap finished writes so a failure stops the load early.
            while let Some(done) = tasks.try_join_next() {
                written += self.finish_write(done)?;
            }
        }

        while let Some(done) = tasks.join_next().await {
            written += self.finish_write(done)?;
        }
        info!("papers loaded! ({} records)", written);

        info!("Creating vector search index");
        let definition = IndexDefinition::for_papers(
            &self.config.index_name,
            &self.config.prefix,
            self.config.index_type,
            self.config.dimension,
            total.max(1),
        );
        self.store
            .create_index(&definition)
            .await
            .map_err(|e| IngestionError::StorageError(e.to_string()))?;
        info!("Search index created");

        Ok(LoadStats {
            existing_entries: existing,
            skipped: false,
            written,
            index_created: true,
        })
    }

    fn finish_write(
        &self,
        done: Result<IngestionResult<()>, tokio::task::JoinError>,
    ) -> IngestionResult<usize> {
        done.map_err(|e| IngestionError::TaskFailed(e.to_string()))??;
        if let Some(progress) = &self.progress {
            progress(1);
        }
        debug!("record written");
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::bytes_to_vector;
    use crate::provider::ProviderResult;
    use crate::query::VectorQuery;
    use crate::storage::{DistanceMetric, SearchHit, StorageError, StorageResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory store recording every call.
    #[derive(Default)]
    struct MockStore {
        state: Mutex<MockStoreState>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[derive(Default)]
    struct MockStoreState {
        preexisting: usize,
        records: HashMap<String, HashFields>,
        indexes: Vec<IndexDefinition>,
        fail_on_key: Option<String>,
        write_delay_ms: u64,
    }

    impl MockStore {
        fn with_entries(preexisting: usize) -> Self {
            let store = Self::default();
            store.state.lock().unwrap().preexisting = preexisting;
            store
        }

        fn fail_on(self, key: &str) -> Self {
            self.state.lock().unwrap().fail_on_key = Some(key.to_string());
            self
        }

        fn slow_writes(self, ms: u64) -> Self {
            self.state.lock().unwrap().write_delay_ms = ms;
            self
        }

        fn record_count(&self) -> usize {
            self.state.lock().unwrap().records.len()
        }

        fn indexes(&self) -> Vec<IndexDefinition> {
            self.state.lock().unwrap().indexes.clone()
        }
    }

    #[async_trait]
    impl VectorStore for MockStore {
        async fn count_entries(&self) -> StorageResult<usize> {
            let state = self.state.lock().unwrap();
            Ok(state.preexisting + state.records.len())
        }

        async fn write_record(&self, key: &str, fields: HashFields) -> StorageResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let (delay, fail) = {
                let state = self.state.lock().unwrap();
                (state.write_delay_ms, state.fail_on_key.as_deref() == Some(key))
            };
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if fail {
                return Err(StorageError::QueryError("connection reset".to_string()));
            }
            self.state
                .lock()
                .unwrap()
                .records
                .insert(key.to_string(), fields);
            Ok(())
        }

        async fn create_index(&self, definition: &IndexDefinition) -> StorageResult<()> {
            self.state.lock().unwrap().indexes.push(definition.clone());
            Ok(())
        }

        async fn search(&self, _: &str, _: &VectorQuery, _: &[u8]) -> StorageResult<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn create_test_record(id: usize, dimension: usize) -> PaperRecord {
        PaperRecord {
            id: format!("2101.{:05}", id),
            title: format!("Paper {}", id),
            abstract_text: format!("Abstract of paper {}", id),
            authors: "A. Author".to_string(),
            categories: "cs.LG".to_string(),
            year: "2021".to_string(),
            update_date: Some("2021-01-04".to_string()),
            journal_ref: None,
            submitter: None,
            doi: None,
            vector: vec![id as f32; dimension],
        }
    }

    fn small_config(index_type: IndexType) -> LoaderConfig {
        LoaderConfig {
            index_type,
            dimension: 4,
            ..LoaderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_populated_store_is_skipped() {
        let store = Arc::new(MockStore::with_entries(301));
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Hnsw));

        let stats = loader
            .load((0..10).map(|i| create_test_record(i, 4)).collect())
            .await
            .unwrap();

        assert!(stats.skipped);
        assert_eq!(stats.existing_entries, 301);
        assert_eq!(stats.written, 0);
        assert_eq!(store.record_count(), 0);
        assert!(store.indexes().is_empty());
    }

    struct CountingProvider {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PaperProvider for CountingProvider {
        async fn fetch_papers(&self) -> ProviderResult<Vec<PaperRecord>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![create_test_record(1, 4)])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_populated_store_is_not_read() {
        let store = Arc::new(MockStore::with_entries(301));
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Hnsw));
        let provider = CountingProvider {
            fetches: AtomicUsize::new(0),
        };

        let before = loader.already_loaded().await.unwrap().unwrap();
        assert!(before.skipped);
        assert_eq!(before.existing_entries, 301);

        let stats = loader.load_from_provider(&provider).await.unwrap();
        assert!(stats.skipped);
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_store_is_loaded_from_provider() {
        let store = Arc::new(MockStore::default());
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Hnsw));
        let provider = CountingProvider {
            fetches: AtomicUsize::new(0),
        };

        assert!(loader.already_loaded().await.unwrap().is_none());
        let stats = loader.load_from_provider(&provider).await.unwrap();
        assert_eq!(stats.written, 1);
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let store = Arc::new(MockStore::with_entries(300));
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Hnsw));

        let stats = loader.load(vec![create_test_record(1, 4)]).await.unwrap();
        assert!(!stats.skipped);
        assert_eq!(stats.written, 1);
    }

    #[tokio::test]
    async fn test_records_are_written_with_vector_blob() {
        let store = Arc::new(MockStore::default());
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Hnsw));

        let stats = loader
            .load((0..25).map(|i| create_test_record(i, 4)).collect())
            .await
            .unwrap();
        assert_eq!(stats.written, 25);
        assert!(stats.index_created);

        let state = store.state.lock().unwrap();
        let fields: HashMap<_, _> = state.records["paper_vector:2101.00003"]
            .iter()
            .cloned()
            .collect();
        assert_eq!(fields["paper_id"], b"2101.00003".to_vec());
        assert_eq!(fields["title"], b"Paper 3".to_vec());
        assert_eq!(bytes_to_vector(&fields["vector"]).unwrap(), vec![3.0; 4]);
        assert_eq!(fields.len(), 11);
    }

    #[tokio::test]
    async fn test_exactly_one_index_is_created() {
        let store = Arc::new(MockStore::default());
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Flat));
        loader
            .load((0..3).map(|i| create_test_record(i, 4)).collect())
            .await
            .unwrap();

        let indexes = store.indexes();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].index_type, IndexType::Flat);
        assert_eq!(indexes[0].metric, DistanceMetric::L2);
        assert_eq!(indexes[0].capacity, 3);
        assert_eq!(indexes[0].prefix, "paper_vector:");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(MockStore::default().slow_writes(5));
        let config = LoaderConfig {
            concurrency: 3,
            ..small_config(IndexType::Hnsw)
        };
        let loader = BulkLoader::new(Arc::clone(&store), config);

        loader
            .load((0..20).map(|i| create_test_record(i, 4)).collect())
            .await
            .unwrap();

        let max = store.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {} writes in flight", max);
        assert!(max >= 2, "writes never overlapped");
        assert_eq!(store.record_count(), 20);
    }

    #[tokio::test]
    async fn test_failed_write_aborts_without_index() {
        let store = Arc::new(MockStore::default().fail_on("paper_vector:2101.00002"));
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Hnsw));

        let result = loader
            .load((0..5).map(|i| create_test_record(i, 4)).collect())
            .await;

        match result {
            Err(IngestionError::StorageError(msg)) => assert!(msg.contains("2101.00002")),
            other => panic!("Expected StorageError, got {other:?}"),
        }
        assert!(store.indexes().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_writes() {
        let store = Arc::new(MockStore::default());
        let loader = BulkLoader::new(Arc::clone(&store), small_config(IndexType::Hnsw));

        let records = vec![create_test_record(1, 4), create_test_record(2, 3)];
        let result = loader.load(records).await;

        assert!(matches!(result, Err(IngestionError::InvalidInput(_))));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_progress_callback() {
        let store = Arc::new(MockStore::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let loader = BulkLoader::new(store, small_config(IndexType::Hnsw))
            .with_progress(Arc::new(move |n: usize| {
                seen.fetch_add(n, Ordering::SeqCst);
            }));

        loader
            .load((0..7).map(|i| create_test_record(i, 4)).collect())
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }
}
