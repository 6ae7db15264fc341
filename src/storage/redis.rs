//! Redis implementation of the vector store.
//!
//! Records are written as hashes with `HSET`, the index is created with
//! `FT.CREATE` and queried with `FT.SEARCH` (RediSearch). The connection is a
//! `ConnectionManager`, which is cheap to clone and reconnects on its own, so
//! every call works on its own clone and the store can be shared across tasks.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Value;
use tracing::{debug, info};

use super::{HashFields, IndexDefinition, SearchHit, StorageError, StorageResult, VectorStore};
use crate::config::RedisConfig;
use crate::query::{VectorQuery, DIALECT, VECTOR_PARAM};

/// Redis-backed vector store.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to the server described by `config`.
    ///
    /// # Errors
    /// Returns `StorageError::ConnectionError` if the URL is invalid or the
    /// server cannot be reached
    pub async fn connect(config: &RedisConfig) -> StorageResult<Self> {
        debug!("Connecting to redis at {}:{} db {}", config.host, config.port, config.db);
        let client = redis::Client::open(config.url())
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        info!("Connected to redis at {}:{}", config.host, config.port);
        Ok(Self { connection })
    }
}

fn query_error(err: redis::RedisError) -> StorageError {
    StorageError::QueryError(err.to_string())
}

#[async_trait]
impl VectorStore for RedisStore {
    async fn count_entries(&self) -> StorageResult<usize> {
        let mut conn = self.connection.clone();
        let size: usize = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .map_err(query_error)?;
        Ok(size)
    }

    async fn write_record(&self, key: &str, fields: HashFields) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (name, value) in &fields {
            cmd.arg(name.as_str()).arg(value.as_slice());
        }
        let _: i64 = cmd.query_async(&mut conn).await.map_err(query_error)?;
        Ok(())
    }

    async fn create_index(&self, definition: &IndexDefinition) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("FT.CREATE")
            .arg(definition.to_args())
            .query_async(&mut conn)
            .await
            .map_err(query_error)?;
        info!(
            "Created {} index {:?} over prefix {:?}",
            definition.index_type, definition.name, definition.prefix
        );
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &VectorQuery,
        vector: &[u8],
    ) -> StorageResult<Vec<SearchHit>> {
        let mut conn = self.connection.clone();
        let query_string = query.query_string();
        debug!("FT.SEARCH {} {}", index, query_string);

        let reply: Value = redis::cmd("FT.SEARCH")
            .arg(index)
            .arg(query_string)
            .arg(query.directives())
            .arg("PARAMS")
            .arg(2)
            .arg(VECTOR_PARAM)
            .arg(vector)
            .arg("DIALECT")
            .arg(DIALECT)
            .query_async(&mut conn)
            .await
            .map_err(query_error)?;

        parse_search_reply(reply)
    }
}

fn value_bytes(value: Value) -> Option<Vec<u8>> {
    match value {
        Value::BulkString(bytes) => Some(bytes),
        Value::SimpleString(s) => Some(s.into_bytes()),
        Value::Int(i) => Some(i.to_string().into_bytes()),
        Value::Double(d) => Some(d.to_string().into_bytes()),
        _ => None,
    }
}

/// Parse a RESP2 `FT.SEARCH` reply.
///
/// The reply is `[total, key, [field, value, ...], key, [...], ...]`.
pub fn parse_search_reply(reply: Value) -> StorageResult<Vec<SearchHit>> {
    let items = match reply {
        Value::Array(items) => items,
        other => {
            return Err(StorageError::ResponseError(format!(
                "expected an array, got {:?}",
                other
            )))
        }
    };

    let mut items = items.into_iter();
    match items.next() {
        Some(Value::Int(_)) => {}
        other => {
            return Err(StorageError::ResponseError(format!(
                "expected the result count first, got {:?}",
                other
            )))
        }
    }

    let mut hits = Vec::new();
    while let Some(key) = items.next() {
        let key = value_bytes(key)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .ok_or_else(|| StorageError::ResponseError("document key is not a string".to_string()))?;

        let mut fields = HashMap::new();
        match items.next() {
            Some(Value::Array(pairs)) => {
                let mut pairs = pairs.into_iter();
                while let (Some(name), Some(value)) = (pairs.next(), pairs.next()) {
                    let name = value_bytes(name).ok_or_else(|| {
                        StorageError::ResponseError(format!("field name of {} is not a string", key))
                    })?;
                    if let Some(value) = value_bytes(value) {
                        fields.insert(String::from_utf8_lossy(&name).into_owned(), value);
                    }
                }
            }
            Some(Value::Nil) | None => {}
            Some(other) => {
                return Err(StorageError::ResponseError(format!(
                    "expected fields of {}, got {:?}",
                    key, other
                )))
            }
        }

        hits.push(SearchHit { key, fields });
    }

    Ok(hits)
}
