//! Redis cache backend.
//!
//! One `ConnectionManager` is shared by every caller. It is created on first
//! use rather than at startup, so the service boots while Redis is down; a
//! failed attempt leaves the cell empty and the next call tries again.

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, aio::ConnectionManager};
use tokio::sync::OnceCell;
use tracing::debug;

use super::backend::{CacheBackend, CacheError};

const SCAN_COUNT: usize = 500;
const DELETE_CHUNK: usize = 256;

pub struct RedisBackend {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisBackend {
    /// Validates `url` without connecting.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: Client::open(url)?,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                debug!(target = "shelf::cache::redis", "Opening redis connection");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(manager.clone())
    }
}

/// Escapes glob metacharacters so `value` only matches itself in `MATCH`.
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\' | '^' | '-') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let seconds = ttl.as_secs().max(1);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let mut deleted = 0_u64;
        let mut failed = 0_u64;
        let mut last_error = None;

        for chunk in keys.chunks(DELETE_CHUNK) {
            let mut command = redis::cmd("DEL");
            for key in chunk {
                command.arg(key.as_str());
            }
            let result: redis::RedisResult<u64> = command.query_async(&mut conn).await;
            match result {
                Ok(count) => deleted += count,
                Err(err) => {
                    failed += chunk.len() as u64;
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            None => Ok(deleted),
            Some(err) if deleted == 0 && failed == keys.len() as u64 => Err(err.into()),
            Some(err) => Err(CacheError::PartialDelete {
                deleted,
                failed,
                message: err.to_string(),
            }),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", escape_glob(prefix));
        let mut cursor = 0_u64;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may report a key more than once while the keyspace is rehashed.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn increment(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self.connection().await?;
        let value: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
