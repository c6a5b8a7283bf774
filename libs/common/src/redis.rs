//! Redis client module with connection pooling
//!
//! Provides a minimal async Redis client with only the methods the state
//! store backend needs.

use anyhow::{Context, Result};
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use std::sync::Arc;
use std::time::Duration;

/// Pool sizing for the state store connection
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_idle: Option<u32>,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl RedisPoolConfig {
    /// Defaults sized for a control plane: few, long-lived connections
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 16,
            min_idle: Some(2),
            connection_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Pooled async Redis client
#[derive(Clone)]
pub struct RedisClient {
    pool: Arc<Pool<RedisConnectionManager>>,
    url: String,
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("url", &self.url)
            .field("pool_state", &self.pool.state())
            .finish()
    }
}

impl RedisClient {
    /// Connect with default pool sizing
    pub async fn new(url: &str) -> Result<Self> {
        Self::connect(RedisPoolConfig::from_url(url)).await
    }

    /// Build the pool and check the server answers PING
    pub async fn connect(config: RedisPoolConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .with_context(|| format!("Invalid Redis URL {}", config.url))?;
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(config.min_idle)
            .idle_timeout(config.idle_timeout)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .context("Failed to build Redis connection pool")?;

        let client = Self {
            pool: Arc::new(pool),
            url: config.url,
        };
        client.ping().await?;
        Ok(client)
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool
            .get()
            .await
            .context("Failed to get connection from pool")
    }

    /// PING the server
    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.get_connection().await?;
        redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .context("Failed to ping Redis server")
    }

    /// HMGET `fields` of one hash
    pub async fn hmget<T: redis::FromRedisValue>(&self, key: &str, fields: &[&str]) -> Result<T> {
        let mut conn = self.get_connection().await?;
        let mut cmd = redis::cmd("HMGET");
        cmd.arg(key);
        for field in fields {
            cmd.arg(*field);
        }
        cmd.query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to HMGET from key: {}", key))
    }

    /// Every key matching `pattern`, via SCAN
    pub async fn scan_match(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let mut keys = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await
                .with_context(|| format!("Failed to SCAN with pattern: {}", pattern))?;

            keys.extend(batch);
            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    /// Delete one or more keys
    pub async fn del(&self, keys: &[&str]) -> Result<u32> {
        let mut conn = self.get_connection().await?;
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(*key);
        }
        cmd.query_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to DEL keys: {:?}", keys))
    }

    /// Run a Lua script (EVALSHA with EVAL fallback)
    pub async fn eval_script<T: redis::FromRedisValue>(
        &self,
        script: &redis::Script,
        keys: &[&str],
        args: &[&str],
    ) -> Result<T> {
        let mut conn = self.get_connection().await?;
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(*key);
        }
        for arg in args {
            invocation.arg(*arg);
        }
        invocation
            .invoke_async(&mut *conn)
            .await
            .with_context(|| format!("Failed to run script on keys: {:?}", keys))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_from_url() {
        let config = RedisPoolConfig::from_url("redis://cache:6380");
        assert_eq!(config.url, "redis://cache:6380");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_eval_script() {
        let client = RedisClient::new("redis://localhost:6379").await.unwrap();
        let script = redis::Script::new("return redis.call('SET', KEYS[1], ARGV[1])");
        let _: String = client
            .eval_script(&script, &["keel_test_eval"], &["1"])
            .await
            .unwrap();
        let value: Vec<Option<String>> = client.hmget("keel_test_missing", &["v"]).await.unwrap();
        assert_eq!(value, vec![None]);
        client.del(&["keel_test_eval"]).await.unwrap();
    }
}
