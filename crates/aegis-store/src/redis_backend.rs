//! Redis-backed counter store backend.
//!
//! Keys follow the layout in [`crate::keys`]; sample buffers are sorted
//! sets scored by timestamp. Counter creation and expiry are two commands,
//! which is acceptable because windows tolerate brief over-count under
//! concurrency.

use crate::backend::{CounterBackend, Sample};
use crate::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

fn store_err(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Backend over a shared Redis instance.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connects to the given Redis URL (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(store_err)?;
        let conn = ConnectionManager::new(client).await.map_err(store_err)?;
        Ok(Self { conn })
    }

    fn ttl_seconds(ttl: Duration) -> i64 {
        (ttl.as_secs().max(1)) as i64
    }
}

#[async_trait]
impl CounterBackend for RedisBackend {
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let n: u64 = redis::cmd("INCRBY")
            .arg(key)
            .arg(1u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        if n == 1 {
            if let Some(ttl) = ttl {
                let _: i64 = redis::cmd("EXPIRE")
                    .arg(key)
                    .arg(Self::ttl_seconds(ttl))
                    .query_async(&mut conn)
                    .await
                    .map_err(store_err)?;
            }
        }
        Ok(n)
    }

    async fn get_count(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let n: Option<u64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(n.unwrap_or(0))
    }

    async fn set_window_start(
        &self,
        key: &str,
        start_ms: u64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(start_ms);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(Self::ttl_seconds(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(store_err)?;
        Ok(())
    }

    async fn get_window_start(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn.clone();
        let start: Option<u64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(start)
    }

    async fn push_sample(
        &self,
        key: &str,
        ts_ms: u64,
        value: f64,
        cap: usize,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let member = format!("{ts_ms}:{value}");
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(ts_ms)
            .arg(&member)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        let _: i64 = redis::cmd("ZREMRANGEBYRANK")
            .arg(key)
            .arg(0)
            .arg(-(cap as i64 + 1))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn range_samples(&self, key: &str, from_ts_ms: u64) -> Result<Vec<Sample>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(from_ts_ms)
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let mut samples = Vec::with_capacity(members.len());
        for member in members {
            if let Some((ts, value)) = member.split_once(':') {
                if let (Ok(ts_ms), Ok(value)) = (ts.parse::<u64>(), value.parse::<f64>()) {
                    samples.push(Sample { ts_ms, value });
                }
            }
        }
        Ok(samples)
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
