use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use skyfare_core::repository::{LockStore, RepoResult};

/// Redis-backed advisory store. SET NX EX gives the O(1) check-and-set the
/// seat-selection hot path relies on; key TTLs are the silent-expiry half of
/// the sweep's reconciliation contract.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LockStore for RedisClient {
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> RepoResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX: only set if the key does not exist.
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> RepoResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> RepoResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> RepoResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn extend(&self, key: &str, ttl: Duration) -> RepoResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let updated: bool = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        Ok(updated)
    }
}
