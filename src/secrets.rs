//! Redis-backed key-value store for short-lived secrets (verification codes).

use anyhow::Context;
use axum::async_trait;
use redis::AsyncCommands;
use tracing::info;

/// Key-value store with per-entry TTL. Entries vanish on expiry; `put`
/// overwrites any prior value for the key.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

pub struct RedisSecrets {
    client: redis::Client,
}

impl RedisSecrets {
    /// Connect and verify the server answers before accepting traffic.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        info!(url = %url, "connecting to redis");
        let client = redis::Client::open(url).context("redis client")?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .context("redis connect")?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("redis ping")?;
        info!(response = %pong, "redis connection established");
        Ok(Self { client })
    }
}

#[async_trait]
impl SecretStore for RedisSecrets {
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("redis connect")?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds)
            .await
            .context("redis set_ex")?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("redis connect")?;
        let value: Option<String> = conn.get(key).await.context("redis get")?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("redis connect")?;
        conn.del::<_, ()>(key).await.context("redis del")?;
        Ok(())
    }
}
