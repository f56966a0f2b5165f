use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Redis client with automatic reconnection.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        info!(url = %config.url, "connecting to Redis");

        let client = redis::Client::open(config.url.as_str())
            .context("invalid Redis URL")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;

        info!("successfully connected to Redis");
        Ok(Self { manager })
    }

    /// Verify connectivity with a round trip.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .context("Redis ping failed")?;
        Ok(())
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }
}
