use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use pulse_domain::{CachedDeviceState, DeviceStateCache, SyncError, SyncResult};

use crate::client::RedisClient;

const KEY_PREFIX: &str = "device";

fn cache_key(device_id: i64) -> String {
    format!("{KEY_PREFIX}:{device_id}")
}

/// Redis-backed device state cache. Entries are JSON documents under
/// `device:{id}` with a TTL; expiry sends the next read back to the store.
#[derive(Clone)]
pub struct RedisDeviceStateCache {
    client: RedisClient,
}

impl RedisDeviceStateCache {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceStateCache for RedisDeviceStateCache {
    async fn get(&self, device_id: i64) -> SyncResult<Option<CachedDeviceState>> {
        let mut conn = self.client.connection();

        let payload: Option<String> = conn
            .get(cache_key(device_id))
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        match payload {
            Some(raw) => {
                let state = serde_json::from_str(&raw)
                    .context("corrupt cached device state")?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        device_id: i64,
        state: &CachedDeviceState,
        ttl: Duration,
    ) -> SyncResult<()> {
        let mut conn = self.client.connection();

        let raw = serde_json::to_string(state)
            .context("device state is not serializable")?;
        let _: () = conn
            .set_ex(cache_key(device_id), raw, ttl.as_secs())
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        debug!(device_id, ttl_secs = ttl.as_secs(), "refreshed cached device state");
        Ok(())
    }

    async fn invalidate(&self, device_id: i64) -> SyncResult<()> {
        let mut conn = self.client.connection();

        let _: () = conn
            .del(cache_key(device_id))
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        debug!(device_id, "invalidated cached device state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_per_device() {
        assert_eq!(cache_key(42), "device:42");
        assert_ne!(cache_key(1), cache_key(2));
    }
}
