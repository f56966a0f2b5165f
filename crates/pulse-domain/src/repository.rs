use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::cached_state::{CachedDeviceState, DeviceSnapshot};
use crate::error::SyncResult;
use crate::types::{
    Channel, ChannelDefinition, ChannelWrite, Device, DeviceStateUpdate, Template,
};

/// Device row storage. Infrastructure (pulse-postgres) implements this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn get_device(&self, device_id: i64) -> SyncResult<Option<Device>>;

    /// Update status, last-update timestamp and optionally position in one
    /// statement.
    async fn update_device_state(&self, update: DeviceStateUpdate) -> SyncResult<()>;

    /// Devices still marked online whose last update predates `cutoff`.
    /// Reads the store directly; the liveness sweep must not trust the cache.
    async fn list_stale_online(&self, cutoff: DateTime<Utc>) -> SyncResult<Vec<Device>>;

    /// Mark the given devices offline in a single batched write. Returns the
    /// number of rows touched.
    async fn set_offline(&self, device_ids: &[i64]) -> SyncResult<u64>;
}

/// Per-device channel row storage, keyed by `(device_id, name)`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get_device_channels(&self, device_id: i64) -> SyncResult<Vec<Channel>>;

    async fn get_channel(&self, device_id: i64, name: &str) -> SyncResult<Option<Channel>>;

    /// Upsert the whole batch in one statement: existing rows are overwritten,
    /// missing rows created. Returns the rows as persisted.
    async fn bulk_upsert(
        &self,
        device_id: i64,
        writes: &[ChannelWrite],
    ) -> SyncResult<Vec<Channel>>;

    /// Seed one row per template channel with a type-appropriate default,
    /// leaving rows that already exist untouched.
    async fn seed_defaults(
        &self,
        device_id: i64,
        definitions: &[ChannelDefinition],
    ) -> SyncResult<Vec<Channel>>;
}

/// Read-only template resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemplateCatalog: Send + Sync {
    async fn resolve(&self, template_id: &str) -> SyncResult<Option<Template>>;
}

/// TTL-bound cache of materialized device state, keyed by device id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceStateCache: Send + Sync {
    async fn get(&self, device_id: i64) -> SyncResult<Option<CachedDeviceState>>;

    async fn put(
        &self,
        device_id: i64,
        state: &CachedDeviceState,
        ttl: Duration,
    ) -> SyncResult<()>;

    async fn invalidate(&self, device_id: i64) -> SyncResult<()>;
}

/// Topic-based publish of applied channel deltas, keyed by device id.
/// At-least-once, fire-and-forget from the coordinator's point of view.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    async fn publish_channels(
        &self,
        device_id: i64,
        channels: &[ChannelWrite],
    ) -> anyhow::Result<()>;
}

/// Room-based broadcast of merged device state to live session subscribers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionBroadcaster: Send + Sync {
    async fn broadcast_state(
        &self,
        device_id: i64,
        snapshot: &DeviceSnapshot,
    ) -> anyhow::Result<()>;
}
