use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use pulse_domain::{
    Channel, ChannelDefinition, ChannelRepository, ChannelValue, ChannelWrite, SyncError,
    SyncResult,
};

use crate::client::PostgresClient;
use crate::models::channel_from_row;

/// PostgreSQL implementation of per-device channel storage.
///
/// Batch writes go through a single multi-row statement so a batch either
/// lands as a whole or not at all; the coordinator never retries row by row.
#[derive(Clone)]
pub struct PostgresChannelRepository {
    client: PostgresClient,
}

impl PostgresChannelRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

fn encode_values(values: impl Iterator<Item = ChannelValue>) -> SyncResult<Vec<serde_json::Value>> {
    values
        .map(|value| serde_json::to_value(value).context("channel value is not serializable"))
        .collect::<Result<_, _>>()
        .map_err(SyncError::Persistence)
}

#[async_trait]
impl ChannelRepository for PostgresChannelRepository {
    async fn get_device_channels(&self, device_id: i64) -> SyncResult<Vec<Channel>> {
        let conn = self.client.get_connection().await?;

        let rows = conn
            .query(
                "SELECT device_id, name, value, created_at, updated_at
                 FROM device_channels
                 WHERE device_id = $1
                 ORDER BY created_at",
                &[&device_id],
            )
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        rows.iter().map(channel_from_row).collect()
    }

    async fn get_channel(&self, device_id: i64, name: &str) -> SyncResult<Option<Channel>> {
        let conn = self.client.get_connection().await?;

        let row = conn
            .query_opt(
                "SELECT device_id, name, value, created_at, updated_at
                 FROM device_channels
                 WHERE device_id = $1 AND name = $2",
                &[&device_id, &name],
            )
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        row.as_ref().map(channel_from_row).transpose()
    }

    async fn bulk_upsert(
        &self,
        device_id: i64,
        writes: &[ChannelWrite],
    ) -> SyncResult<Vec<Channel>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.client.get_connection().await?;

        let names: Vec<&str> = writes.iter().map(|w| w.name.as_str()).collect();
        let values = encode_values(writes.iter().map(|w| w.value.clone()))?;

        let rows = conn
            .query(
                "INSERT INTO device_channels (device_id, name, value, created_at, updated_at)
                 SELECT $1, w.name, w.value, now(), now()
                 FROM unnest($2::text[], $3::jsonb[]) AS w(name, value)
                 ON CONFLICT (device_id, name)
                 DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
                 RETURNING device_id, name, value, created_at, updated_at",
                &[&device_id, &names, &values],
            )
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        debug!(device_id, count = rows.len(), "upserted channel batch");
        rows.iter().map(channel_from_row).collect()
    }

    async fn seed_defaults(
        &self,
        device_id: i64,
        definitions: &[ChannelDefinition],
    ) -> SyncResult<Vec<Channel>> {
        if definitions.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.client.get_connection().await?;

        let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        let values = encode_values(
            definitions
                .iter()
                .map(|d| ChannelValue::default_for(d.channel_type)),
        )?;

        let rows = conn
            .query(
                "INSERT INTO device_channels (device_id, name, value, created_at, updated_at)
                 SELECT $1, w.name, w.value, now(), now()
                 FROM unnest($2::text[], $3::jsonb[]) AS w(name, value)
                 ON CONFLICT (device_id, name) DO NOTHING
                 RETURNING device_id, name, value, created_at, updated_at",
                &[&device_id, &names, &values],
            )
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        debug!(device_id, seeded = rows.len(), "seeded default channels");
        rows.iter().map(channel_from_row).collect()
    }
}
