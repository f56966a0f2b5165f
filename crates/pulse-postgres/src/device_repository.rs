use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use pulse_domain::{Device, DeviceRepository, DeviceStateUpdate, SyncError, SyncResult};

use crate::client::PostgresClient;
use crate::models::{status_to_i16, DeviceRow, ROLE_DEVICE, STATUS_OFFLINE, STATUS_ONLINE};

const DEVICE_COLUMNS: &str = "id, name, status, last_update_at, latitude, longitude, \
     position_updated_at, owner_id, template_id, role, created_at, updated_at";

/// PostgreSQL implementation of the device row store.
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    async fn get_device(&self, device_id: i64) -> SyncResult<Option<Device>> {
        let conn = self.client.get_connection().await?;

        let query = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1");
        let row = conn
            .query_opt(query.as_str(), &[&device_id])
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        Ok(row.map(|row| DeviceRow::from_row(&row).into()))
    }

    async fn update_device_state(&self, update: DeviceStateUpdate) -> SyncResult<()> {
        let conn = self.client.get_connection().await?;
        let status = status_to_i16(update.status);

        let touched = match update.position {
            Some(position) => conn
                .execute(
                    "UPDATE devices
                     SET status = $2, last_update_at = $3, latitude = $4, longitude = $5,
                         position_updated_at = $3, updated_at = now()
                     WHERE id = $1",
                    &[
                        &update.device_id,
                        &status,
                        &update.last_update_at,
                        &position.latitude,
                        &position.longitude,
                    ],
                )
                .await,
            None => conn
                .execute(
                    "UPDATE devices
                     SET status = $2, last_update_at = $3, updated_at = now()
                     WHERE id = $1",
                    &[&update.device_id, &status, &update.last_update_at],
                )
                .await,
        }
        .map_err(|e| SyncError::Persistence(e.into()))?;

        debug!(device_id = update.device_id, touched, "updated device state");
        Ok(())
    }

    async fn list_stale_online(&self, cutoff: DateTime<Utc>) -> SyncResult<Vec<Device>> {
        let conn = self.client.get_connection().await?;

        let query = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices
             WHERE status = $1 AND last_update_at < $2 AND role = $3"
        );
        let rows = conn
            .query(query.as_str(), &[&STATUS_ONLINE, &cutoff, &ROLE_DEVICE])
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        Ok(rows
            .iter()
            .map(|row| DeviceRow::from_row(row).into())
            .collect())
    }

    async fn set_offline(&self, device_ids: &[i64]) -> SyncResult<u64> {
        let conn = self.client.get_connection().await?;

        let touched = conn
            .execute(
                "UPDATE devices SET status = $1, updated_at = now() WHERE id = ANY($2)",
                &[&STATUS_OFFLINE, &device_ids],
            )
            .await
            .map_err(|e| SyncError::Persistence(e.into()))?;

        debug!(count = touched, "marked devices offline");
        Ok(touched)
    }
}
