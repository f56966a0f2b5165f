use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_postgres::Row;

use pulse_domain::{Channel, ChannelValue, Device, DeviceRole, DeviceStatus, Position, SyncResult};

pub const STATUS_OFFLINE: i16 = 0;
pub const STATUS_ONLINE: i16 = 1;

pub const ROLE_ADMIN: i16 = 0;
pub const ROLE_DEVICE: i16 = 1;

pub fn status_to_i16(status: DeviceStatus) -> i16 {
    match status {
        DeviceStatus::Offline => STATUS_OFFLINE,
        DeviceStatus::Online => STATUS_ONLINE,
    }
}

pub fn status_from_i16(value: i16) -> DeviceStatus {
    match value {
        STATUS_ONLINE => DeviceStatus::Online,
        _ => DeviceStatus::Offline,
    }
}

pub fn role_from_i16(value: i16) -> DeviceRole {
    match value {
        ROLE_ADMIN => DeviceRole::Admin,
        _ => DeviceRole::Device,
    }
}

/// Device row with raw column encodings.
#[derive(Debug, Clone)]
pub struct DeviceRow {
    pub id: i64,
    pub name: String,
    pub status: i16,
    pub last_update_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub position_updated_at: Option<DateTime<Utc>>,
    pub owner_id: i64,
    pub template_id: Option<String>,
    pub role: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRow {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get(0),
            name: row.get(1),
            status: row.get(2),
            last_update_at: row.get(3),
            latitude: row.get(4),
            longitude: row.get(5),
            position_updated_at: row.get(6),
            owner_id: row.get(7),
            template_id: row.get(8),
            role: row.get(9),
            created_at: row.get(10),
            updated_at: row.get(11),
        }
    }
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        let position = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Position {
                latitude,
                longitude,
            }),
            _ => None,
        };
        Device {
            id: row.id,
            name: row.name,
            status: status_from_i16(row.status),
            last_update_at: row.last_update_at,
            position,
            position_updated_at: row.position_updated_at,
            owner_id: row.owner_id,
            template_id: row.template_id,
            role: role_from_i16(row.role),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Build a domain channel from a `device_channels` row
/// (device_id, name, value, created_at, updated_at).
pub fn channel_from_row(row: &Row) -> SyncResult<Channel> {
    let value: serde_json::Value = row.get(2);
    let value: ChannelValue = serde_json::from_value(value)
        .context("invalid channel value stored in device_channels")?;
    Ok(Channel {
        device_id: row.get(0),
        name: row.get(1),
        value,
        created_at: row.get(3),
        updated_at: row.get(4),
    })
}
