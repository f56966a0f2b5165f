use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Channel, Device, DeviceStatus, Position};

/// Materialized device state as held by the device state cache.
///
/// Whenever present in the cache this projection is no older than the last
/// successful coordinator write for the device; it is refreshed synchronously
/// on every write, never left to expire after a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDeviceState {
    pub device: Device,
    pub channels: Vec<Channel>,
}

impl CachedDeviceState {
    pub fn new(device: Device, channels: Vec<Channel>) -> Self {
        Self { device, channels }
    }

    /// Overlay freshly written channels onto the cached list, last write wins
    /// per name. Existing entries keep their position; new names append.
    pub fn merge_channels(&mut self, incoming: Vec<Channel>) {
        for channel in incoming {
            match self.channels.iter_mut().find(|c| c.name == channel.name) {
                Some(existing) => *existing = channel,
                None => self.channels.push(channel),
            }
        }
    }

    /// Projection broadcast to live session subscribers.
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.device.id,
            channels: self.channels.clone(),
            status: self.device.status,
            last_update_at: self.device.last_update_at,
            owner_id: self.device.owner_id,
            position: self.device.position,
        }
    }
}

/// The shape sent to a device's session room on every accepted update and on
/// liveness transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: i64,
    pub channels: Vec<Channel>,
    pub status: DeviceStatus,
    pub last_update_at: DateTime<Utc>,
    pub owner_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}
