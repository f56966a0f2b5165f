use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use pulse_domain::{DeviceSnapshot, SessionBroadcaster};

use crate::broker_publisher::device_subject;

const DEVICE_DATA_EVENT: &str = "device_data";

/// Event envelope delivered to a device's session room.
#[derive(Debug, Serialize)]
pub struct RoomEvent<'a> {
    pub event: &'a str,
    pub payload: &'a DeviceSnapshot,
}

/// Broadcasts merged device state to live session subscribers via core NATS,
/// one room subject per device: `{base_subject}.{device_id}`.
pub struct NatsSessionBroadcaster {
    client: async_nats::Client,
    base_subject: String,
}

impl NatsSessionBroadcaster {
    pub fn new(client: async_nats::Client, base_subject: String) -> Self {
        debug!(base_subject = %base_subject, "initialized NatsSessionBroadcaster");
        Self {
            client,
            base_subject,
        }
    }
}

#[async_trait]
impl SessionBroadcaster for NatsSessionBroadcaster {
    async fn broadcast_state(
        &self,
        device_id: i64,
        snapshot: &DeviceSnapshot,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&RoomEvent {
            event: DEVICE_DATA_EVENT,
            payload: snapshot,
        })
        .context("failed to encode room event")?;
        let subject = device_subject(&self.base_subject, device_id);

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("failed to broadcast to session room")?;

        debug!(subject = %subject, "broadcast device state to session room");
        Ok(())
    }
}
