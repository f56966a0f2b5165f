use anyhow::Context;
use async_nats::jetstream;
use async_trait::async_trait;
use tracing::debug;

use pulse_domain::{BrokerPublisher, ChannelWrite};

/// Publishes applied channel deltas to the device's broker topic,
/// `{base_subject}.{device_id}`, as a JSON array of `{name, value}` pairs.
pub struct NatsBrokerPublisher {
    jetstream: jetstream::Context,
    base_subject: String,
}

pub(crate) fn device_subject(base_subject: &str, device_id: i64) -> String {
    format!("{base_subject}.{device_id}")
}

impl NatsBrokerPublisher {
    pub fn new(jetstream: jetstream::Context, base_subject: String) -> Self {
        debug!(base_subject = %base_subject, "initialized NatsBrokerPublisher");
        Self {
            jetstream,
            base_subject,
        }
    }
}

#[async_trait]
impl BrokerPublisher for NatsBrokerPublisher {
    async fn publish_channels(
        &self,
        device_id: i64,
        channels: &[ChannelWrite],
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(channels).context("failed to encode channel deltas")?;
        let subject = device_subject(&self.base_subject, device_id);

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .context("failed to publish channel deltas")?
            .await
            .context("broker did not acknowledge publish")?;

        debug!(subject = %subject, count = channels.len(), "published channel deltas");
        Ok(())
    }
}
