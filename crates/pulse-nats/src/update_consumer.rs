use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::PullConsumer};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulse_domain::{DeviceUpdate, SyncCoordinator, SyncError};

/// Parse the device id from an update subject of the form
/// `{prefix}.{device_id}.update`.
pub(crate) fn parse_device_id(subject: &str) -> Option<i64> {
    let mut parts = subject.split('.');
    let _prefix = parts.next()?;
    let id = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("update") => Some(id),
        _ => None,
    }
}

/// JetStream pull consumer for inbound device updates.
///
/// Subscribes to `{subject_prefix}.*.update`, decodes each message as a JSON
/// `DeviceUpdate`, and applies it through the sync coordinator. Malformed
/// messages and rejected batches are logged and dropped; transient persistence
/// failures are redelivered.
pub struct DeviceUpdateConsumer {
    consumer: PullConsumer,
    coordinator: Arc<SyncCoordinator>,
    batch_size: usize,
    max_wait: Duration,
}

impl DeviceUpdateConsumer {
    pub async fn new(
        jetstream: &jetstream::Context,
        stream_name: &str,
        consumer_name: &str,
        subject_prefix: &str,
        coordinator: Arc<SyncCoordinator>,
    ) -> Result<Self> {
        let filter_subject = format!("{subject_prefix}.*.update");
        debug!(
            stream = stream_name,
            consumer = consumer_name,
            subject = %filter_subject,
            "Creating JetStream consumer"
        );

        let consumer = jetstream
            .create_consumer_on_stream(
                jetstream::consumer::pull::Config {
                    name: Some(consumer_name.to_string()),
                    durable_name: Some(consumer_name.to_string()),
                    filter_subject,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
                stream_name,
            )
            .await
            .context("Failed to create consumer")?;

        info!(
            stream = stream_name,
            consumer = consumer_name,
            "Consumer created successfully"
        );

        Ok(Self {
            consumer,
            coordinator,
            batch_size: 64,
            max_wait: Duration::from_secs(5),
        })
    }

    pub async fn run(&self, ctx: CancellationToken) -> Result<()> {
        info!("Starting device update consumer loop");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("Received shutdown signal, stopping consumer");
                    break;
                }
                result = self.fetch_and_process_batch() => {
                    if let Err(e) = result {
                        error!(error = %e, "Error processing batch");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    async fn fetch_and_process_batch(&self) -> Result<()> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(self.batch_size)
            .expires(self.max_wait)
            .messages()
            .await
            .context("Failed to fetch messages")?;

        while let Some(result) = messages.next().await {
            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Error receiving message from batch");
                    continue;
                }
            };

            match self.process_message(&message).await {
                Disposition::Ack => {
                    if let Err(e) = message.ack().await {
                        error!(error = %e, subject = %message.subject, "Failed to acknowledge message");
                    }
                }
                Disposition::Redeliver => {
                    if let Err(e) = message.ack_with(jetstream::AckKind::Nak(None)).await {
                        error!(error = %e, subject = %message.subject, "Failed to reject message");
                    }
                }
            }
        }

        Ok(())
    }

    async fn process_message(&self, message: &jetstream::Message) -> Disposition {
        let Some(device_id) = parse_device_id(&message.subject) else {
            error!(subject = %message.subject, "Update subject has no device id, dropping");
            return Disposition::Ack;
        };

        let update: DeviceUpdate = match serde_json::from_slice(&message.payload) {
            Ok(update) => update,
            Err(e) => {
                error!(
                    error = %e,
                    device_id,
                    "Failed to decode device update, dropping"
                );
                return Disposition::Ack;
            }
        };

        match self.coordinator.apply(device_id, update).await {
            Ok(outcome) => {
                debug!(
                    device_id,
                    warnings = outcome.warnings.len(),
                    "Applied device update"
                );
                Disposition::Ack
            }
            // Transient backend failures are worth redelivering; everything
            // else would fail the same way again.
            Err(e @ (SyncError::Persistence(_) | SyncError::Timeout(_))) => {
                warn!(error = %e, device_id, "Device update failed, redelivering");
                Disposition::Redeliver
            }
            Err(e) => {
                warn!(error = %e, device_id, "Device update rejected, dropping");
                Disposition::Ack
            }
        }
    }
}

enum Disposition {
    Ack,
    Redeliver,
}
