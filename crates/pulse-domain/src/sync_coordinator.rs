use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cached_state::{CachedDeviceState, DeviceSnapshot};
use crate::channel_validator::validate_channels;
use crate::device_lock::DeviceLockRegistry;
use crate::error::{FanoutSink, FanoutWarning, SyncError, SyncResult};
use crate::repository::{
    BrokerPublisher, ChannelRepository, DeviceRepository, DeviceStateCache, SessionBroadcaster,
    TemplateCatalog,
};
use crate::types::{
    Channel, ChannelWrite, Device, DeviceStateUpdate, DeviceStatus, DeviceUpdate,
};

#[derive(Debug, Clone)]
pub struct SyncCoordinatorConfig {
    /// TTL applied on every cache put.
    pub cache_ttl: Duration,
    /// Deadline for the correctness-critical path (lock wait included).
    pub apply_timeout: Duration,
    /// Per-attempt deadline for each fan-out sink.
    pub fanout_timeout: Duration,
    /// Extra fan-out attempts after the first failure.
    pub fanout_retries: u32,
}

impl Default for SyncCoordinatorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            apply_timeout: Duration::from_secs(10),
            fanout_timeout: Duration::from_secs(2),
            fanout_retries: 1,
        }
    }
}

/// Result of a successful apply. Fan-out failures do not fail the call; they
/// surface here as warnings next to the merged state.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub state: CachedDeviceState,
    pub warnings: Vec<FanoutWarning>,
}

struct AppliedUpdate {
    state: CachedDeviceState,
    deltas: Vec<ChannelWrite>,
}

/// Orchestrates validate, persist, cache-update and fan-out for device
/// updates. The single entry point shared by telemetry ingress, session
/// ingress and administrative handlers.
pub struct SyncCoordinator {
    devices: Arc<dyn DeviceRepository>,
    channels: Arc<dyn ChannelRepository>,
    catalog: Arc<dyn TemplateCatalog>,
    cache: Arc<dyn DeviceStateCache>,
    broker: Arc<dyn BrokerPublisher>,
    sessions: Arc<dyn SessionBroadcaster>,
    locks: DeviceLockRegistry,
    config: SyncCoordinatorConfig,
}

impl SyncCoordinator {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        channels: Arc<dyn ChannelRepository>,
        catalog: Arc<dyn TemplateCatalog>,
        cache: Arc<dyn DeviceStateCache>,
        broker: Arc<dyn BrokerPublisher>,
        sessions: Arc<dyn SessionBroadcaster>,
        config: SyncCoordinatorConfig,
    ) -> Self {
        Self {
            devices,
            channels,
            catalog,
            cache,
            broker,
            sessions,
            locks: DeviceLockRegistry::new(),
            config,
        }
    }

    /// Apply a proposed update to a device: resolve current state, validate
    /// the channel batch against the device's template, persist everything as
    /// one batched write, refresh the cache, then fan the result out.
    ///
    /// Updates for the same device are serialized; different devices proceed
    /// in parallel. The critical path runs under `apply_timeout`; fan-out is
    /// best-effort and never rolls back persisted state.
    pub async fn apply(&self, device_id: i64, update: DeviceUpdate) -> SyncResult<ApplyOutcome> {
        debug!(
            device_id,
            channel_count = update.channels.len(),
            has_position = update.position.is_some(),
            "applying device update"
        );

        let applied = match tokio::time::timeout(
            self.config.apply_timeout,
            self.apply_critical(device_id, &update),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(SyncError::Timeout(self.config.apply_timeout)),
        };

        let snapshot = applied.state.snapshot();
        let warnings = self.fan_out(device_id, &applied.deltas, &snapshot).await;

        info!(
            device_id,
            channels_written = applied.deltas.len(),
            status = %applied.state.device.status,
            warnings = warnings.len(),
            "device update applied"
        );

        Ok(ApplyOutcome {
            state: applied.state,
            warnings,
        })
    }

    /// Steps 1-5: the consistency-critical section, serialized per device.
    async fn apply_critical(
        &self,
        device_id: i64,
        update: &DeviceUpdate,
    ) -> SyncResult<AppliedUpdate> {
        let _guard = self.locks.acquire(device_id).await;

        let mut state = self.load_state(device_id).await?;

        if !update.channels.is_empty() {
            let template_id = state.device.template_id.clone().ok_or_else(|| {
                SyncError::TemplateNotFound(format!("device {device_id} has no template"))
            })?;
            let template = self
                .catalog
                .resolve(&template_id)
                .await?
                .ok_or(SyncError::TemplateNotFound(template_id))?;
            validate_channels(&template.channels, &update.channels)?;
        }

        let written = if update.channels.is_empty() {
            Vec::new()
        } else {
            self.channels
                .bulk_upsert(device_id, &update.channels)
                .await?
        };

        // A telemetry update implies liveness: channel or position payload
        // with no explicit status marks the device online. An empty update
        // leaves the current status alone.
        let status = update.status.unwrap_or(if update.carries_payload() {
            DeviceStatus::Online
        } else {
            state.device.status
        });
        let now = Utc::now();

        self.devices
            .update_device_state(DeviceStateUpdate {
                device_id,
                status,
                last_update_at: now,
                position: update.position,
            })
            .await?;

        state.device.status = status;
        state.device.last_update_at = now;
        if let Some(position) = update.position {
            state.device.position = Some(position);
            state.device.position_updated_at = Some(now);
        }
        state.merge_channels(written.clone());

        self.cache
            .put(device_id, &state, self.config.cache_ttl)
            .await?;

        let deltas = written
            .into_iter()
            .map(|channel| ChannelWrite {
                name: channel.name,
                value: channel.value,
            })
            .collect();

        Ok(AppliedUpdate { state, deltas })
    }

    /// Read path: cache-first, store on miss, populating the cache on the way
    /// out.
    pub async fn get_state(&self, device_id: i64) -> SyncResult<CachedDeviceState> {
        self.load_state(device_id).await
    }

    /// Seed one channel row per template channel with a type-appropriate
    /// default value. Used when a device is provisioned against a template.
    pub async fn provision_channels(&self, device_id: i64) -> SyncResult<Vec<Channel>> {
        let device = self
            .devices
            .get_device(device_id)
            .await?
            .ok_or(SyncError::DeviceNotFound(device_id))?;
        let template_id = device.template_id.ok_or_else(|| {
            SyncError::TemplateNotFound(format!("device {device_id} has no template"))
        })?;
        let template = self
            .catalog
            .resolve(&template_id)
            .await?
            .ok_or(SyncError::TemplateNotFound(template_id))?;

        let seeded = self
            .channels
            .seed_defaults(device_id, &template.channels)
            .await?;
        self.cache.invalidate(device_id).await?;

        info!(device_id, seeded = seeded.len(), "provisioned default channels");
        Ok(seeded)
    }

    /// Fan-out used by the liveness monitor after it has already marked the
    /// device offline in the store: a synthetic offline snapshot with no
    /// channel deltas, so only session subscribers are notified.
    pub async fn fan_out_offline(&self, device: &Device) -> Vec<FanoutWarning> {
        let snapshot = DeviceSnapshot {
            id: device.id,
            channels: Vec::new(),
            status: DeviceStatus::Offline,
            last_update_at: device.last_update_at,
            owner_id: device.owner_id,
            position: device.position,
        };
        self.fan_out(device.id, &[], &snapshot).await
    }

    async fn load_state(&self, device_id: i64) -> SyncResult<CachedDeviceState> {
        match self.cache.get(device_id).await {
            Ok(Some(state)) => return Ok(state),
            Ok(None) => {}
            // The store is the source of truth; a broken cache read degrades
            // to a miss.
            Err(e) => warn!(device_id, error = %e, "cache read failed, falling back to store"),
        }

        let device = self
            .devices
            .get_device(device_id)
            .await?
            .ok_or(SyncError::DeviceNotFound(device_id))?;
        let channels = self.channels.get_device_channels(device_id).await?;
        let state = CachedDeviceState::new(device, channels);

        // Read-through population is advisory; failing it must not fail the
        // read. Write-through puts after a store write do propagate.
        if let Err(e) = self
            .cache
            .put(device_id, &state, self.config.cache_ttl)
            .await
        {
            warn!(device_id, error = %e, "failed to populate cache on read-through");
        }

        Ok(state)
    }

    /// Step 6: advisory delivery to observers, decoupled from the
    /// transactional path. Each sink gets its own deadline and a bounded
    /// retry; failures are reported as warnings, never as errors.
    async fn fan_out(
        &self,
        device_id: i64,
        deltas: &[ChannelWrite],
        snapshot: &DeviceSnapshot,
    ) -> Vec<FanoutWarning> {
        let mut warnings = Vec::new();

        if !deltas.is_empty() {
            if let Some(warning) = self
                .deliver(device_id, FanoutSink::Broker, || {
                    self.broker.publish_channels(device_id, deltas)
                })
                .await
            {
                warnings.push(warning);
            }
        }

        if let Some(warning) = self
            .deliver(device_id, FanoutSink::Session, || {
                self.sessions.broadcast_state(device_id, snapshot)
            })
            .await
        {
            warnings.push(warning);
        }

        warnings
    }

    async fn deliver<F, Fut>(
        &self,
        device_id: i64,
        sink: FanoutSink,
        attempt_fn: F,
    ) -> Option<FanoutWarning>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let attempts = self.config.fanout_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.fanout_timeout, attempt_fn()).await {
                Ok(Ok(())) => return None,
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("timed out after {:?}", self.config.fanout_timeout)
                }
            }
            debug!(device_id, sink = %sink, attempt, error = %last_error, "fan-out attempt failed");
        }

        warn!(device_id, sink = %sink, error = %last_error, "fan-out failed, state remains persisted");
        Some(FanoutWarning {
            sink,
            error: last_error,
        })
    }
}
