use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SyncResult;
use crate::repository::{DeviceRepository, DeviceStateCache};
use crate::sync_coordinator::SyncCoordinator;

#[derive(Debug, Clone)]
pub struct LivenessMonitorConfig {
    /// Maximum silence before an online device is considered offline.
    pub staleness_window: Duration,
    /// How often the sweep runs. Keep well below the window.
    pub sweep_period: Duration,
}

impl Default for LivenessMonitorConfig {
    fn default() -> Self {
        Self {
            staleness_window: Duration::from_secs(300),
            sweep_period: Duration::from_secs(60),
        }
    }
}

/// Periodic sweep demoting silent online devices to offline.
///
/// Reads the store directly rather than the cache, marks the whole stale set
/// offline in one batched write, then invalidates each device's cache entry
/// and notifies subscribers through the coordinator's fan-out path. The
/// reverse transition, offline to online, only ever happens through an
/// accepted update inside the coordinator.
pub struct LivenessMonitor {
    devices: Arc<dyn DeviceRepository>,
    cache: Arc<dyn DeviceStateCache>,
    coordinator: Arc<SyncCoordinator>,
    config: LivenessMonitorConfig,
}

impl LivenessMonitor {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        cache: Arc<dyn DeviceStateCache>,
        coordinator: Arc<SyncCoordinator>,
        config: LivenessMonitorConfig,
    ) -> Self {
        Self {
            devices,
            cache,
            coordinator,
            config,
        }
    }

    /// Run sweeps on a fixed period until cancelled. A failed sweep is logged
    /// and retried on the next scheduled tick.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            window_secs = self.config.staleness_window.as_secs(),
            period_secs = self.config.sweep_period.as_secs(),
            "liveness monitor started"
        );

        let mut ticker = tokio::time::interval(self.config.sweep_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("liveness monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => debug!("liveness sweep found no stale devices"),
                        Ok(count) => info!(count, "liveness sweep marked devices offline"),
                        Err(e) => error!(error = %e, "liveness sweep failed, retrying next cycle"),
                    }
                }
            }
        }
    }

    /// One sweep cycle. Returns how many devices were transitioned.
    pub async fn sweep(&self) -> SyncResult<usize> {
        let window = chrono::Duration::seconds(self.config.staleness_window.as_secs() as i64);
        let cutoff = Utc::now() - window;

        let stale = self.devices.list_stale_online(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = stale.iter().map(|device| device.id).collect();
        // If this batched write fails the whole cycle aborts; the next tick
        // will pick the same devices up again.
        self.devices.set_offline(&ids).await?;

        for device in &stale {
            if let Err(e) = self.cache.invalidate(device.id).await {
                warn!(device_id = device.id, error = %e, "failed to invalidate cache after offline transition");
            }
            let warnings = self.coordinator.fan_out_offline(device).await;
            if !warnings.is_empty() {
                debug!(
                    device_id = device.id,
                    warnings = warnings.len(),
                    "offline notification incomplete"
                );
            }
        }

        Ok(stale.len())
    }
}
