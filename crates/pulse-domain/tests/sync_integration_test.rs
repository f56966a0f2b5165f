use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pulse_domain::{
    CachedDeviceState, Channel, ChannelDefinition, ChannelType, ChannelValue, ChannelWrite,
    Device, DeviceRole, DeviceStateCache, DeviceStatus, DeviceUpdate, LivenessMonitor,
    LivenessMonitorConfig, Position, SelectOption, SyncCoordinator, SyncCoordinatorConfig,
    SyncError, Template,
};

mod fakes {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use pulse_domain::repository::{
        BrokerPublisher, ChannelRepository, DeviceRepository, DeviceStateCache,
        SessionBroadcaster, TemplateCatalog,
    };
    use pulse_domain::{DeviceSnapshot, DeviceStateUpdate, SyncResult};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryDeviceRepository {
        devices: Mutex<HashMap<i64, Device>>,
    }

    impl InMemoryDeviceRepository {
        pub fn with_device(device: Device) -> Self {
            let repo = Self::default();
            repo.devices.lock().unwrap().insert(device.id, device);
            repo
        }

        pub fn device(&self, id: i64) -> Option<Device> {
            self.devices.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl DeviceRepository for InMemoryDeviceRepository {
        async fn get_device(&self, device_id: i64) -> SyncResult<Option<Device>> {
            Ok(self.devices.lock().unwrap().get(&device_id).cloned())
        }

        async fn update_device_state(&self, update: DeviceStateUpdate) -> SyncResult<()> {
            let mut devices = self.devices.lock().unwrap();
            if let Some(device) = devices.get_mut(&update.device_id) {
                device.status = update.status;
                device.last_update_at = update.last_update_at;
                if let Some(position) = update.position {
                    device.position = Some(position);
                    device.position_updated_at = Some(update.last_update_at);
                }
            }
            Ok(())
        }

        async fn list_stale_online(&self, cutoff: DateTime<Utc>) -> SyncResult<Vec<Device>> {
            Ok(self
                .devices
                .lock()
                .unwrap()
                .values()
                .filter(|d| d.status == DeviceStatus::Online && d.last_update_at < cutoff)
                .cloned()
                .collect())
        }

        async fn set_offline(&self, device_ids: &[i64]) -> SyncResult<u64> {
            let mut devices = self.devices.lock().unwrap();
            let mut touched = 0;
            for id in device_ids {
                if let Some(device) = devices.get_mut(id) {
                    device.status = DeviceStatus::Offline;
                    touched += 1;
                }
            }
            Ok(touched)
        }
    }

    #[derive(Default)]
    pub struct InMemoryChannelRepository {
        channels: Mutex<HashMap<(i64, String), Channel>>,
    }

    impl InMemoryChannelRepository {
        pub fn value(&self, device_id: i64, name: &str) -> Option<ChannelValue> {
            self.channels
                .lock()
                .unwrap()
                .get(&(device_id, name.to_string()))
                .map(|c| c.value.clone())
        }

        pub fn count(&self, device_id: i64) -> usize {
            self.channels
                .lock()
                .unwrap()
                .keys()
                .filter(|(id, _)| *id == device_id)
                .count()
        }
    }

    #[async_trait]
    impl ChannelRepository for InMemoryChannelRepository {
        async fn get_device_channels(&self, device_id: i64) -> SyncResult<Vec<Channel>> {
            Ok(self
                .channels
                .lock()
                .unwrap()
                .values()
                .filter(|c| c.device_id == device_id)
                .cloned()
                .collect())
        }

        async fn get_channel(
            &self,
            device_id: i64,
            name: &str,
        ) -> SyncResult<Option<Channel>> {
            Ok(self
                .channels
                .lock()
                .unwrap()
                .get(&(device_id, name.to_string()))
                .cloned())
        }

        async fn bulk_upsert(
            &self,
            device_id: i64,
            writes: &[ChannelWrite],
        ) -> SyncResult<Vec<Channel>> {
            let now = Utc::now();
            let mut channels = self.channels.lock().unwrap();
            let mut result = Vec::with_capacity(writes.len());
            for write in writes {
                let key = (device_id, write.name.clone());
                let channel = channels
                    .entry(key)
                    .and_modify(|c| {
                        c.value = write.value.clone();
                        c.updated_at = now;
                    })
                    .or_insert_with(|| Channel {
                        device_id,
                        name: write.name.clone(),
                        value: write.value.clone(),
                        created_at: now,
                        updated_at: now,
                    });
                result.push(channel.clone());
            }
            Ok(result)
        }

        async fn seed_defaults(
            &self,
            device_id: i64,
            definitions: &[ChannelDefinition],
        ) -> SyncResult<Vec<Channel>> {
            let now = Utc::now();
            let mut channels = self.channels.lock().unwrap();
            let mut result = Vec::new();
            for definition in definitions {
                let key = (device_id, definition.name.clone());
                let channel = channels.entry(key).or_insert_with(|| Channel {
                    device_id,
                    name: definition.name.clone(),
                    value: ChannelValue::default_for(definition.channel_type),
                    created_at: now,
                    updated_at: now,
                });
                result.push(channel.clone());
            }
            Ok(result)
        }
    }

    #[derive(Default)]
    pub struct InMemoryCache {
        entries: Mutex<HashMap<i64, CachedDeviceState>>,
    }

    impl InMemoryCache {
        pub fn contains(&self, device_id: i64) -> bool {
            self.entries.lock().unwrap().contains_key(&device_id)
        }
    }

    #[async_trait]
    impl DeviceStateCache for InMemoryCache {
        async fn get(&self, device_id: i64) -> SyncResult<Option<CachedDeviceState>> {
            Ok(self.entries.lock().unwrap().get(&device_id).cloned())
        }

        async fn put(
            &self,
            device_id: i64,
            state: &CachedDeviceState,
            _ttl: Duration,
        ) -> SyncResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(device_id, state.clone());
            Ok(())
        }

        async fn invalidate(&self, device_id: i64) -> SyncResult<()> {
            self.entries.lock().unwrap().remove(&device_id);
            Ok(())
        }
    }

    pub struct StaticCatalog {
        pub template: Template,
    }

    #[async_trait]
    impl TemplateCatalog for StaticCatalog {
        async fn resolve(&self, template_id: &str) -> SyncResult<Option<Template>> {
            Ok((template_id == self.template.id).then(|| self.template.clone()))
        }
    }

    #[derive(Default)]
    pub struct RecordingBroker {
        pub published: Mutex<Vec<(i64, Vec<ChannelWrite>)>>,
    }

    #[async_trait]
    impl BrokerPublisher for RecordingBroker {
        async fn publish_channels(
            &self,
            device_id: i64,
            channels: &[ChannelWrite],
        ) -> anyhow::Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((device_id, channels.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingSessions {
        pub broadcasts: Mutex<Vec<(i64, DeviceSnapshot)>>,
    }

    impl RecordingSessions {
        pub fn last_status(&self, device_id: i64) -> Option<DeviceStatus> {
            self.broadcasts
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(id, _)| *id == device_id)
                .map(|(_, snapshot)| snapshot.status)
        }
    }

    #[async_trait]
    impl SessionBroadcaster for RecordingSessions {
        async fn broadcast_state(
            &self,
            device_id: i64,
            snapshot: &DeviceSnapshot,
        ) -> anyhow::Result<()> {
            self.broadcasts
                .lock()
                .unwrap()
                .push((device_id, snapshot.clone()));
            Ok(())
        }
    }
}

use fakes::*;

fn test_template() -> Template {
    Template {
        id: "template-1".to_string(),
        channels: vec![
            ChannelDefinition {
                name: "led".to_string(),
                channel_type: ChannelType::Boolean,
                options: Vec::new(),
            },
            ChannelDefinition {
                name: "temp".to_string(),
                channel_type: ChannelType::Number,
                options: Vec::new(),
            },
            ChannelDefinition {
                name: "mode".to_string(),
                channel_type: ChannelType::Select,
                options: vec![
                    SelectOption {
                        label: None,
                        value: ChannelValue::String("auto".to_string()),
                    },
                    SelectOption {
                        label: None,
                        value: ChannelValue::String("manual".to_string()),
                    },
                ],
            },
            ChannelDefinition {
                name: "sensor-0".to_string(),
                channel_type: ChannelType::Number,
                options: Vec::new(),
            },
            ChannelDefinition {
                name: "sensor-1".to_string(),
                channel_type: ChannelType::Number,
                options: Vec::new(),
            },
            ChannelDefinition {
                name: "sensor-2".to_string(),
                channel_type: ChannelType::Number,
                options: Vec::new(),
            },
            ChannelDefinition {
                name: "sensor-3".to_string(),
                channel_type: ChannelType::Number,
                options: Vec::new(),
            },
        ],
    }
}

fn test_device(id: i64, status: DeviceStatus) -> Device {
    let now = Utc::now();
    Device {
        id,
        name: format!("device-{id}"),
        status,
        last_update_at: now,
        position: None,
        position_updated_at: None,
        owner_id: 1,
        template_id: Some("template-1".to_string()),
        role: DeviceRole::Device,
        created_at: now,
        updated_at: now,
    }
}

struct Harness {
    devices: Arc<InMemoryDeviceRepository>,
    channels: Arc<InMemoryChannelRepository>,
    cache: Arc<InMemoryCache>,
    broker: Arc<RecordingBroker>,
    sessions: Arc<RecordingSessions>,
    coordinator: Arc<SyncCoordinator>,
}

fn harness(device: Device) -> Harness {
    let devices = Arc::new(InMemoryDeviceRepository::with_device(device));
    let channels = Arc::new(InMemoryChannelRepository::default());
    let cache = Arc::new(InMemoryCache::default());
    let broker = Arc::new(RecordingBroker::default());
    let sessions = Arc::new(RecordingSessions::default());

    let coordinator = Arc::new(SyncCoordinator::new(
        devices.clone(),
        channels.clone(),
        Arc::new(StaticCatalog {
            template: test_template(),
        }),
        cache.clone(),
        broker.clone(),
        sessions.clone(),
        SyncCoordinatorConfig::default(),
    ));

    Harness {
        devices,
        channels,
        cache,
        broker,
        sessions,
        coordinator,
    }
}

fn writes(pairs: &[(&str, ChannelValue)]) -> Vec<ChannelWrite> {
    pairs
        .iter()
        .map(|(name, value)| ChannelWrite {
            name: name.to_string(),
            value: value.clone(),
        })
        .collect()
}

#[tokio::test]
async fn apply_is_coherent_across_store_cache_and_sinks() {
    let h = harness(test_device(42, DeviceStatus::Offline));

    let outcome = h
        .coordinator
        .apply(
            42,
            DeviceUpdate {
                channels: writes(&[("led", ChannelValue::Boolean(true))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(outcome.warnings.is_empty());

    // Store holds the value, the device row went online.
    assert_eq!(
        h.channels.value(42, "led"),
        Some(ChannelValue::Boolean(true))
    );
    assert_eq!(h.devices.device(42).unwrap().status, DeviceStatus::Online);

    // Cache hit path sees the write.
    let state = h.coordinator.get_state(42).await.unwrap();
    assert_eq!(state.channels.len(), 1);
    assert_eq!(state.channels[0].value, ChannelValue::Boolean(true));

    // Cache miss path recomputes the same answer from the store.
    h.cache.invalidate(42).await.unwrap();
    let state = h.coordinator.get_state(42).await.unwrap();
    assert_eq!(state.channels[0].value, ChannelValue::Boolean(true));

    // Both sinks heard about it.
    assert_eq!(h.broker.published.lock().unwrap().len(), 1);
    assert_eq!(h.sessions.last_status(42), Some(DeviceStatus::Online));
}

#[tokio::test]
async fn rejected_batch_leaves_previous_values_visible() {
    let h = harness(test_device(42, DeviceStatus::Offline));

    h.coordinator
        .apply(
            42,
            DeviceUpdate {
                channels: writes(&[("led", ChannelValue::Boolean(true))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Bad batch: one valid entry, one type mismatch. Nothing may land.
    let err = h
        .coordinator
        .apply(
            42,
            DeviceUpdate {
                channels: writes(&[
                    ("temp", ChannelValue::Number(21.5)),
                    ("led", ChannelValue::String("on".to_string())),
                ]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    assert_eq!(h.channels.count(42), 1);
    assert_eq!(
        h.channels.value(42, "led"),
        Some(ChannelValue::Boolean(true))
    );

    let state = h.coordinator.get_state(42).await.unwrap();
    assert_eq!(state.channels.len(), 1);
    assert_eq!(state.channels[0].value, ChannelValue::Boolean(true));
}

#[tokio::test]
async fn select_rejects_unlisted_option() {
    let h = harness(test_device(42, DeviceStatus::Online));

    let err = h
        .coordinator
        .apply(
            42,
            DeviceUpdate {
                channels: writes(&[("mode", ChannelValue::String("turbo".to_string()))]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));

    assert!(h
        .coordinator
        .apply(
            42,
            DeviceUpdate {
                channels: writes(&[("mode", ChannelValue::String("manual".to_string()))]),
                ..Default::default()
            },
        )
        .await
        .is_ok());
}

#[tokio::test]
async fn apply_is_idempotent_on_values() {
    let h = harness(test_device(42, DeviceStatus::Offline));

    let update = DeviceUpdate {
        channels: writes(&[("temp", ChannelValue::Number(21.5))]),
        ..Default::default()
    };

    h.coordinator.apply(42, update.clone()).await.unwrap();
    let first_update_at = h.devices.device(42).unwrap().last_update_at;

    h.coordinator.apply(42, update).await.unwrap();

    assert_eq!(h.channels.count(42), 1);
    assert_eq!(
        h.channels.value(42, "temp"),
        Some(ChannelValue::Number(21.5))
    );
    assert!(h.devices.device(42).unwrap().last_update_at >= first_update_at);
}

#[tokio::test]
async fn concurrent_disjoint_applies_lose_no_writes() {
    let h = harness(test_device(42, DeviceStatus::Online));

    let mut handles = Vec::new();
    for i in 0..4 {
        let coordinator = h.coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .apply(
                    42,
                    DeviceUpdate {
                        channels: vec![ChannelWrite {
                            name: format!("sensor-{i}"),
                            value: ChannelValue::Number(i as f64),
                        }],
                        ..Default::default()
                    },
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // The final materialized state contains the union of all writes, both in
    // the store and through the cache.
    assert_eq!(h.channels.count(42), 4);
    let state = h.coordinator.get_state(42).await.unwrap();
    assert_eq!(state.channels.len(), 4);
    for i in 0..4 {
        assert_eq!(
            h.channels.value(42, &format!("sensor-{i}")),
            Some(ChannelValue::Number(i as f64))
        );
    }
}

#[tokio::test]
async fn stale_device_goes_offline_and_comes_back_on_update() {
    let mut device = test_device(7, DeviceStatus::Online);
    device.last_update_at = Utc::now() - chrono::Duration::minutes(10);
    let h = harness(device);

    let monitor = LivenessMonitor::new(
        h.devices.clone(),
        h.cache.clone(),
        h.coordinator.clone(),
        LivenessMonitorConfig {
            staleness_window: Duration::from_secs(300),
            sweep_period: Duration::from_secs(60),
        },
    );

    assert_eq!(monitor.sweep().await.unwrap(), 1);
    assert_eq!(h.devices.device(7).unwrap().status, DeviceStatus::Offline);
    assert!(!h.cache.contains(7));
    assert_eq!(h.sessions.last_status(7), Some(DeviceStatus::Offline));

    // A second sweep finds nothing: the transition is one-way.
    assert_eq!(monitor.sweep().await.unwrap(), 0);

    // The next telemetry sample brings the device back online.
    h.coordinator
        .apply(
            7,
            DeviceUpdate {
                channels: writes(&[("temp", ChannelValue::Number(21.5))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(h.devices.device(7).unwrap().status, DeviceStatus::Online);
    assert_eq!(h.sessions.last_status(7), Some(DeviceStatus::Online));
}

#[tokio::test]
async fn position_update_is_tracked() {
    let h = harness(test_device(42, DeviceStatus::Online));

    h.coordinator
        .apply(
            42,
            DeviceUpdate {
                position: Some(Position {
                    latitude: 52.52,
                    longitude: 13.405,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let device = h.devices.device(42).unwrap();
    let position = device.position.unwrap();
    assert_eq!(position.latitude, 52.52);
    assert!(device.position_updated_at.is_some());
}

#[tokio::test]
async fn provisioning_seeds_template_defaults_once() {
    let h = harness(test_device(42, DeviceStatus::Offline));

    let seeded = h.coordinator.provision_channels(42).await.unwrap();
    assert_eq!(seeded.len(), test_template().channels.len());
    assert_eq!(
        h.channels.value(42, "led"),
        Some(ChannelValue::Boolean(false))
    );

    // Re-provisioning does not clobber values written since.
    h.coordinator
        .apply(
            42,
            DeviceUpdate {
                channels: writes(&[("led", ChannelValue::Boolean(true))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.coordinator.provision_channels(42).await.unwrap();
    assert_eq!(
        h.channels.value(42, "led"),
        Some(ChannelValue::Boolean(true))
    );
}
