pub mod cached_state;
pub mod channel_validator;
pub mod device_lock;
pub mod error;
pub mod liveness_monitor;
pub mod repository;
pub mod sync_coordinator;
pub mod template_catalog;
pub mod types;

pub use cached_state::{CachedDeviceState, DeviceSnapshot};
pub use channel_validator::validate_channels;
pub use device_lock::DeviceLockRegistry;
pub use error::{FanoutSink, FanoutWarning, SyncError, SyncResult, ValidationError};
pub use liveness_monitor::{LivenessMonitor, LivenessMonitorConfig};
pub use repository::{
    BrokerPublisher, ChannelRepository, DeviceRepository, DeviceStateCache, SessionBroadcaster,
    TemplateCatalog,
};
pub use sync_coordinator::{ApplyOutcome, SyncCoordinator, SyncCoordinatorConfig};
pub use template_catalog::CachingTemplateCatalog;
pub use types::{
    Channel, ChannelDefinition, ChannelType, ChannelValue, ChannelWrite, Device,
    DeviceRole, DeviceStateUpdate, DeviceStatus, DeviceUpdate, Position, SelectOption, Template,
};
