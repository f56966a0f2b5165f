mod client;
mod device_state_cache;

pub use client::{RedisClient, RedisConfig};
pub use device_state_cache::RedisDeviceStateCache;
