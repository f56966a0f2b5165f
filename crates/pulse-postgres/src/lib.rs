mod channel_repository;
mod client;
mod config;
mod device_repository;
mod models;
mod template_repository;

pub use channel_repository::PostgresChannelRepository;
pub use client::PostgresClient;
pub use config::PostgresConfig;
pub use device_repository::PostgresDeviceRepository;
pub use template_repository::PostgresTemplateRepository;
