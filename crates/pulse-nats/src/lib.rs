mod broker_publisher;
mod client;
mod session_broadcaster;
mod update_consumer;

pub use broker_publisher::NatsBrokerPublisher;
pub use client::NatsClient;
pub use session_broadcaster::NatsSessionBroadcaster;
pub use update_consumer::DeviceUpdateConsumer;
