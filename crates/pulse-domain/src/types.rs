use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness state of a device.
///
/// `Online` is only ever set by an accepted update; the liveness monitor is
/// the only path back to `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Admin,
    Device,
}

/// Geographic position reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Domain representation of a device row.
///
/// The engine only mutates `status`, `last_update_at` and `position`;
/// everything else is owned by the administrative CRUD surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub status: DeviceStatus,
    pub last_update_at: DateTime<Utc>,
    pub position: Option<Position>,
    pub position_updated_at: Option<DateTime<Utc>>,
    pub owner_id: i64,
    pub template_id: Option<String>,
    pub role: DeviceRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The closed set of channel value shapes a template may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Boolean,
    Number,
    String,
    Object,
    Select,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelType::Boolean => "boolean",
            ChannelType::Number => "number",
            ChannelType::String => "string",
            ChannelType::Object => "object",
            ChannelType::Select => "select",
        };
        write!(f, "{name}")
    }
}

/// A channel value as reported by a device or submitted by a caller.
///
/// The discriminant travels with the payload so the validator can match on it
/// exhaustively. Serde representation is untagged: a JSON `true` becomes
/// `Boolean`, a bare number `Number`, a bare string `String`, and anything
/// structured falls through to `Object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Object(serde_json::Value),
}

impl ChannelValue {
    /// Default value seeded when a device is provisioned against a template.
    pub fn default_for(channel_type: ChannelType) -> Self {
        match channel_type {
            ChannelType::Boolean => ChannelValue::Boolean(false),
            ChannelType::Number => ChannelValue::Number(0.0),
            ChannelType::String => ChannelValue::String(String::new()),
            ChannelType::Object => ChannelValue::Object(serde_json::Value::Object(
                serde_json::Map::new(),
            )),
            ChannelType::Select => ChannelValue::String(String::new()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ChannelValue::Boolean(_) => "boolean",
            ChannelValue::Number(_) => "number",
            ChannelValue::String(_) => "string",
            ChannelValue::Object(_) => "object",
        }
    }
}

impl std::fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelValue::Boolean(v) => write!(f, "{v}"),
            ChannelValue::Number(v) => write!(f, "{v}"),
            ChannelValue::String(v) => write!(f, "{v}"),
            ChannelValue::Object(v) => write!(f, "{v}"),
        }
    }
}

/// One selectable option on a `select` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: ChannelValue,
}

/// Schema entry for a single channel within a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

/// Resolved template: the ordered channel schema for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub channels: Vec<ChannelDefinition>,
}

/// Persisted channel row, unique per `(device_id, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub device_id: i64,
    pub name: String,
    pub value: ChannelValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A proposed `(name, value)` pair, not yet validated or persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelWrite {
    pub name: String,
    pub value: ChannelValue,
}

/// Inbound update for a single device, from any ingress path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    #[serde(default)]
    pub channels: Vec<ChannelWrite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl DeviceUpdate {
    /// Whether the update carries telemetry payload (channels or position).
    /// Such an update implies liveness when no explicit status is given.
    pub fn carries_payload(&self) -> bool {
        !self.channels.is_empty() || self.position.is_some()
    }
}

/// Device row mutation applied alongside a channel batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStateUpdate {
    pub device_id: i64,
    pub status: DeviceStatus,
    pub last_update_at: DateTime<Utc>,
    pub position: Option<Position>,
}
