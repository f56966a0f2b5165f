use thiserror::Error;

use crate::types::{ChannelType, ChannelValue};

/// Per-entry validation failure. The whole batch is rejected on the first one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("channel {name} not found in template")]
    UnknownChannel { name: String },

    #[error("channel {name} value {value} not found in template options")]
    InvalidOption { name: String, value: ChannelValue },

    #[error("channel {name} value {value} is not a {expected}")]
    TypeMismatch {
        name: String,
        expected: ChannelType,
        value: ChannelValue,
    },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("device not found: {0}")]
    DeviceNotFound(i64),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("deadline of {0:?} exceeded before the update was applied")]
    Timeout(std::time::Duration),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// The fan-out sink that failed to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutSink {
    Broker,
    Session,
}

impl std::fmt::Display for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanoutSink::Broker => write!(f, "broker"),
            FanoutSink::Session => write!(f, "session"),
        }
    }
}

/// Non-fatal fan-out failure attached to an otherwise successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutWarning {
    pub sink: FanoutSink,
    pub error: String,
}
