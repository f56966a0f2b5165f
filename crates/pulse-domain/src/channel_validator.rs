use std::collections::HashMap;

use crate::error::ValidationError;
use crate::types::{ChannelDefinition, ChannelType, ChannelValue, ChannelWrite};

/// Validate a proposed batch of channel writes against a template's channel
/// definitions.
///
/// All-or-nothing: the whole batch is checked before any persistence is
/// attempted, and the first failing entry rejects the entire set. Unknown
/// channel names are rejected on every ingress path.
pub fn validate_channels(
    definitions: &[ChannelDefinition],
    proposed: &[ChannelWrite],
) -> Result<(), ValidationError> {
    let by_name: HashMap<&str, &ChannelDefinition> = definitions
        .iter()
        .map(|definition| (definition.name.as_str(), definition))
        .collect();

    for write in proposed {
        let definition = by_name.get(write.name.as_str()).ok_or_else(|| {
            ValidationError::UnknownChannel {
                name: write.name.clone(),
            }
        })?;

        match definition.channel_type {
            ChannelType::Select => {
                let allowed = definition
                    .options
                    .iter()
                    .any(|option| option.value == write.value);
                if !allowed {
                    return Err(ValidationError::InvalidOption {
                        name: write.name.clone(),
                        value: write.value.clone(),
                    });
                }
            }
            ChannelType::Boolean => {
                if !matches!(write.value, ChannelValue::Boolean(_)) {
                    return Err(type_mismatch(write, ChannelType::Boolean));
                }
            }
            ChannelType::Number => {
                if !matches!(write.value, ChannelValue::Number(_)) {
                    return Err(type_mismatch(write, ChannelType::Number));
                }
            }
            ChannelType::String => {
                if !matches!(write.value, ChannelValue::String(_)) {
                    return Err(type_mismatch(write, ChannelType::String));
                }
            }
            // Object channels accept any structured value.
            ChannelType::Object => {}
        }
    }

    Ok(())
}

fn type_mismatch(write: &ChannelWrite, expected: ChannelType) -> ValidationError {
    ValidationError::TypeMismatch {
        name: write.name.clone(),
        expected,
        value: write.value.clone(),
    }
}
