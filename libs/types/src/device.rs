//! Device identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a device identifier fails validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid device id: {reason}")]
pub struct InvalidDeviceId {
    pub reason: String,
}

/// Opaque, stable identifier for a physical field device.
///
/// Serves as both the subscription key on the read side and the command-path
/// key on the write side. Never empty, and unchanged for the lifetime of a
/// sync session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidDeviceId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InvalidDeviceId {
                reason: "device id must be non-empty".to_string(),
            });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_device_id() {
        let id = DeviceId::new("field-unit-042").unwrap();
        assert_eq!(id.as_str(), "field-unit-042");
        assert_eq!(id.to_string(), "field-unit-042");
    }

    #[test]
    fn test_empty_device_id_rejected() {
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("   ").is_err());
    }
}
