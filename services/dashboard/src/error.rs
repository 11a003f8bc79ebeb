//! Error types for the dashboard service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("processor registry error: {0}")]
    Registry(#[from] processors::RegistryError),

    #[error("invalid device id: {0}")]
    Device(#[from] types::InvalidDeviceId),

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl DashboardError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DashboardError::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
