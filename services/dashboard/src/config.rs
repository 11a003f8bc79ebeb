//! Dashboard service configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use types::MessageTab;

use crate::error::{DashboardError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Root path of the device area in the remote store.
    pub store_root: String,

    /// Default bound on the per-session message buffer.
    pub data_limit: usize,

    /// Processor id pages resolve when the operator has not picked one.
    /// `None` falls through to the registry's own default.
    pub default_processor: Option<String>,

    /// Channel a device page opens on.
    pub default_tab: MessageTab,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            store_root: "devices".to_string(),
            data_limit: 100,
            default_processor: None,
            default_tab: MessageTab::Sms,
        }
    }
}

impl DashboardConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_root.trim().is_empty() {
            return Err(DashboardError::configuration("store_root must be non-empty"));
        }
        if self.data_limit == 0 {
            return Err(DashboardError::configuration("data_limit must be positive"));
        }
        Ok(())
    }
}
