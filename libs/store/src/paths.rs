//! Store path construction.

use types::{DeviceId, MessageTab};

/// Path of a device's message channel: `{root}/{device}/messages/{tab}`.
pub fn message_path(root: &str, device: &DeviceId, tab: MessageTab) -> String {
    format!("{}/{}/messages/{}", root, device, tab.as_str())
}

/// Path of a device's command slot: `{root}/{device}/commands/{name}`.
pub fn command_path(root: &str, device: &DeviceId, command: &str) -> String {
    format!("{}/{}/commands/{}", root, device, command)
}
