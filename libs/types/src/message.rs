//! Raw and normalized message records.
//!
//! A `RawMessage` is the payload exactly as the remote store delivered it: a
//! store push key plus an unordered field map whose shape depends on which
//! firmware report produced it. A `NormalizedMessage` is the canonical,
//! UI-ready record a processor derives from exactly one raw message. The
//! normalized buffer stays index-aligned with the raw buffer by holding a
//! `RejectedMessage` in place wherever normalization failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-device channel discriminator selecting which sub-stream to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTab {
    Sms,
    Notifications,
}

impl MessageTab {
    /// Store path segment for this channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTab::Sms => "sms",
            MessageTab::Notifications => "notifications",
        }
    }
}

impl std::fmt::Display for MessageTab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw record exactly as delivered by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Store push key. Lexicographic key order is the store's insertion
    /// order; merge and eviction key off it, never off arrival wall-clock.
    pub key: String,

    /// Unordered payload fields; shape depends on the producing firmware.
    pub fields: Map<String, Value>,
}

impl RawMessage {
    pub fn new(key: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }

    /// Look up a payload field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field as a string slice, if present and string-typed.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }
}

/// Normalized message-kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Sms,
    Notification,
    Unknown,
}

/// Canonical record produced by exactly one processor from exactly one raw
/// message. Normalization is pure: same raw message and processor always
/// yield the same normalized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMessage {
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub sender: Option<String>,
    pub body: String,

    /// Store key of the raw message this record was normalized from.
    pub source_key: String,
}

/// A raw record that failed to normalize.
///
/// Held in place of a normalized entry so the surrounding buffer stays
/// consistent and index-aligned with the raw buffer. Never a session-level
/// error, and never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedMessage {
    pub raw: RawMessage,
    pub reason: String,
}

impl RejectedMessage {
    pub fn new(raw: RawMessage, reason: impl Into<String>) -> Self {
        Self {
            raw,
            reason: reason.into(),
        }
    }
}

/// One slot of the normalized buffer, index-aligned with the raw buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessedEntry {
    Normalized(NormalizedMessage),
    Rejected(RejectedMessage),
}

impl ProcessedEntry {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ProcessedEntry::Rejected(_))
    }

    /// Store key of the originating raw message.
    pub fn source_key(&self) -> &str {
        match self {
            ProcessedEntry::Normalized(msg) => &msg.source_key,
            ProcessedEntry::Rejected(rej) => &rej.raw.key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_raw() -> RawMessage {
        let mut fields = Map::new();
        fields.insert("body".to_string(), json!("hello"));
        fields.insert("phone".to_string(), json!("+15550001111"));
        RawMessage::new("0000000001", fields)
    }

    #[test]
    fn test_field_lookup() {
        let raw = sample_raw();
        assert_eq!(raw.str_field("body"), Some("hello"));
        assert_eq!(raw.str_field("missing"), None);
        assert!(raw.field("phone").is_some());
    }

    #[test]
    fn test_tab_path_segment() {
        assert_eq!(MessageTab::Sms.as_str(), "sms");
        assert_eq!(MessageTab::Notifications.as_str(), "notifications");
    }

    #[test]
    fn test_processed_entry_source_key() {
        let raw = sample_raw();
        let rejected = ProcessedEntry::Rejected(RejectedMessage::new(raw.clone(), "bad shape"));
        assert!(rejected.is_rejected());
        assert_eq!(rejected.source_key(), raw.key);

        let normalized = ProcessedEntry::Normalized(NormalizedMessage {
            timestamp: Utc::now(),
            kind: MessageKind::Sms,
            sender: None,
            body: "hello".to_string(),
            source_key: raw.key.clone(),
        });
        assert!(!normalized.is_rejected());
        assert_eq!(normalized.source_key(), raw.key);
    }
}
