//! Built-in processors for the payload shapes the device firmware reports.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use types::{MessageKind, NormalizedMessage, RawMessage, RejectedMessage};

use crate::MessageProcessor;

/// Parse an epoch-milliseconds timestamp field.
///
/// The firmware reports timestamps either as a JSON integer or as a decimal
/// string, depending on report version.
fn timestamp_ms(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Utc.timestamp_millis_opt(millis).single()
}

/// Processor for SMS-class reports: `body`, `timestamp`, optional
/// `phone`/`sender`.
#[derive(Debug, Default)]
pub struct SmsProcessor;

impl MessageProcessor for SmsProcessor {
    fn id(&self) -> &'static str {
        "sms"
    }

    fn label(&self) -> &'static str {
        "SMS"
    }

    fn process(&self, raw: &RawMessage) -> Result<NormalizedMessage, RejectedMessage> {
        let body = match raw.str_field("body") {
            Some(body) => body.to_string(),
            None => return Err(RejectedMessage::new(raw.clone(), "missing 'body' field")),
        };

        let timestamp = match raw.field("timestamp").and_then(timestamp_ms) {
            Some(ts) => ts,
            None => {
                return Err(RejectedMessage::new(
                    raw.clone(),
                    "missing or unparseable 'timestamp' field",
                ))
            }
        };

        let sender = raw
            .str_field("phone")
            .or_else(|| raw.str_field("sender"))
            .map(str::to_string);

        Ok(NormalizedMessage {
            timestamp,
            kind: MessageKind::Sms,
            sender,
            body,
            source_key: raw.key.clone(),
        })
    }
}

/// Processor for notification-class reports: `text`, `timestamp`, optional
/// `title` folded into the body.
#[derive(Debug, Default)]
pub struct NotificationProcessor;

impl MessageProcessor for NotificationProcessor {
    fn id(&self) -> &'static str {
        "notification"
    }

    fn label(&self) -> &'static str {
        "Notifications"
    }

    fn process(&self, raw: &RawMessage) -> Result<NormalizedMessage, RejectedMessage> {
        let text = match raw.str_field("text") {
            Some(text) => text,
            None => return Err(RejectedMessage::new(raw.clone(), "missing 'text' field")),
        };

        let timestamp = match raw.field("timestamp").and_then(timestamp_ms) {
            Some(ts) => ts,
            None => {
                return Err(RejectedMessage::new(
                    raw.clone(),
                    "missing or unparseable 'timestamp' field",
                ))
            }
        };

        let body = match raw.str_field("title") {
            Some(title) if !title.is_empty() => format!("{}: {}", title, text),
            _ => text.to_string(),
        };

        Ok(NormalizedMessage {
            timestamp,
            kind: MessageKind::Notification,
            sender: raw.str_field("package_name").map(str::to_string),
            body,
            source_key: raw.key.clone(),
        })
    }
}

/// Diagnostic processor that renders the raw field map as compact JSON.
///
/// Total over every input shape: it never rejects, so any record the other
/// processors cannot make sense of is still inspectable.
#[derive(Debug, Default)]
pub struct RawJsonProcessor;

impl MessageProcessor for RawJsonProcessor {
    fn id(&self) -> &'static str {
        "raw-json"
    }

    fn label(&self) -> &'static str {
        "Raw JSON"
    }

    fn process(&self, raw: &RawMessage) -> Result<NormalizedMessage, RejectedMessage> {
        let timestamp = raw
            .field("timestamp")
            .and_then(timestamp_ms)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        Ok(NormalizedMessage {
            timestamp,
            kind: MessageKind::Unknown,
            sender: None,
            body: Value::Object(raw.fields.clone()).to_string(),
            source_key: raw.key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn raw(key: &str, fields: &[(&str, Value)]) -> RawMessage {
        let mut map = Map::new();
        for (name, value) in fields {
            map.insert(name.to_string(), value.clone());
        }
        RawMessage::new(key, map)
    }

    #[test]
    fn test_sms_processor_normalizes_complete_payload() {
        let record = raw(
            "0000000001",
            &[
                ("body", json!("low battery")),
                ("phone", json!("+15550001111")),
                ("timestamp", json!(1_700_000_000_000_i64)),
            ],
        );

        let msg = SmsProcessor.process(&record).unwrap();
        assert_eq!(msg.kind, MessageKind::Sms);
        assert_eq!(msg.body, "low battery");
        assert_eq!(msg.sender.as_deref(), Some("+15550001111"));
        assert_eq!(msg.source_key, "0000000001");
        assert_eq!(msg.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_sms_processor_accepts_string_timestamp() {
        let record = raw(
            "k1",
            &[
                ("body", json!("ping")),
                ("timestamp", json!("1700000000000")),
            ],
        );
        let msg = SmsProcessor.process(&record).unwrap();
        assert_eq!(msg.timestamp.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(msg.sender, None);
    }

    #[test]
    fn test_sms_processor_rejects_missing_fields_without_panicking() {
        let record = raw("k2", &[("phone", json!("+15550001111"))]);
        let rejection = SmsProcessor.process(&record).unwrap_err();
        assert_eq!(rejection.raw, record);
        assert!(rejection.reason.contains("body"));

        let record = raw("k3", &[("body", json!("x")), ("timestamp", json!(true))]);
        let rejection = SmsProcessor.process(&record).unwrap_err();
        assert!(rejection.reason.contains("timestamp"));
    }

    #[test]
    fn test_sms_processor_is_deterministic() {
        let record = raw(
            "k4",
            &[("body", json!("same")), ("timestamp", json!(1000))],
        );
        assert_eq!(
            SmsProcessor.process(&record).unwrap(),
            SmsProcessor.process(&record).unwrap()
        );
    }

    #[test]
    fn test_notification_processor_folds_title_into_body() {
        let record = raw(
            "k5",
            &[
                ("title", json!("Mail")),
                ("text", json!("3 new messages")),
                ("package_name", json!("com.example.mail")),
                ("timestamp", json!(1_700_000_000_000_i64)),
            ],
        );
        let msg = NotificationProcessor.process(&record).unwrap();
        assert_eq!(msg.kind, MessageKind::Notification);
        assert_eq!(msg.body, "Mail: 3 new messages");
        assert_eq!(msg.sender.as_deref(), Some("com.example.mail"));
    }

    #[test]
    fn test_notification_processor_rejects_missing_text() {
        let record = raw("k6", &[("timestamp", json!(1000))]);
        let rejection = NotificationProcessor.process(&record).unwrap_err();
        assert!(rejection.reason.contains("text"));
        assert_eq!(rejection.raw.key, "k6");
    }

    #[test]
    fn test_raw_json_processor_is_total() {
        let record = raw("k7", &[("unexpected", json!({"nested": [1, 2]}))]);
        let msg = RawJsonProcessor.process(&record).unwrap();
        assert_eq!(msg.kind, MessageKind::Unknown);
        assert!(msg.body.contains("unexpected"));
        assert_eq!(msg.timestamp, DateTime::<Utc>::UNIX_EPOCH);

        let empty = raw("k8", &[]);
        assert!(RawJsonProcessor.process(&empty).is_ok());
    }
}
