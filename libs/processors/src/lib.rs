//! Pluggable message processors.
//!
//! Each processor is a pure transform from a raw store record to the
//! normalized view model. Malformed or unexpected payloads produce a
//! structured [`RejectedMessage`](types::RejectedMessage), never a panic and
//! never an error that escalates past the single record. Processors perform
//! no I/O.
//!
//! The [`ProcessorRegistry`] maps processor ids to instances and resolves a
//! designated default; it is built once at startup and immutable afterward.

pub mod builtin;
pub mod registry;

use types::{NormalizedMessage, RawMessage, RejectedMessage};

pub use builtin::{NotificationProcessor, RawJsonProcessor, SmsProcessor};
pub use registry::{ProcessorDescriptor, ProcessorRegistry, RegistryError};

/// A pure transform from a raw device payload to a normalized message.
///
/// Implementations must be total over their declared input shape: anything
/// unexpected yields a rejection carrying the original payload and a reason.
pub trait MessageProcessor: Send + Sync {
    /// Unique processor identifier (e.g. `"sms"`).
    fn id(&self) -> &'static str;

    /// Human-readable label for UI metadata.
    fn label(&self) -> &'static str;

    /// Transform one raw record. Same input always yields the same output.
    fn process(&self, raw: &RawMessage) -> Result<NormalizedMessage, RejectedMessage>;
}
