//! Unified type system for FieldOps device telemetry.
//!
//! Every service speaks in terms of these types: raw records as delivered by
//! the remote store, the normalized view model produced by message
//! processors, and the connection-state signal surfaced to consumers.

pub mod connection;
pub mod device;
pub mod message;

pub use connection::ConnectionState;
pub use device::{DeviceId, InvalidDeviceId};
pub use message::{
    MessageKind, MessageTab, NormalizedMessage, ProcessedEntry, RawMessage, RejectedMessage,
};
