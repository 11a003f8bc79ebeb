//! FieldOps dashboard core.
//!
//! Device telemetry synchronization and command dispatch for the operations
//! dashboard: live bounded sync sessions over the remote device store,
//! pluggable payload normalization, validated command writes, route-level
//! fault containment, and the access gate for privileged pages. The
//! presentation layer and the store transport are external collaborators.

pub mod access;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fault;
pub mod sync;

pub use access::{AccessGate, GateDecision, Session, SessionProvider};
pub use config::DashboardConfig;
pub use dispatch::{CommandDispatcher, CommandValue, DispatchError};
pub use error::{DashboardError, Result};
pub use fault::{BoundaryState, RouteFaultBoundary, RouteTable, TracingFaultSink};
pub use sync::{DeviceMessageSync, SyncConfig, SyncSnapshot};
