//! Operator command dispatch.
//!
//! Validates an outgoing command value against its declared constraint and
//! writes the wire representation to the device's command slot. Validation
//! failures never reach the store; a concurrent dispatch for the same
//! (device, command) pair is rejected with `Busy` and the caller retries.
//! The guard is scoped per pair, so commands to different devices or
//! different command names never contend.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use store::{DeviceStore, StoreError};
use thiserror::Error;
use tracing::{debug, warn};
use types::DeviceId;

/// Value supplied by the operator for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandValue {
    Int(i64),
    Text(String),
}

impl From<i64> for CommandValue {
    fn from(value: i64) -> Self {
        CommandValue::Int(value)
    }
}

impl From<&str> for CommandValue {
    fn from(value: &str) -> Self {
        CommandValue::Text(value.to_string())
    }
}

impl std::fmt::Display for CommandValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandValue::Int(n) => write!(f, "{}", n),
            CommandValue::Text(s) => f.write_str(s),
        }
    }
}

/// Declared constraint on one command's value.
#[derive(Debug, Clone)]
pub enum ValueConstraint {
    /// Integer interval, inclusive on both ends. Wire form: decimal string.
    IntRange { min: i64, max: i64 },
    /// Fixed set of accepted values. Wire form: the literal member.
    OneOf(&'static [&'static str]),
}

impl ValueConstraint {
    /// Validate a value and produce its wire representation.
    fn wire_value(&self, value: &CommandValue) -> std::result::Result<String, String> {
        match (self, value) {
            (ValueConstraint::IntRange { min, max }, CommandValue::Int(n)) => {
                if (*min..=*max).contains(n) {
                    Ok(n.to_string())
                } else {
                    Err(format!("{} is outside [{}, {}]", n, min, max))
                }
            }
            (ValueConstraint::IntRange { min, max }, CommandValue::Text(_)) => Err(format!(
                "expected an integer in [{}, {}]",
                min, max
            )),
            (ValueConstraint::OneOf(allowed), CommandValue::Text(s)) => {
                if allowed.contains(&s.as_str()) {
                    Ok(s.clone())
                } else {
                    Err(format!("'{}' is not one of {:?}", s, allowed))
                }
            }
            (ValueConstraint::OneOf(allowed), CommandValue::Int(_)) => {
                Err(format!("expected one of {:?}", allowed))
            }
        }
    }
}

/// One dispatchable command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub constraint: ValueConstraint,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid value for {command}: {reason}")]
    Validation {
        command: &'static str,
        reason: String,
    },

    /// A dispatch for the same (device, command) is already in flight.
    #[error("dispatch busy: {command} already in flight for {device}")]
    Busy {
        device: DeviceId,
        command: &'static str,
    },

    #[error("command transport failed: {0}")]
    Transport(#[from] StoreError),
}

impl DispatchError {
    /// Busy and transport failures are worth retrying; validation and
    /// unknown-command failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Busy { .. } | DispatchError::Transport(_)
        )
    }
}

pub type DispatchResult = std::result::Result<(), DispatchError>;

type InFlightKey = (DeviceId, &'static str);

/// Releases the in-flight claim when the dispatch resolves, success or not.
struct InFlightGuard {
    map: Arc<DashMap<InFlightKey, ()>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// Validates and transmits operator commands to devices.
///
/// Stateless between calls apart from the per-(device, command) in-flight
/// guard; a successful dispatch performs exactly one store write and retains
/// nothing about the outcome.
pub struct CommandDispatcher {
    store: Arc<dyn DeviceStore>,
    commands: HashMap<&'static str, CommandSpec>,
    in_flight: Arc<DashMap<InFlightKey, ()>>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn DeviceStore>, commands: Vec<CommandSpec>) -> Self {
        let commands = commands
            .into_iter()
            .map(|spec| (spec.name, spec))
            .collect();
        Self {
            store,
            commands,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Dispatcher with the standard device command surface.
    pub fn with_builtin(store: Arc<dyn DeviceStore>) -> Self {
        Self::new(
            store,
            vec![
                CommandSpec {
                    name: "setHeartbeatInterval",
                    constraint: ValueConstraint::IntRange { min: 10, max: 300 },
                },
                CommandSpec {
                    name: "setDataLimit",
                    constraint: ValueConstraint::IntRange { min: 1, max: 500 },
                },
                CommandSpec {
                    name: "ringDevice",
                    constraint: ValueConstraint::OneOf(&["on", "off"]),
                },
            ],
        )
    }

    /// Names of all dispatchable commands.
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Validate and transmit one command.
    pub async fn dispatch(
        &self,
        device: &DeviceId,
        command: &str,
        value: CommandValue,
    ) -> DispatchResult {
        let spec = self
            .commands
            .get(command)
            .ok_or_else(|| DispatchError::UnknownCommand(command.to_string()))?;

        let wire = spec
            .constraint
            .wire_value(&value)
            .map_err(|reason| {
                warn!(device = %device, command = spec.name, %reason, "command value rejected");
                DispatchError::Validation {
                    command: spec.name,
                    reason,
                }
            })?;

        let _guard = self.claim(device, spec.name)?;
        debug!(device = %device, command = spec.name, value = %wire, "dispatching command");
        self.store.write_command(device, spec.name, &wire).await?;
        Ok(())
    }

    fn claim(
        &self,
        device: &DeviceId,
        command: &'static str,
    ) -> std::result::Result<InFlightGuard, DispatchError> {
        use dashmap::mapref::entry::Entry;

        let key = (device.clone(), command);
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => Err(DispatchError::Busy {
                device: device.clone(),
                command,
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightGuard {
                    map: self.in_flight.clone(),
                    key,
                })
            }
        }
    }
}
