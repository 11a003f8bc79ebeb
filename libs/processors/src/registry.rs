//! Processor registry: id → processor lookup with a designated default.
//!
//! Built once at startup and treated as immutable configuration. Duplicate
//! ids are a configuration error caught at construction, never at lookup;
//! lookup itself can never fail because an unknown or omitted id resolves to
//! the default processor.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::builtin::{NotificationProcessor, RawJsonProcessor, SmsProcessor};
use crate::MessageProcessor;

/// Configuration errors detected while building a registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate processor id: {0}")]
    DuplicateId(String),

    #[error("default processor id not registered: {0}")]
    UnknownDefault(String),

    #[error("registry requires at least one processor")]
    Empty,
}

/// UI metadata for one registered processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorDescriptor {
    pub id: String,
    pub label: String,
    pub is_default: bool,
}

/// Immutable mapping from processor id to processor instance.
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn MessageProcessor>>,
    default_id: String,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.processors.keys().collect::<Vec<_>>())
            .field("default_id", &self.default_id)
            .finish()
    }
}

impl ProcessorRegistry {
    /// Build a registry from processor instances and the default id.
    pub fn new(
        processors: Vec<Arc<dyn MessageProcessor>>,
        default_id: &str,
    ) -> Result<Self, RegistryError> {
        if processors.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut map: HashMap<String, Arc<dyn MessageProcessor>> =
            HashMap::with_capacity(processors.len());
        for processor in processors {
            let id = processor.id().to_string();
            if map.insert(id.clone(), processor).is_some() {
                return Err(RegistryError::DuplicateId(id));
            }
        }

        if !map.contains_key(default_id) {
            return Err(RegistryError::UnknownDefault(default_id.to_string()));
        }

        Ok(Self {
            processors: map,
            default_id: default_id.to_string(),
        })
    }

    /// Registry with the standard built-in processors, defaulting to `sms`.
    pub fn with_builtin() -> Result<Self, RegistryError> {
        Self::new(
            vec![
                Arc::new(SmsProcessor),
                Arc::new(NotificationProcessor),
                Arc::new(RawJsonProcessor),
            ],
            "sms",
        )
    }

    /// Resolve a processor by id.
    ///
    /// An omitted or unknown id is not an error: it falls back to the
    /// registry's default processor. This never fails.
    pub fn resolve(&self, id: Option<&str>) -> Arc<dyn MessageProcessor> {
        id.and_then(|id| self.processors.get(id))
            .unwrap_or_else(|| {
                // Construction guarantees the default id is registered.
                &self.processors[&self.default_id]
            })
            .clone()
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processors.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// `(id, label)` metadata for every registered processor, default first,
    /// then alphabetical.
    pub fn descriptors(&self) -> Vec<ProcessorDescriptor> {
        let mut descriptors: Vec<ProcessorDescriptor> = self
            .processors
            .values()
            .map(|p| ProcessorDescriptor {
                id: p.id().to_string(),
                label: p.label().to_string(),
                is_default: p.id() == self.default_id,
            })
            .collect();
        descriptors.sort_by(|a, b| b.is_default.cmp(&a.is_default).then(a.id.cmp(&b.id)));
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = ProcessorRegistry::with_builtin().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.default_id(), "sms");
        assert!(registry.contains("notification"));
        assert!(registry.contains("raw-json"));
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let registry = ProcessorRegistry::with_builtin().unwrap();

        let omitted = registry.resolve(None);
        let unknown = registry.resolve(Some("unknown-id"));
        let explicit = registry.resolve(Some("sms"));

        assert_eq!(omitted.id(), "sms");
        assert_eq!(unknown.id(), "sms");
        assert_eq!(explicit.id(), "sms");

        let notification = registry.resolve(Some("notification"));
        assert_eq!(notification.id(), "notification");
    }

    #[test]
    fn test_duplicate_id_is_construction_error() {
        let result = ProcessorRegistry::new(
            vec![Arc::new(SmsProcessor), Arc::new(SmsProcessor)],
            "sms",
        );
        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateId("sms".to_string()))
        );
    }

    #[test]
    fn test_unknown_default_is_construction_error() {
        let result = ProcessorRegistry::new(vec![Arc::new(SmsProcessor)], "nope");
        assert_eq!(
            result.err(),
            Some(RegistryError::UnknownDefault("nope".to_string()))
        );
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert_eq!(
            ProcessorRegistry::new(vec![], "sms").err(),
            Some(RegistryError::Empty)
        );
    }

    #[test]
    fn test_descriptors_put_default_first() {
        let registry = ProcessorRegistry::with_builtin().unwrap();
        let descriptors = registry.descriptors();
        assert_eq!(descriptors.len(), 3);
        assert_eq!(descriptors[0].id, "sms");
        assert!(descriptors[0].is_default);
        assert!(!descriptors[1].is_default);
    }
}
