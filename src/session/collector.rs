//! Collector capability and the per-session registry of collectors.
//!
//! A collector records the configuration changes reported for one namespace
//! while a session is live. The registry maps namespace names to collector
//! instances and never looks inside them.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::http::request::Request;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectorError {
    #[error("change payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("invalid change payload: {0}")]
    InvalidPayload(String),
    #[error("change is missing the '{0}' field")]
    MissingField(&'static str),
}

/// One captured change. `index` is the change's stable position in
/// [`Collector::list_captured`] and is what selections refer to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub index: usize,
    pub key: String,
    pub value: Value,
}

pub trait Collector: Send + Sync + fmt::Debug {
    /// Namespace this collector captures, e.g. `org.gnome.gsettings`.
    fn namespace(&self) -> &'static str;

    /// Records the change carried by `request`.
    fn capture_change(&mut self, request: &Request) -> Result<(), CollectorError>;

    /// Captured changes, ordered by index.
    fn list_captured(&self) -> Vec<ChangeRecord>;

    /// Marks the given indices as the ones to keep. Unknown indices are
    /// ignored.
    fn mark_selected(&mut self, indices: &BTreeSet<usize>);

    /// Settings payload stored in a profile under this namespace.
    fn export_settings(&self) -> Value;
}

/// Builds a fresh collector.
pub type CollectorFactory = fn() -> Box<dyn Collector>;

/// Decodes a request body as a JSON object.
pub(crate) fn json_object(request: &Request) -> Result<serde_json::Map<String, Value>, CollectorError> {
    match request.json::<Value>() {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CollectorError::InvalidPayload("expected a JSON object".to_string())),
        Err(e) => Err(CollectorError::InvalidJson(e.to_string())),
    }
}

#[derive(Debug, Default)]
pub struct CollectorRegistry {
    collectors: BTreeMap<String, Box<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One fresh collector per factory.
    pub fn from_factories(factories: &[CollectorFactory]) -> Self {
        let mut registry = Self::new();
        for factory in factories {
            registry.insert(factory());
        }
        registry
    }

    /// Adds a collector under its namespace, replacing any previous one.
    pub fn insert(&mut self, collector: Box<dyn Collector>) {
        self.collectors
            .insert(collector.namespace().to_string(), collector);
    }

    pub fn get(&self, namespace: &str) -> Option<&(dyn Collector + 'static)> {
        self.collectors.get(namespace).map(|c| c.as_ref())
    }

    pub fn get_mut(&mut self, namespace: &str) -> Option<&mut (dyn Collector + 'static)> {
        self.collectors.get_mut(namespace).map(|c| c.as_mut())
    }

    pub fn namespaces(&self) -> Vec<&str> {
        self.collectors.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Exported settings of every collector, keyed by namespace.
    pub fn export_all(&self) -> BTreeMap<String, Value> {
        self.collectors
            .iter()
            .map(|(name, collector)| (name.clone(), collector.export_settings()))
            .collect()
    }
}
