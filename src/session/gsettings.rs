//! Desktop settings collector.
//!
//! Each submitted change is `{"key": ..., "value": ..., "signature": ...}`.
//! A later change to a key already recorded overwrites it in place, so the
//! indices handed out by `list_captured` stay valid for the whole session.

use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use super::collector::{json_object, ChangeRecord, Collector, CollectorError};
use crate::http::request::Request;

pub const NAMESPACE: &str = "org.gnome.gsettings";

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SettingChange {
    key: String,
    value: Value,
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Debug, Default)]
pub struct GSettingsCollector {
    changes: Vec<SettingChange>,
    selected: BTreeSet<usize>,
}

impl GSettingsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Collector> {
        Box::new(Self::new())
    }
}

impl Collector for GSettingsCollector {
    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn capture_change(&mut self, request: &Request) -> Result<(), CollectorError> {
        let object = json_object(request)?;
        for field in ["key", "value"] {
            if !object.contains_key(field) {
                return Err(CollectorError::MissingField(field));
            }
        }

        let change: SettingChange = serde_json::from_value(Value::Object(object))
            .map_err(|e| CollectorError::InvalidPayload(e.to_string()))?;

        tracing::debug!(namespace = NAMESPACE, key = %change.key, "Captured settings change");

        match self.changes.iter_mut().find(|c| c.key == change.key) {
            Some(existing) => *existing = change,
            None => self.changes.push(change),
        }
        Ok(())
    }

    fn list_captured(&self) -> Vec<ChangeRecord> {
        self.changes
            .iter()
            .enumerate()
            .map(|(index, change)| ChangeRecord {
                index,
                key: change.key.clone(),
                value: change.value.clone(),
            })
            .collect()
    }

    fn mark_selected(&mut self, indices: &BTreeSet<usize>) {
        let len = self.changes.len();
        self.selected = indices.iter().copied().filter(|i| *i < len).collect();
    }

    fn export_settings(&self) -> Value {
        let selected = self
            .selected
            .iter()
            .filter_map(|i| self.changes.get(*i))
            .map(|change| {
                let mut entry = json!({ "key": change.key, "value": change.value });
                if let (Some(signature), Some(obj)) = (&change.signature, entry.as_object_mut()) {
                    obj.insert("signature".to_string(), Value::String(signature.clone()));
                }
                entry
            })
            .collect();
        Value::Array(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{Method, RequestBuilder};

    fn change(body: &str) -> Request {
        RequestBuilder::new()
            .method(Method::POST)
            .path("/changes/submit/org.gnome.gsettings")
            .body(body)
            .build()
            .unwrap()
    }

    #[test]
    fn repeated_key_keeps_its_index() {
        let mut c = GSettingsCollector::new();
        c.capture_change(&change(r#"{"key":"/a","value":1}"#)).unwrap();
        c.capture_change(&change(r#"{"key":"/b","value":2}"#)).unwrap();
        c.capture_change(&change(r#"{"key":"/a","value":3}"#)).unwrap();

        let listed = c.list_captured();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key, "/a");
        assert_eq!(listed[0].value, json!(3));
        assert_eq!(listed[1].index, 1);
    }

    #[test]
    fn exports_only_selected_changes() {
        let mut c = GSettingsCollector::new();
        c.capture_change(&change(r#"{"key":"/a","value":1,"signature":"i"}"#)).unwrap();
        c.capture_change(&change(r#"{"key":"/b","value":2}"#)).unwrap();
        c.capture_change(&change(r#"{"key":"/c","value":3}"#)).unwrap();

        c.mark_selected(&BTreeSet::from([0, 2, 7]));

        assert_eq!(
            c.export_settings(),
            json!([
                {"key": "/a", "value": 1, "signature": "i"},
                {"key": "/c", "value": 3}
            ])
        );
    }

    #[test]
    fn missing_value_is_rejected() {
        let mut c = GSettingsCollector::new();
        let err = c.capture_change(&change(r#"{"key":"/a"}"#)).unwrap_err();

        assert_eq!(err, CollectorError::MissingField("value"));
        assert!(c.list_captured().is_empty());
    }

    #[test]
    fn nothing_selected_exports_empty_list() {
        let mut c = GSettingsCollector::new();
        c.capture_change(&change(r#"{"key":"/a","value":1}"#)).unwrap();

        assert_eq!(c.export_settings(), json!([]));
    }
}
