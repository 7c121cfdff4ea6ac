//! Online accounts collector.
//!
//! A submission is an object mapping account ids to account settings; a
//! later submission for the same account replaces the earlier one in place.
//! Accounts keep the index of their first capture.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use super::collector::{json_object, ChangeRecord, Collector, CollectorError};
use crate::http::request::Request;

pub const NAMESPACE: &str = "org.gnome.online-accounts";

#[derive(Debug, Default)]
pub struct GoaCollector {
    accounts: Vec<(String, Value)>,
}

impl GoaCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Collector> {
        Box::new(Self::new())
    }
}

impl Collector for GoaCollector {
    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    fn capture_change(&mut self, request: &Request) -> Result<(), CollectorError> {
        let accounts = json_object(request)?;
        if let Some((id, _)) = accounts.iter().find(|(_, settings)| !settings.is_object()) {
            return Err(CollectorError::InvalidPayload(format!(
                "settings for account {} must be an object",
                id
            )));
        }

        for (id, settings) in accounts {
            tracing::debug!(namespace = NAMESPACE, account = %id, "Captured account change");
            match self.accounts.iter_mut().find(|(known, _)| *known == id) {
                Some(existing) => existing.1 = settings,
                None => self.accounts.push((id, settings)),
            }
        }
        Ok(())
    }

    fn list_captured(&self) -> Vec<ChangeRecord> {
        self.accounts
            .iter()
            .enumerate()
            .map(|(index, (id, settings))| ChangeRecord {
                index,
                key: id.clone(),
                value: settings.clone(),
            })
            .collect()
    }

    // Accounts are always exported whole.
    fn mark_selected(&mut self, _indices: &BTreeSet<usize>) {}

    fn export_settings(&self) -> Value {
        let accounts: Map<String, Value> = self
            .accounts
            .iter()
            .map(|(id, settings)| (id.clone(), settings.clone()))
            .collect();
        Value::Object(accounts)
    }
}
