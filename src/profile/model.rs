//! Profile documents as stored on disk.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Value written to the `etag` field of every profile.
pub const PROFILE_ETAG: &str = "placeholder";

/// Keys a save request must carry.
pub const DRAFT_KEYS: [&str; 4] = ["profile-name", "profile-desc", "groups", "users"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub uid: String,
    pub name: String,
    pub description: String,
    /// Exported settings keyed by namespace
    pub settings: BTreeMap<String, Value>,
    #[serde(rename = "applies-to")]
    pub applies_to: AppliesTo,
    pub etag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliesTo {
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

/// Entry of `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub url: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("JSON request is not an object")]
    NotAnObject,
    #[error("missing key(s) in profile settings request JSON object")]
    MissingKeys,
    #[error("profile settings values must be strings")]
    NotAString,
}

/// Operator-supplied part of a profile, decoded from a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub description: String,
    pub users: Vec<String>,
    pub groups: Vec<String>,
}

impl ProfileDraft {
    /// Decodes a save request body. Unparsable JSON counts as "not an object".
    pub fn from_body(body: &[u8]) -> Result<Self, DraftError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| DraftError::NotAnObject)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, DraftError> {
        let object = value.as_object().ok_or(DraftError::NotAnObject)?;
        if !DRAFT_KEYS.iter().all(|key| object.contains_key(*key)) {
            return Err(DraftError::MissingKeys);
        }

        Ok(Self {
            name: string_field(object, "profile-name")?.to_string(),
            description: string_field(object, "profile-desc")?.to_string(),
            users: split_names(string_field(object, "users")?),
            groups: split_names(string_field(object, "groups")?),
        })
    }
}

fn string_field<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str, DraftError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .ok_or(DraftError::NotAString)
}

/// Splits a comma-separated list, trimming items and dropping empty ones.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl Profile {
    pub fn new(uid: impl Into<String>, draft: ProfileDraft, settings: BTreeMap<String, Value>) -> Self {
        Self {
            uid: uid.into(),
            name: draft.name,
            description: draft.description,
            settings,
            applies_to: AppliesTo {
                users: draft.users,
                groups: draft.groups,
            },
            etag: PROFILE_ETAG.to_string(),
        }
    }

    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            url: self.uid.clone(),
            display_name: self.name.clone(),
        }
    }
}
