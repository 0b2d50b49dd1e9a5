//! Descriptive metadata stored as JSON inside the fixed package header.
use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EffectMetadata {
    #[serde(rename = "ID")]
    pub id: String,
    pub effect_name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl EffectMetadata {
    /// Metadata with the given id and name, created now, version `1.0.0`.
    pub fn new(id: impl Into<String>, effect_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            effect_name: effect_name.into(),
            author: String::new(),
            description: String::new(),
            create_time: Utc::now().trunc_subsecs(0),
            version: "1.0.0".to_string(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}
