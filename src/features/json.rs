use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use super::{AudioFeatureRecord, FeatureStore, LookupError};

/// Feature records loaded from a JSON object keyed by audio identifier:
///
/// ```json
/// { "blinding-lights": { "key": 1, "mode": 0, "tempo": 171.0, ... } }
/// ```
pub struct JsonFeatureStore {
    records: HashMap<String, AudioFeatureRecord>,
}

impl JsonFeatureStore {
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read feature store: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid feature store: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            records: serde_json::from_str(content)?,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl FeatureStore for JsonFeatureStore {
    fn lookup(&self, id: &str) -> Result<AudioFeatureRecord, LookupError> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(id.to_string()))
    }
}
