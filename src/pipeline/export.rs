//! Reading content exports and writing the merged output artifact.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::constants::{MODEL_KEY, PATH_KEY};
use crate::error::{MigratorError, Result};
use crate::pipeline::aggregation::{AggregationMethod, AggregationOutcome};
use crate::types::{MergedRecord, SourceRecord};

/// One named list of an export, e.g. `microcopyList`
#[derive(Debug, Clone, PartialEq)]
pub struct ExportList {
    pub key: String,
    pub items: Vec<SourceRecord>,
}

impl ExportList {
    /// `_model._path` of the first item, which names the content model of the list
    pub fn model_path(&self) -> Option<&str> {
        self.items.first().and_then(model_path)
    }
}

/// Parsed `{ "data": { <listKey>: { "items": [...] } } }` export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportDocument {
    pub lists: Vec<ExportList>,
}

impl ExportDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            MigratorError::Config(format!("Failed to read export file '{}': {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(&doc))
    }

    /// Lenient read: a missing `data` object yields no lists, lists without
    /// an `items` array are skipped, and non-object items are dropped.
    pub fn from_value(doc: &Value) -> Self {
        let Some(data) = doc.get("data").and_then(Value::as_object) else {
            debug!("Export has no data object");
            return Self::default();
        };

        let mut lists = Vec::new();
        for (key, list) in data {
            let Some(items) = list.get("items").and_then(Value::as_array) else {
                debug!("Skipping export list '{}' without items", key);
                continue;
            };
            let records: Vec<SourceRecord> = items.iter().filter_map(|item| item.as_object().cloned()).collect();
            if records.len() < items.len() {
                debug!("Dropped {} non-object items from '{}'", items.len() - records.len(), key);
            }
            lists.push(ExportList {
                key: key.clone(),
                items: records,
            });
        }
        Self { lists }
    }

    /// Every record of every list, in document order
    pub fn records(&self) -> Vec<SourceRecord> {
        self.lists.iter().flat_map(|l| l.items.iter().cloned()).collect()
    }
}

fn model_path(record: &SourceRecord) -> Option<&str> {
    record.get(MODEL_KEY)?.get(PATH_KEY)?.as_str()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMeta {
    pub aggregation_method: AggregationMethod,
    pub local_market: String,
    pub total_groups: usize,
    pub merged_count: usize,
    pub not_matched_count: usize,
    pub non_matched_paths: Vec<String>,
}

impl ArtifactMeta {
    pub fn new(method: AggregationMethod, local_market: &str, outcome: &AggregationOutcome) -> Self {
        Self {
            aggregation_method: method,
            local_market: local_market.to_string(),
            total_groups: outcome.total_groups,
            merged_count: outcome.merged_count(),
            not_matched_count: outcome.not_matched_count,
            non_matched_paths: outcome.non_matched_paths.clone(),
        }
    }
}

/// Output document in the export's own shape.
///
/// Each list receives the merged records sharing its model path, or every
/// merged record when the list's first item carries none.
pub fn build_artifact(doc: &ExportDocument, outcome: &AggregationOutcome, meta: ArtifactMeta) -> Result<Value> {
    let mut data = Map::new();
    for list in &doc.lists {
        let items: Vec<&MergedRecord> = match list.model_path() {
            Some(path) => outcome
                .merged
                .iter()
                .filter(|r| model_path(r) == Some(path))
                .collect(),
            None => outcome.merged.iter().collect(),
        };
        data.insert(list.key.clone(), json!({ "items": items }));
    }
    Ok(json!({
        "meta": serde_json::to_value(meta)?,
        "data": Value::Object(data),
    }))
}

pub fn write_artifact(path: &Path, artifact: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(artifact)?)?;
    info!("Wrote merged output to {}", path.display());
    Ok(())
}
