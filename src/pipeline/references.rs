//! Embedded content references: turning nested source objects into target
//! links, and listing what a record depends on.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::constants::{IMAGE_TYPE, MIN_REFERENCE_ID_LEN, MODEL_KEY, TECHNICAL_ID_KEY};
use crate::error::Result;
use crate::migration::{MigrationRecord, MigrationStatus, MigrationStore};
use crate::observability::metrics;
use crate::pipeline::schema::SchemaDescriptor;
use crate::types::{tracking_id, MergedRecord, TargetFieldMap};

/// A nested entity the record points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Replace embedded objects in the schema's reference fields with
/// `{ "id": <targetId> }` links.
///
/// Identifiers across every reference field and locale are looked up in a
/// single store query. Objects whose source has no successful migration
/// with a target id are dropped from the list.
#[instrument(skip_all, fields(content_type = %schema.target_type_name))]
pub async fn resolve_references(
    schema: &SchemaDescriptor,
    mut fields: TargetFieldMap,
    store: &dyn MigrationStore,
    source_system: &str,
) -> Result<TargetFieldMap> {
    let reference_fields = schema.reference_fields();

    let mut ids: Vec<String> = Vec::new();
    for field in &reference_fields {
        for_each_reference_list(&fields, field, |items| {
            for id in items.iter().filter_map(element_id) {
                if !ids.iter().any(|seen| seen == id) {
                    ids.push(id.to_string());
                }
            }
        });
    }
    if ids.is_empty() {
        return Ok(fields);
    }

    let records = store.find_by_source_ids(source_system, &ids).await?;
    let (mut resolved, mut omitted) = (0usize, 0usize);

    for field in &reference_fields {
        let Some(Value::Object(per_locale)) = fields.get_mut(*field) else {
            continue;
        };
        for value in per_locale.values_mut() {
            let Value::Array(items) = value else {
                continue;
            };
            let links: Vec<Value> = items
                .iter()
                .filter_map(|item| {
                    let link = element_id(item).and_then(|id| target_link(&records, id));
                    match &link {
                        Some(_) => resolved += 1,
                        None => {
                            debug!("Omitting unresolved reference in '{}': {:?}", field, element_id(item));
                            omitted += 1;
                        }
                    }
                    link
                })
                .collect();
            *items = links;
        }
    }

    metrics::build::references_resolved(resolved);
    metrics::build::references_omitted(omitted);
    debug!("Resolved {} references, omitted {}", resolved, omitted);
    Ok(fields)
}

fn for_each_reference_list<F>(fields: &TargetFieldMap, field: &str, mut f: F)
where
    F: FnMut(&[Value]),
{
    if let Some(Value::Object(per_locale)) = fields.get(field) {
        for value in per_locale.values() {
            if let Value::Array(items) = value {
                f(items);
            }
        }
    }
}

fn element_id(item: &Value) -> Option<&str> {
    item.as_object().and_then(tracking_id)
}

/// Link to the target entry of the newest successful migration of `id`
fn target_link(records: &[MigrationRecord], id: &str) -> Option<Value> {
    records
        .iter()
        .filter(|r| r.matches_source_id(id))
        .filter(|r| r.status == MigrationStatus::Succeeded)
        .filter_map(|r| r.target_id.as_deref().map(|target| (r.started_at, target)))
        .max_by_key(|(started_at, _)| *started_at)
        .map(|(_, target)| json!({ "id": target }))
}

/// Nested entities referenced by `record`, excluding itself and images.
///
/// Any object with an `_id` of plausible length counts; its type is the
/// object's `_model.title`, else the key it sits under. Results are unique
/// by id in first-seen order.
pub fn extract_dependencies(record: &MergedRecord) -> Vec<Dependency> {
    let root_id = tracking_id(record);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (key, value) in record {
        visit(value, Some(key.as_str()), root_id, &mut seen, &mut out);
    }
    out
}

fn visit<'a>(
    node: &'a Value,
    parent_key: Option<&'a str>,
    root_id: Option<&str>,
    seen: &mut HashSet<&'a str>,
    out: &mut Vec<Dependency>,
) {
    match node {
        Value::Array(items) => {
            for item in items {
                visit(item, parent_key, root_id, seen, out);
            }
        }
        Value::Object(obj) => {
            if let Some(id) = candidate_id(obj) {
                if root_id != Some(id) {
                    let kind = obj
                        .get(MODEL_KEY)
                        .and_then(|m| m.get("title"))
                        .and_then(Value::as_str)
                        .or(parent_key);
                    let node_type = obj.get("type").and_then(Value::as_str);
                    let is_image = [node_type, kind]
                        .into_iter()
                        .flatten()
                        .any(|t| t.eq_ignore_ascii_case(IMAGE_TYPE));
                    if !is_image && seen.insert(id) {
                        out.push(Dependency {
                            id: id.to_string(),
                            kind: kind.map(str::to_string),
                        });
                    }
                }
            }
            for (key, value) in obj {
                visit(value, Some(key.as_str()), root_id, seen, out);
            }
        }
        _ => {}
    }
}

fn candidate_id(obj: &Map<String, Value>) -> Option<&str> {
    obj.get(TECHNICAL_ID_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| id.chars().count() >= MIN_REFERENCE_ID_LEN)
}

/// Dependencies of `record` that have no successful migration yet
pub async fn unmet_dependencies(
    store: &dyn MigrationStore,
    source_system: &str,
    record: &MergedRecord,
) -> Result<Vec<Dependency>> {
    let deps = extract_dependencies(record);
    let ids: Vec<String> = deps.iter().map(|d| d.id.clone()).collect();
    let records = store.find_by_source_ids(source_system, &ids).await?;
    Ok(deps
        .into_iter()
        .filter(|dep| {
            !records
                .iter()
                .any(|r| r.matches_source_id(&dep.id) && r.status == MigrationStatus::Succeeded)
        })
        .collect())
}
