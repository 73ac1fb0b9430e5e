use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MigratorError, Result};
use crate::pipeline::builder::resolve_path;
use crate::pipeline::schema::SchemaDescriptor;
use crate::types::{string_field, LocalePair, LocaleRole, MergedRecord, TargetFieldMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSys {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "linkType")]
    pub link_type: String,
    pub id: String,
}

/// `{ "sys": { "type": "Link", "linkType": "Tag", "id": ... } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagLink {
    pub sys: LinkSys,
}

impl TagLink {
    pub fn tag(id: impl Into<String>) -> Self {
        Self {
            sys: LinkSys {
                kind: "Link".to_string(),
                link_type: "Tag".to_string(),
                id: id.into(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub tags: Vec<TagLink>,
}

impl EntryMetadata {
    /// Add tags not already present, keeping existing order
    pub fn merge_tags(&mut self, incoming: &[TagLink]) {
        for tag in incoming {
            if !self.tags.iter().any(|t| t.id() == tag.id()) {
                self.tags.push(tag.clone());
            }
        }
    }
}

/// Everything the target system needs to create or update one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPayload {
    pub content_type_id: String,
    pub entry_id: String,
    pub locales: LocalePair,
    pub fields: TargetFieldMap,
    pub metadata: EntryMetadata,
}

/// An entry as held by the target system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEntry {
    pub id: String,
    pub content_type_id: String,
    pub fields: TargetFieldMap,
    #[serde(default)]
    pub metadata: EntryMetadata,
    pub version: u64,
    #[serde(default)]
    pub published_version: Option<u64>,
}

impl TargetEntry {
    pub fn from_payload(payload: &TargetPayload) -> Self {
        Self {
            id: payload.entry_id.clone(),
            content_type_id: payload.content_type_id.clone(),
            fields: payload.fields.clone(),
            metadata: payload.metadata.clone(),
            version: 1,
            published_version: None,
        }
    }

    /// Field-level merge: incoming fields replace their namesakes, fields the
    /// payload does not mention are kept.
    pub fn apply(&mut self, payload: &TargetPayload) {
        for (field, value) in &payload.fields {
            self.fields.insert(field.clone(), value.clone());
        }
        self.metadata.merge_tags(&payload.metadata.tags);
        self.version += 1;
    }

    pub fn publish(&mut self) {
        self.published_version = Some(self.version);
    }

    pub fn is_published(&self) -> bool {
        self.published_version == Some(self.version)
    }
}

/// Entry id for a merged record: its own `id`, else the value the schema
/// maps into the target `id` field.
pub fn entry_id_for(schema: &SchemaDescriptor, record: &MergedRecord) -> Result<String> {
    string_field(record, "id")
        .or_else(|| {
            schema
                .id_source_path()
                .and_then(|path| resolve_path(record, path, LocaleRole::Primary))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .map(str::to_string)
        .ok_or_else(|| {
            MigratorError::InvalidInput(format!(
                "record for '{}' has no usable entry id",
                schema.target_type_name
            ))
        })
}

pub fn build_payload(
    schema: &SchemaDescriptor,
    record: &MergedRecord,
    fields: TargetFieldMap,
    locales: &LocalePair,
    market: Option<&str>,
) -> Result<TargetPayload> {
    let tags = market
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| vec![TagLink::tag(m.to_lowercase())])
        .unwrap_or_default();

    Ok(TargetPayload {
        content_type_id: schema.target_type_name.clone(),
        entry_id: entry_id_for(schema, record)?,
        locales: locales.clone(),
        fields,
        metadata: EntryMetadata { tags },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> MergedRecord {
        v.as_object().cloned().unwrap()
    }

    fn schema(text: &str) -> SchemaDescriptor {
        SchemaDescriptor::from_json(text).unwrap()
    }

    #[test]
    fn entry_id_prefers_record_id() {
        let s = schema(r#"{"targetTypeName": "microcopy", "fields": {"id": "key"}}"#);
        let r = record(json!({"id": "  al-al-hello ", "key": "other"}));
        assert_eq!(entry_id_for(&s, &r).unwrap(), "al-al-hello");

        let r = record(json!({"key": "from-mapping"}));
        assert_eq!(entry_id_for(&s, &r).unwrap(), "from-mapping");

        let r = record(json!({"id": "  "}));
        assert!(matches!(entry_id_for(&s, &r), Err(MigratorError::InvalidInput(_))));
    }

    #[test]
    fn payload_carries_market_tag() {
        let s = schema(r#"{"targetTypeName": "microcopy", "fields": {"id": "id"}}"#);
        let r = record(json!({"id": "al-al-x"}));
        let payload = build_payload(&s, &r, TargetFieldMap::new(), &LocalePair::default(), Some("AL")).unwrap();
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["contentTypeId"], json!("microcopy"));
        assert_eq!(v["entryId"], json!("al-al-x"));
        assert_eq!(
            v["metadata"]["tags"],
            json!([{"sys": {"type": "Link", "linkType": "Tag", "id": "al"}}])
        );

        let untagged = build_payload(&s, &r, TargetFieldMap::new(), &LocalePair::default(), None).unwrap();
        assert!(untagged.metadata.tags.is_empty());
    }

    #[test]
    fn apply_merges_fields_and_tags() {
        let s = schema(r#"{"targetTypeName": "microcopy", "fields": {"id": "id"}}"#);
        let r = record(json!({"id": "al-al-x"}));
        let mut fields = TargetFieldMap::new();
        fields.insert("title".into(), json!({"en-US": "old"}));
        fields.insert("note".into(), json!({"en-US": "kept"}));
        let first = build_payload(&s, &r, fields, &LocalePair::default(), Some("al")).unwrap();
        let mut entry = TargetEntry::from_payload(&first);
        entry.publish();
        assert!(entry.is_published());

        let mut fields = TargetFieldMap::new();
        fields.insert("title".into(), json!({"en-US": "new"}));
        let second = build_payload(&s, &r, fields, &LocalePair::default(), Some("AL")).unwrap();
        entry.apply(&second);

        assert_eq!(entry.fields["title"], json!({"en-US": "new"}));
        assert_eq!(entry.fields["note"], json!({"en-US": "kept"}));
        assert_eq!(entry.metadata.tags.len(), 1);
        assert_eq!(entry.version, 2);
        assert!(!entry.is_published());
    }
}
