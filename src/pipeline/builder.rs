use serde_json::{Map, Value};
use tracing::debug;

use crate::observability::metrics;
use crate::pipeline::media::{compose_media, MediaFields};
use crate::pipeline::schema::{FieldDescriptor, MediaDescriptor, SchemaDescriptor};
use crate::types::{read_field, LocalePair, LocaleRole, MergedRecord, TargetFieldMap};

/// Project one merged record onto the target fields declared by `schema`.
///
/// Each emitted field holds one entry per locale whose value resolved; fields
/// with no resolvable locale are left out entirely.
pub fn build_fields(schema: &SchemaDescriptor, record: &MergedRecord, locales: &LocalePair) -> TargetFieldMap {
    let mut fields = TargetFieldMap::new();

    for (target, descriptor) in &schema.fields {
        if schema.ignored_source_keys.contains(descriptor.source_root()) {
            debug!("Skipping '{}': source key '{}' is ignored", target, descriptor.source_root());
            continue;
        }

        let mut per_locale = Map::new();
        for role in LocaleRole::BOTH {
            if let Some(value) = resolve(descriptor, record, role) {
                per_locale.insert(locales.code(role).to_string(), value);
            }
        }

        if per_locale.is_empty() {
            debug!("No value resolved for target field '{}'", target);
            continue;
        }
        fields.insert(target.clone(), Value::Object(per_locale));
    }

    metrics::build::fields_emitted(&schema.target_type_name, fields.len());
    fields
}

fn resolve(descriptor: &FieldDescriptor, record: &MergedRecord, role: LocaleRole) -> Option<Value> {
    match descriptor {
        FieldDescriptor::Direct { path } => resolve_path(record, path, role).cloned(),
        FieldDescriptor::ComposedMedia(media) => compose(media, record, role),
    }
}

/// Walk a dotted path; the root key is read through the locale accessor
pub fn resolve_path<'a>(record: &'a MergedRecord, path: &str, role: LocaleRole) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let root = segments.next()?;
    let mut current = read_field(record, root, role)?;
    for segment in segments {
        current = match current {
            Value::Object(obj) => obj.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

fn compose(media: &MediaDescriptor, record: &MergedRecord, role: LocaleRole) -> Option<Value> {
    let fields = MediaFields {
        meta_field: &media.meta_field_name,
        path_field: &media.path_field_name,
        required_type: media.required_type.as_deref(),
    };
    let composed = compose_media(record, fields, role)?;
    metrics::build::media_composed();
    Some(composed.to_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> MergedRecord {
        v.as_object().cloned().unwrap()
    }

    fn locales() -> LocalePair {
        LocalePair::new("sq-AL", "en")
    }

    #[test]
    fn direct_fields_emit_per_locale_values() {
        let schema = SchemaDescriptor::from_json(
            r#"{"targetTypeName": "microcopy", "fields": {"id": "id", "heading": "title", "missing": "nope"}}"#,
        )
        .unwrap();
        let r = record(json!({"id": "al-al-x", "title": "A", "title_secondary": "B"}));
        let fields = build_fields(&schema, &r, &locales());
        assert_eq!(
            Value::Object(fields),
            json!({
                "id": {"sq-AL": "al-al-x"},
                "heading": {"sq-AL": "A", "en": "B"}
            })
        );
    }

    #[test]
    fn null_values_are_not_emitted() {
        let schema =
            SchemaDescriptor::from_json(r#"{"targetTypeName": "t", "fields": {"alt": "altText"}}"#).unwrap();
        let r = record(json!({"altText": null, "altText_secondary": null}));
        assert!(build_fields(&schema, &r, &locales()).is_empty());

        let r = record(json!({"altText": null, "altText_secondary": "only secondary"}));
        let fields = build_fields(&schema, &r, &locales());
        assert_eq!(fields["alt"], json!({"en": "only secondary"}));
    }

    #[test]
    fn dotted_paths_read_secondary_sub_object() {
        let schema = SchemaDescriptor::from_json(
            r#"{"targetTypeName": "whatIsNewSection",
                "fields": {"title": "configuration.sectionTitle", "first": "configuration.tabs.0"}}"#,
        )
        .unwrap();
        let r = record(json!({
            "configuration": {"sectionTitle": "Te reja", "tabs": ["a", "b"]},
            "configuration_secondary": {"sectionTitle": "What's new"}
        }));
        let fields = build_fields(&schema, &r, &locales());
        assert_eq!(fields["title"], json!({"sq-AL": "Te reja", "en": "What's new"}));
        assert_eq!(fields["first"], json!({"sq-AL": "a"}));
    }

    #[test]
    fn ignored_source_keys_are_skipped() {
        let schema = SchemaDescriptor::from_json(
            r#"{"targetTypeName": "t", "fields": {"tags": "tags", "title": "title"}, "ignored": ["tags"]}"#,
        )
        .unwrap();
        let r = record(json!({"tags": ["x"], "title": "A"}));
        let fields = build_fields(&schema, &r, &locales());
        assert!(!fields.contains_key("tags"));
        assert!(fields.contains_key("title"));
    }

    #[test]
    fn composed_media_per_locale() {
        let schema = SchemaDescriptor::from_json(
            r#"{"targetTypeName": "iconMap", "fields": {
                "icon": {"from": "icon", "composeMedia": {"metaField": "icon", "pathField": "icon_dm", "whenType": "image"}}
            }}"#,
        )
        .unwrap();
        let r = record(json!({
            "icon": {"type": "image", "mimeType": "image/png"},
            "icon_dm": "/assets/a.png",
            "icon_secondary": {"type": "document", "mimeType": "application/pdf"},
            "icon_dm_secondary": "/assets/a.pdf"
        }));
        let fields = build_fields(&schema, &r, &locales());
        let icon = fields["icon"].as_object().unwrap();
        assert_eq!(icon.len(), 1);
        let primary = &icon["sq-AL"];
        assert_eq!(primary["type"], json!("image"));
        assert_eq!(primary["format"], json!("png"));
        assert_eq!(primary["damUrl"], json!("/assets/a.png"));
        assert_eq!(primary["mimeType"], json!("image/png"));
    }
}
