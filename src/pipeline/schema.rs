//! Declarative mapping schema: which source fields feed which target fields.

use jsonschema::JSONSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use crate::constants::DEFAULT_REFERENCE_FIELD;
use crate::error::{MigratorError, Result};

const MAPPING_SCHEMA_V1: &str = include_str!("../../schemas/mapping-schema.v1.json");

/// Media composition parameters of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub source_field_name: Option<String>,
    pub meta_field_name: String,
    pub path_field_name: String,
    pub required_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDescriptor {
    /// Source field name, dotted for nested access
    Direct { path: String },
    ComposedMedia(MediaDescriptor),
}

impl FieldDescriptor {
    /// Top-level source key this descriptor reads from
    pub fn source_root(&self) -> &str {
        match self {
            FieldDescriptor::Direct { path } => path.split('.').next().unwrap_or(path),
            FieldDescriptor::ComposedMedia(media) => media
                .source_field_name
                .as_deref()
                .unwrap_or(&media.meta_field_name),
        }
    }

    fn from_document(target: &str, raw: &Value) -> Result<Self> {
        let invalid = |reason: &str| MigratorError::InvalidSchema(format!("field '{target}': {reason}"));
        match raw {
            Value::String(path) if !path.trim().is_empty() => Ok(FieldDescriptor::Direct {
                path: path.trim().to_string(),
            }),
            Value::Object(obj) => {
                let from = obj
                    .get("from")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                match obj.get("composeMedia") {
                    Some(compose) => {
                        let doc: ComposeMediaDocument = serde_json::from_value(compose.clone())
                            .map_err(|e| invalid(&format!("bad composeMedia: {e}")))?;
                        Ok(FieldDescriptor::ComposedMedia(MediaDescriptor {
                            source_field_name: from,
                            meta_field_name: doc.meta_field,
                            path_field_name: doc.path_field,
                            required_type: doc.when_type.filter(|t| !t.is_empty()),
                        }))
                    }
                    None => from
                        .map(|path| FieldDescriptor::Direct { path })
                        .ok_or_else(|| invalid("object descriptor needs 'from' or 'composeMedia'")),
                }
            }
            _ => Err(invalid("descriptor must be a source path or an object")),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComposeMediaDocument {
    meta_field: String,
    path_field: String,
    when_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaDocument {
    #[serde(default, alias = "aemModel")]
    source_model_name: Option<String>,
    #[serde(default, alias = "contentfulType")]
    target_type_name: Option<String>,
    #[serde(default)]
    fields: Option<Map<String, Value>>,
    #[serde(default, alias = "ignored")]
    ignored_source_keys: Vec<String>,
    #[serde(default)]
    reference_fields: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    pub source_model_name: Option<String>,
    pub target_type_name: String,
    /// Target field id -> descriptor, in document order
    pub fields: Vec<(String, FieldDescriptor)>,
    pub ignored_source_keys: HashSet<String>,
    explicit_reference_fields: Option<Vec<String>>,
}

impl SchemaDescriptor {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            MigratorError::Config(format!("Failed to read schema file '{}': {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_value(&doc)
    }

    pub fn from_value(doc: &Value) -> Result<Self> {
        validate_document(doc)?;
        let parsed: SchemaDocument = serde_json::from_value(doc.clone())?;

        let target_type_name = parsed
            .target_type_name
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MigratorError::InvalidSchema("schema must include targetTypeName".into()))?;
        let raw_fields = parsed
            .fields
            .ok_or_else(|| MigratorError::InvalidSchema("schema must include fields".into()))?;

        let fields = raw_fields
            .iter()
            .map(|(target, raw)| Ok((target.clone(), FieldDescriptor::from_document(target, raw)?)))
            .collect::<Result<Vec<_>>>()?;

        debug!("Loaded mapping schema for '{}' with {} fields", target_type_name, fields.len());
        Ok(Self {
            source_model_name: parsed
                .source_model_name
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            target_type_name,
            fields,
            ignored_source_keys: parsed.ignored_source_keys.into_iter().collect(),
            explicit_reference_fields: parsed.reference_fields,
        })
    }

    /// Entity type recorded in the migration log
    pub fn entity_type(&self) -> &str {
        self.source_model_name.as_deref().unwrap_or(&self.target_type_name)
    }

    pub fn descriptor(&self, target_field: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|(target, _)| target == target_field)
            .map(|(_, descriptor)| descriptor)
    }

    /// Target fields holding embedded content references.
    ///
    /// Defaults to `items` when the schema maps a field with that id.
    pub fn reference_fields(&self) -> Vec<&str> {
        match &self.explicit_reference_fields {
            Some(fields) => fields.iter().map(String::as_str).collect(),
            None if self.descriptor(DEFAULT_REFERENCE_FIELD).is_some() => vec![DEFAULT_REFERENCE_FIELD],
            None => Vec::new(),
        }
    }

    /// Source path mapped to the target `id` field, when it is a plain mapping
    pub fn id_source_path(&self) -> Option<&str> {
        match self.descriptor("id") {
            Some(FieldDescriptor::Direct { path }) => Some(path),
            _ => None,
        }
    }
}

fn compile_mapping_schema() -> std::result::Result<JSONSchema, String> {
    let schema: Value = serde_json::from_str(MAPPING_SCHEMA_V1).map_err(|e| e.to_string())?;
    JSONSchema::compile(&schema).map_err(|e| e.to_string())
}

/// Structural check against the bundled JSON Schema, compiled once per process
fn validate_document(doc: &Value) -> Result<()> {
    static COMPILED: OnceLock<std::result::Result<JSONSchema, String>> = OnceLock::new();
    let compiled = COMPILED
        .get_or_init(compile_mapping_schema)
        .as_ref()
        .map_err(|e| MigratorError::InvalidSchema(format!("bundled mapping schema does not compile: {e}")))?;
    if let Err(errors) = compiled.validate(doc) {
        let messages: Vec<String> = errors
            .map(|e| {
                let at = e.instance_path.to_string();
                if at.is_empty() {
                    e.to_string()
                } else {
                    format!("{at}: {e}")
                }
            })
            .collect();
        return Err(MigratorError::InvalidSchema(messages.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ICON_MAP: &str = r#"{
        "aemModel": "iconMap",
        "contentfulType": "iconMap",
        "fields": {
            "id": "id",
            "icon": {
                "from": "icon",
                "composeMedia": {"metaField": "icon", "pathField": "icon_dm", "whenType": "image"}
            },
            "title": "configuration.sectionTitle",
            "altText": {"from": "altText"}
        },
        "ignored": ["_path", "tags"],
        "contentfulDefinition": {"name": "Icon Map"}
    }"#;

    #[test]
    fn parses_original_key_spellings() {
        let schema = SchemaDescriptor::from_json(ICON_MAP).unwrap();
        assert_eq!(schema.target_type_name, "iconMap");
        assert_eq!(schema.entity_type(), "iconMap");
        assert_eq!(schema.fields.len(), 4);
        assert_eq!(schema.fields[1].0, "icon");
        assert!(schema.ignored_source_keys.contains("tags"));
        assert_eq!(schema.id_source_path(), Some("id"));
        assert!(schema.reference_fields().is_empty());
        assert_eq!(
            schema.descriptor("icon"),
            Some(&FieldDescriptor::ComposedMedia(MediaDescriptor {
                source_field_name: Some("icon".into()),
                meta_field_name: "icon".into(),
                path_field_name: "icon_dm".into(),
                required_type: Some("image".into()),
            }))
        );
        assert_eq!(
            schema.descriptor("altText"),
            Some(&FieldDescriptor::Direct { path: "altText".into() })
        );
    }

    #[test]
    fn source_root_of_dotted_path() {
        let d = FieldDescriptor::Direct {
            path: "configuration.sectionTitle".into(),
        };
        assert_eq!(d.source_root(), "configuration");
    }

    #[test]
    fn missing_target_type_is_rejected() {
        let err = SchemaDescriptor::from_json(r#"{"fields": {"id": "id"}}"#).unwrap_err();
        assert!(matches!(err, MigratorError::InvalidSchema(_)));
    }

    #[test]
    fn missing_fields_is_rejected() {
        let err = SchemaDescriptor::from_json(r#"{"targetTypeName": "page"}"#).unwrap_err();
        assert!(matches!(err, MigratorError::InvalidSchema(_)));
    }

    #[test]
    fn compose_media_without_path_field_is_rejected() {
        let err = SchemaDescriptor::from_json(
            r#"{"targetTypeName": "page", "fields": {"hero": {"composeMedia": {"metaField": "hero"}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MigratorError::InvalidSchema(_)));
    }

    #[test]
    fn bundled_schema_is_compiled_once_and_reused() {
        for _ in 0..3 {
            assert!(SchemaDescriptor::from_json(r#"{"targetTypeName": "page"}"#).is_err());
            assert!(SchemaDescriptor::from_json(r#"{"targetTypeName": "page", "fields": {"id": "id"}}"#).is_ok());
        }
        assert!(compile_mapping_schema().is_ok());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SchemaDescriptor::from_json(r#"{"targetTypeName": "page", "#).unwrap_err();
        assert!(matches!(err, MigratorError::Json(_)));
    }

    #[test]
    fn items_field_defaults_to_reference_field() {
        let schema = SchemaDescriptor::from_json(
            r#"{"aemModel": "whatsnew ", "contentfulType": "whatIsNewSection",
                "fields": {"id": "id", "items": "whatisnewList"}}"#,
        )
        .unwrap();
        assert_eq!(schema.source_model_name.as_deref(), Some("whatsnew"));
        assert_eq!(schema.reference_fields(), vec!["items"]);

        let explicit = SchemaDescriptor::from_json(
            r#"{"targetTypeName": "page", "fields": {"cards": "cardList"}, "referenceFields": ["cards"]}"#,
        )
        .unwrap();
        assert_eq!(explicit.reference_fields(), vec!["cards"]);
    }
}
