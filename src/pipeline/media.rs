//! Normalized media descriptors derived from a metadata object plus a raw
//! DAM path field.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::types::{read_field, LocaleRole, MergedRecord};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// Which two sibling fields describe a media item, and which type it must have
#[derive(Debug, Clone, Copy)]
pub struct MediaFields<'a> {
    pub meta_field: &'a str,
    pub path_field: &'a str,
    pub required_type: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaObject {
    pub id: Option<Value>,
    pub size: Option<Value>,
    pub name: Option<String>,
    pub title: Option<Value>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub path: Option<String>,
    pub format: Option<String>,
    pub mime_type: Option<String>,
    pub dam_url: Option<String>,
    pub publish_url: Option<String>,
    pub dynamic_url: Option<String>,
    pub width: Option<Value>,
    pub height: Option<Value>,
}

impl MediaObject {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Reduced `{ path, mimeType, type }` form attached to merged records
    pub fn summary(&self) -> Value {
        json!({
            "path": self.dam_url.as_ref().or(self.publish_url.as_ref()),
            "mimeType": self.mime_type,
            "type": self.media_type,
        })
    }
}

/// Compose the media object for one side of a merged record.
pub fn compose_media(record: &MergedRecord, fields: MediaFields<'_>, role: LocaleRole) -> Option<MediaObject> {
    let empty = Map::new();
    let meta = read_field(record, fields.meta_field, role)
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let dam_url = read_field(record, fields.path_field, role)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    compose_from_parts(meta, dam_url, fields.required_type)
}

fn compose_from_parts(
    meta: &Map<String, Value>,
    dam_url: Option<String>,
    required_type: Option<&str>,
) -> Option<MediaObject> {
    let raw_type = meta_str(meta, "type");
    let mime_type = meta_str(meta, "mimeType");
    let publish_url = meta_str(meta, "_publishUrl");
    let dynamic_url = meta_str(meta, "_dynamicUrl");

    let effective_type = infer_media_type(
        raw_type.as_deref(),
        mime_type.as_deref(),
        dam_url.as_deref().or(publish_url.as_deref()).or(dynamic_url.as_deref()),
    );

    if let Some(required) = required_type {
        match &effective_type {
            Some(t) if t != required => return None,
            None if dam_url.is_none() => return None,
            _ => {}
        }
    }

    let meta_id = meta.get("_id").filter(|v| !v.is_null()).cloned();
    if dam_url.is_none() && meta_id.is_none() {
        return None;
    }

    let derived_name = dam_url
        .as_deref()
        .or(dynamic_url.as_deref())
        .or(publish_url.as_deref())
        .and_then(last_path_segment);
    let name = meta_str(meta, "name").or(derived_name);
    let format = mime_type
        .as_deref()
        .and_then(mime_subtype)
        .or_else(|| name.as_deref().and_then(extension));
    let path = meta_str(meta, "path").or_else(|| meta_str(meta, "_path"));

    Some(MediaObject {
        id: meta_id,
        size: meta_value(meta, "size"),
        name,
        title: meta_value(meta, "title"),
        media_type: effective_type,
        path,
        format,
        mime_type,
        dam_url,
        publish_url,
        dynamic_url,
        width: meta_value(meta, "width"),
        height: meta_value(meta, "height"),
    })
}

/// Explicit type, then MIME primary type, then an image file extension on the URL
pub fn infer_media_type(raw_type: Option<&str>, mime_type: Option<&str>, url: Option<&str>) -> Option<String> {
    if let Some(t) = raw_type.filter(|t| !t.is_empty()) {
        return Some(t.to_string());
    }
    if let Some(mime) = mime_type.filter(|m| m.contains('/')) {
        return mime.split('/').next().map(str::to_string);
    }
    let url = url?.split('?').next()?.to_lowercase();
    let ext = url.rsplit_once('.').map(|(_, ext)| ext)?;
    IMAGE_EXTENSIONS.contains(&ext).then(|| "image".to_string())
}

fn meta_str(meta: &Map<String, Value>, key: &str) -> Option<String> {
    meta.get(key).and_then(Value::as_str).map(str::to_string)
}

fn meta_value(meta: &Map<String, Value>, key: &str) -> Option<Value> {
    meta.get(key).filter(|v| !v.is_null()).cloned()
}

fn last_path_segment(url: &str) -> Option<String> {
    let last = url.rsplit('/').next()?;
    let name = last.split('?').next()?;
    (!name.is_empty()).then(|| name.to_string())
}

fn mime_subtype(mime: &str) -> Option<String> {
    let parts: Vec<&str> = mime.split('/').collect();
    (parts.len() == 2).then(|| parts[1].to_string())
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_string())
}
