use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{secondary_key, DEFAULT_PRIMARY_LOCALE, DEFAULT_SECONDARY_LOCALE, TECHNICAL_ID_KEY};

/// Raw content record as found in an export list
pub type SourceRecord = Map<String, Value>;

/// Bilingual record produced by the aggregation stage
pub type MergedRecord = Map<String, Value>;

/// Target field id -> locale code -> value
pub type TargetFieldMap = Map<String, Value>;

/// Which half of a locale pair a value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocaleRole {
    Primary,
    Secondary,
}

impl LocaleRole {
    pub const BOTH: [LocaleRole; 2] = [LocaleRole::Primary, LocaleRole::Secondary];
}

/// The two target locale codes a merged record is projected onto
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalePair {
    #[serde(rename = "primaryLocale")]
    pub primary: String,
    #[serde(rename = "secondaryLocale")]
    pub secondary: String,
}

impl LocalePair {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    pub fn code(&self, role: LocaleRole) -> &str {
        match role {
            LocaleRole::Primary => &self.primary,
            LocaleRole::Secondary => &self.secondary,
        }
    }
}

impl Default for LocalePair {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMARY_LOCALE, DEFAULT_SECONDARY_LOCALE)
    }
}

/// Read a top-level field for one side of a merged record.
///
/// The primary side reads `field` itself, the secondary side reads
/// `field_secondary`.
pub fn read_field<'a>(record: &'a MergedRecord, field: &str, role: LocaleRole) -> Option<&'a Value> {
    match role {
        LocaleRole::Primary => record.get(field),
        LocaleRole::Secondary => record.get(&secondary_key(field)),
    }
}

/// Non-empty string value of a field, trimmed
pub fn string_field<'a>(record: &'a SourceRecord, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Identifier used to track a record: the technical `_id` when present, else `id`
pub fn tracking_id(record: &SourceRecord) -> Option<&str> {
    string_field(record, TECHNICAL_ID_KEY).or_else(|| string_field(record, "id"))
}
