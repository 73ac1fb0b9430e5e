/// Field and system name constants shared across the pipeline stages

// Record keys
pub const DEFAULT_AGGREGATION_PROPERTY: &str = "id";
pub const TECHNICAL_ID_KEY: &str = "_id";
pub const PATH_KEY: &str = "_path";
pub const MODEL_KEY: &str = "_model";
pub const SECONDARY_SUFFIX: &str = "_secondary";
pub const SECONDARY_ID_KEY: &str = "_id_secondary";

// Background image composition on merged records
pub const BACKGROUND_META_FIELD: &str = "contentUrl";
pub const BACKGROUND_PATH_FIELD: &str = "contentUrl_dm";
pub const BACKGROUND_TARGET_FIELD: &str = "backgroundImage";
pub const IMAGE_TYPE: &str = "image";

// Reference resolution
pub const DEFAULT_REFERENCE_FIELD: &str = "items";
/// Shortest `_id` considered a plausible content reference
pub const MIN_REFERENCE_ID_LEN: usize = 8;

// Default systems and locales
pub const DEFAULT_SOURCE_SYSTEM: &str = "aem";
pub const DEFAULT_TARGET_SYSTEM: &str = "contentful";
pub const DEFAULT_PRIMARY_LOCALE: &str = "en-US";
pub const DEFAULT_SECONDARY_LOCALE: &str = "en-GB";

/// Build the `<key>_secondary` name for a field
pub fn secondary_key(key: &str) -> String {
    format!("{key}{SECONDARY_SUFFIX}")
}
