//! Groups locale variants of the same content item and merges each pair into
//! one bilingual record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::constants::{
    secondary_key, BACKGROUND_META_FIELD, BACKGROUND_PATH_FIELD, BACKGROUND_TARGET_FIELD, IMAGE_TYPE, PATH_KEY,
    SECONDARY_ID_KEY, TECHNICAL_ID_KEY,
};
use crate::error::{MigratorError, Result};
use crate::observability::metrics;
use crate::pipeline::media::{compose_media, MediaFields};
use crate::pipeline::pattern::PathPattern;
use crate::types::{string_field, LocaleRole, MergedRecord, SourceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationMethod {
    ByIdentifier,
    ByPath,
}

/// How records are paired up, with the parameters each strategy needs
#[derive(Debug, Clone)]
pub enum AggregationStrategy {
    ByIdentifier {
        primary_aggregator: String,
        secondary_aggregator: String,
    },
    ByPath {
        source_pattern: String,
        translation_pattern: String,
    },
}

impl AggregationStrategy {
    pub fn method(&self) -> AggregationMethod {
        match self {
            AggregationStrategy::ByIdentifier { .. } => AggregationMethod::ByIdentifier,
            AggregationStrategy::ByPath { .. } => AggregationMethod::ByPath,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregationParams {
    pub local_market: String,
    pub aggregation_property: String,
    pub strategy: AggregationStrategy,
}

impl AggregationParams {
    /// Reject blank parameters before any grouping happens
    pub fn validate(&self) -> Result<()> {
        if self.local_market.trim().is_empty() {
            return Err(MigratorError::InvalidInput("local market code is required".into()));
        }
        if self.aggregation_property.trim().is_empty() {
            return Err(MigratorError::InvalidInput("aggregation property name is required".into()));
        }
        match &self.strategy {
            AggregationStrategy::ByIdentifier {
                primary_aggregator,
                secondary_aggregator,
            } if primary_aggregator.trim().is_empty() || secondary_aggregator.trim().is_empty() => Err(
                MigratorError::InvalidInput("both primary and secondary aggregators are required".into()),
            ),
            AggregationStrategy::ByPath {
                source_pattern,
                translation_pattern,
            } if source_pattern.trim().is_empty() || translation_pattern.trim().is_empty() => Err(
                MigratorError::InvalidInput("both source and translation path patterns are required".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Result of one aggregation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOutcome {
    pub merged: Vec<MergedRecord>,
    pub total_groups: usize,
    pub not_matched_count: usize,
    pub non_matched_paths: Vec<String>,
}

impl AggregationOutcome {
    pub fn merged_count(&self) -> usize {
        self.merged.len()
    }
}

/// Records sharing one base key
#[derive(Default)]
struct Group<'a> {
    primary: Option<&'a SourceRecord>,
    secondary: Option<&'a SourceRecord>,
    members: Vec<&'a SourceRecord>,
}

impl<'a> Group<'a> {
    fn add_member(&mut self, record: &'a SourceRecord) {
        if !self.members.iter().any(|m| std::ptr::eq(*m, record)) {
            self.members.push(record);
        }
    }
}

/// Insertion-ordered collection of groups
#[derive(Default)]
struct Groups<'a> {
    order: Vec<Group<'a>>,
    index: HashMap<String, usize>,
}

impl<'a> Groups<'a> {
    fn entry(&mut self, key: &str) -> &mut Group<'a> {
        let idx = match self.index.get(key) {
            Some(idx) => *idx,
            None => {
                self.order.push(Group::default());
                self.index.insert(key.to_string(), self.order.len() - 1);
                self.order.len() - 1
            }
        };
        &mut self.order[idx]
    }
}

#[instrument(skip(records, params), fields(method = ?params.strategy.method(), market = %params.local_market))]
pub fn aggregate(records: &[SourceRecord], params: &AggregationParams) -> Result<AggregationOutcome> {
    params.validate()?;
    let property = params.aggregation_property.as_str();

    let groups = match &params.strategy {
        AggregationStrategy::ByIdentifier {
            primary_aggregator,
            secondary_aggregator,
        } => group_by_identifier(
            records,
            &params.local_market,
            property,
            language_code(primary_aggregator),
            language_code(secondary_aggregator),
        ),
        AggregationStrategy::ByPath {
            source_pattern,
            translation_pattern,
        } => group_by_path(
            records,
            &PathPattern::compile(source_pattern)?,
            &PathPattern::compile(translation_pattern)?,
        ),
    };

    let mut outcome = AggregationOutcome {
        total_groups: groups.order.len(),
        ..Default::default()
    };

    for group in groups.order {
        match (group.primary, group.secondary) {
            (Some(primary), Some(secondary)) => {
                outcome.merged.push(merge_pair(primary, secondary, property));
            }
            _ => {
                outcome.not_matched_count += 1;
                outcome
                    .non_matched_paths
                    .extend(group.members.iter().filter_map(|r| record_path(r, property)));
            }
        }
    }

    metrics::aggregation::groups_formed(outcome.total_groups);
    metrics::aggregation::records_merged(outcome.merged_count());
    metrics::aggregation::groups_unmatched(outcome.not_matched_count);
    info!(
        "✅ Aggregated {} records into {} groups ({} merged, {} not matched)",
        records.len(),
        outcome.total_groups,
        outcome.merged_count(),
        outcome.not_matched_count
    );
    Ok(outcome)
}

/// Language segment of an aggregator code such as `al-en`
fn language_code(aggregator: &str) -> &str {
    aggregator.split('-').nth(1).unwrap_or(aggregator)
}

fn group_by_identifier<'a>(
    records: &'a [SourceRecord],
    market: &str,
    property: &str,
    primary_lang: &str,
    secondary_lang: &str,
) -> Groups<'a> {
    let market_prefix = format!("{market}-");
    let primary_prefix = format!("{market}-{primary_lang}-");
    let secondary_prefix = format!("{market}-{secondary_lang}-");
    let mut groups = Groups::default();

    for record in records {
        let Some(id) = record.get(property).and_then(|v| v.as_str()) else {
            continue;
        };
        if !id.starts_with(&market_prefix) {
            continue;
        }
        let segments: Vec<&str> = id.split('-').collect();
        if segments.len() < 3 {
            debug!("Dropping '{}': fewer than 3 identifier segments", id);
            continue;
        }
        let base_key = segments[2..].join("-");
        let group = groups.entry(&base_key);
        group.add_member(record);
        if group.primary.is_none() && id.starts_with(&primary_prefix) {
            group.primary = Some(record);
        }
        if group.secondary.is_none() && id.starts_with(&secondary_prefix) {
            group.secondary = Some(record);
        }
    }
    groups
}

fn group_by_path<'a>(records: &'a [SourceRecord], source: &PathPattern, translation: &PathPattern) -> Groups<'a> {
    let mut groups = Groups::default();

    for record in records {
        let Some(path) = record.get(PATH_KEY).and_then(|v| v.as_str()) else {
            continue;
        };
        if let Some(key) = source.capture(path) {
            let group = groups.entry(key);
            group.add_member(record);
            group.primary.get_or_insert(record);
        }
        if let Some(key) = translation.capture(path) {
            let group = groups.entry(key);
            group.add_member(record);
            group.secondary.get_or_insert(record);
        }
        if source.capture(path).is_none() && translation.capture(path).is_none() {
            debug!("Path '{}' matches neither pattern", path);
        }
    }
    groups
}

/// Diagnostic path of a record: `_path`, else its aggregation identifier
fn record_path(record: &SourceRecord, property: &str) -> Option<String> {
    string_field(record, PATH_KEY)
        .or_else(|| string_field(record, property))
        .map(str::to_string)
}

/// Primary fields verbatim, secondary fields under `<key>_secondary`
fn merge_pair(primary: &SourceRecord, secondary: &SourceRecord, property: &str) -> MergedRecord {
    let mut merged = primary.clone();
    for (key, value) in secondary {
        if key == property || key == PATH_KEY || key.starts_with('_') {
            continue;
        }
        merged.insert(secondary_key(key), value.clone());
    }
    if let Some(secondary_id) = string_field(secondary, TECHNICAL_ID_KEY) {
        merged.insert(SECONDARY_ID_KEY.to_string(), secondary_id.into());
    }

    let background = MediaFields {
        meta_field: BACKGROUND_META_FIELD,
        path_field: BACKGROUND_PATH_FIELD,
        required_type: Some(IMAGE_TYPE),
    };
    // Derived summaries never replace a field the records already carry
    if let Some(media) = compose_media(primary, background, LocaleRole::Primary) {
        merged
            .entry(BACKGROUND_TARGET_FIELD.to_string())
            .or_insert_with(|| media.summary());
    }
    if let Some(media) = compose_media(secondary, background, LocaleRole::Primary) {
        merged
            .entry(secondary_key(BACKGROUND_TARGET_FIELD))
            .or_insert_with(|| media.summary());
    }
    merged
}
