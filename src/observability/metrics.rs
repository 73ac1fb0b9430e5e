//! Metrics for the merge, build and migration phases
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding process installs a recorder.

use std::fmt;

/// All metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Aggregation metrics
    AggregationGroupsFormed,
    AggregationRecordsMerged,
    AggregationGroupsUnmatched,

    // Build metrics
    BuildFieldsEmitted,
    BuildMediaComposed,
    BuildReferencesResolved,
    BuildReferencesOmitted,

    // Migration metrics
    MigrationStarted,
    MigrationSucceeded,
    MigrationFailed,
    MigrationDuration,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::AggregationGroupsFormed => "cm_aggregation_groups_formed_total",
            MetricName::AggregationRecordsMerged => "cm_aggregation_records_merged_total",
            MetricName::AggregationGroupsUnmatched => "cm_aggregation_groups_unmatched_total",

            MetricName::BuildFieldsEmitted => "cm_build_fields_emitted_total",
            MetricName::BuildMediaComposed => "cm_build_media_composed_total",
            MetricName::BuildReferencesResolved => "cm_build_references_resolved_total",
            MetricName::BuildReferencesOmitted => "cm_build_references_omitted_total",

            MetricName::MigrationStarted => "cm_migration_started_total",
            MetricName::MigrationSucceeded => "cm_migration_succeeded_total",
            MetricName::MigrationFailed => "cm_migration_failed_total",
            MetricName::MigrationDuration => "cm_migration_duration_ms",
        }
    }
}

pub mod aggregation {
    use super::MetricName;

    pub fn groups_formed(count: usize) {
        ::metrics::counter!(MetricName::AggregationGroupsFormed.as_str()).increment(count as u64);
    }

    pub fn records_merged(count: usize) {
        ::metrics::counter!(MetricName::AggregationRecordsMerged.as_str()).increment(count as u64);
    }

    pub fn groups_unmatched(count: usize) {
        ::metrics::counter!(MetricName::AggregationGroupsUnmatched.as_str()).increment(count as u64);
    }
}

pub mod build {
    use super::MetricName;

    /// Record the number of target fields emitted for one record
    pub fn fields_emitted(content_type: &str, count: usize) {
        ::metrics::counter!(MetricName::BuildFieldsEmitted.as_str(), "content_type" => content_type.to_string())
            .increment(count as u64);
    }

    pub fn media_composed() {
        ::metrics::counter!(MetricName::BuildMediaComposed.as_str()).increment(1);
    }

    pub fn references_resolved(count: usize) {
        ::metrics::counter!(MetricName::BuildReferencesResolved.as_str()).increment(count as u64);
    }

    pub fn references_omitted(count: usize) {
        ::metrics::counter!(MetricName::BuildReferencesOmitted.as_str()).increment(count as u64);
    }
}

pub mod migration {
    use super::MetricName;

    pub fn started(entity_type: &str, operation: &str) {
        ::metrics::counter!(
            MetricName::MigrationStarted.as_str(),
            "entity_type" => entity_type.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }

    pub fn succeeded(duration_ms: i64) {
        ::metrics::counter!(MetricName::MigrationSucceeded.as_str()).increment(1);
        ::metrics::histogram!(MetricName::MigrationDuration.as_str()).record(duration_ms as f64);
    }

    pub fn failed(duration_ms: i64) {
        ::metrics::counter!(MetricName::MigrationFailed.as_str()).increment(1);
        ::metrics::histogram!(MetricName::MigrationDuration.as_str()).record(duration_ms as f64);
    }
}
