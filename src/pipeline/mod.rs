// Content pipeline: aggregation, field mapping, and reference resolution

pub mod aggregation;
pub mod builder;
pub mod export;
pub mod media;
pub mod pattern;
pub mod references;
pub mod schema;

// Re-export the stage entry points
pub use aggregation::{aggregate, AggregationMethod, AggregationOutcome, AggregationParams, AggregationStrategy};
pub use builder::build_fields;
pub use export::{build_artifact, write_artifact, ArtifactMeta, ExportDocument};
pub use references::{extract_dependencies, resolve_references, unmet_dependencies, Dependency};
pub use schema::SchemaDescriptor;
