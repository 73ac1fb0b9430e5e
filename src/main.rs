use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use content_migrator::app::{SendUseCase, TargetCmsPort};
use content_migrator::config::Config;
use content_migrator::constants::DEFAULT_AGGREGATION_PROPERTY;
use content_migrator::infra::FsCms;
use content_migrator::migration::{ListFilter, MigrationStatus, MigrationStore, SqliteMigrationStore};
use content_migrator::observability::init_logging;
use content_migrator::pipeline::{
    aggregate, build_artifact, unmet_dependencies, write_artifact, AggregationParams, AggregationStrategy,
    ArtifactMeta, ExportDocument, SchemaDescriptor,
};
use content_migrator::types::{string_field, tracking_id, MergedRecord};

#[derive(Parser)]
#[command(name = "content_migrator")]
#[command(about = "Merge bilingual content exports and migrate them into a target CMS")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    ByIdentifier,
    ByPath,
}

#[derive(Subcommand)]
enum Commands {
    /// Pair locale variants of an export and write the merged artifact
    Merge {
        /// Export JSON file
        #[arg(long)]
        input: PathBuf,
        /// Where to write the merged artifact
        #[arg(long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value = "by-identifier")]
        method: Method,
        /// Local market code, e.g. AL
        #[arg(long)]
        market: Option<String>,
        /// Record property holding the aggregation key
        #[arg(long, default_value = DEFAULT_AGGREGATION_PROPERTY)]
        property: String,
        /// Primary-locale id prefix (by-identifier)
        #[arg(long)]
        primary_aggregator: Option<String>,
        /// Secondary-locale id prefix (by-identifier)
        #[arg(long)]
        secondary_aggregator: Option<String>,
        /// Source path pattern with `*` wildcards (by-path)
        #[arg(long)]
        source_pattern: Option<String>,
        /// Translation path pattern with `*` wildcards (by-path)
        #[arg(long)]
        translation_pattern: Option<String>,
    },
    /// Print the target payloads a merged artifact would produce
    Preview {
        /// Merged artifact written by `merge`
        #[arg(long)]
        input: PathBuf,
        /// Mapping schema JSON file
        #[arg(long)]
        schema: PathBuf,
        /// Only records with these ids (comma-separated)
        #[arg(long)]
        ids: Option<String>,
    },
    /// Create or update target entries and record each attempt
    Send {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        ids: Option<String>,
        /// Send records whose referenced entities are not migrated yet
        #[arg(long)]
        force: bool,
    },
    /// List referenced entities that have not been migrated yet
    Deps {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        ids: Option<String>,
    },
    /// Show recorded migrations, newest first
    Logs {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        entity_type: Option<String>,
        #[arg(long)]
        operation: Option<String>,
        #[arg(long)]
        source_system: Option<String>,
        #[arg(long)]
        target_system: Option<String>,
        /// Started at or after (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_from)]
        from: Option<DateTime<Utc>>,
        /// Started at or before (RFC 3339 or YYYY-MM-DD, inclusive)
        #[arg(long, value_parser = parse_to)]
        to: Option<DateTime<Utc>>,
        /// Case-insensitive text search
        #[arg(long)]
        search: Option<String>,
        /// Only attempts tagged with this trace id
        #[arg(long, conflicts_with_all = ["status", "entity_type", "operation", "search"])]
        trace: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

fn parse_timestamp(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is neither RFC 3339 nor YYYY-MM-DD"))?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    Ok(time.context("invalid time of day")?.and_utc())
}

fn parse_from(raw: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(raw, false)
}

fn parse_to(raw: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(raw, true)
}

fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path).context("loading configuration")?;
    config
        .apply_overrides(|key| std::env::var(key).ok())
        .context("applying environment overrides")?;
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<SqliteMigrationStore>> {
    let store = SqliteMigrationStore::open(&config.migration.database_path)
        .with_context(|| format!("opening migration log at {}", config.migration.database_path))?;
    Ok(Arc::new(store))
}

/// Merged records of an artifact, optionally narrowed to the given ids
fn load_records(input: &Path, ids: Option<&str>) -> Result<Vec<MergedRecord>> {
    let doc = ExportDocument::load(input)?;
    let wanted: Option<Vec<&str>> = ids.map(|list| list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect());
    let records = doc
        .records()
        .into_iter()
        .filter(|r| match &wanted {
            Some(ids) => ids
                .iter()
                .any(|id| tracking_id(r) == Some(*id) || string_field(r, "id") == Some(*id)),
            None => true,
        })
        .collect::<Vec<_>>();
    if records.is_empty() {
        warn!("No records selected from {}", input.display());
    }
    Ok(records)
}

fn record_label(record: &MergedRecord) -> &str {
    string_field(record, "id").or_else(|| tracking_id(record)).unwrap_or("<no id>")
}

#[allow(clippy::too_many_arguments)]
fn run_merge(
    config: &Config,
    input: &Path,
    output: &Path,
    method: Method,
    market: Option<String>,
    property: String,
    primary_aggregator: Option<String>,
    secondary_aggregator: Option<String>,
    source_pattern: Option<String>,
    translation_pattern: Option<String>,
) -> Result<()> {
    let local_market = market
        .or_else(|| config.locales.market.clone())
        .context("a market code is required (--market or locales.market)")?;
    let strategy = match method {
        Method::ByIdentifier => AggregationStrategy::ByIdentifier {
            primary_aggregator: primary_aggregator.context("--primary-aggregator is required")?,
            secondary_aggregator: secondary_aggregator.context("--secondary-aggregator is required")?,
        },
        Method::ByPath => AggregationStrategy::ByPath {
            source_pattern: source_pattern.context("--source-pattern is required")?,
            translation_pattern: translation_pattern.context("--translation-pattern is required")?,
        },
    };
    let params = AggregationParams {
        local_market,
        aggregation_property: property,
        strategy,
    };

    let doc = ExportDocument::load(input)?;
    let outcome = aggregate(&doc.records(), &params)?;
    let meta = ArtifactMeta::new(params.strategy.method(), &params.local_market, &outcome);
    let artifact = build_artifact(&doc, &outcome, meta)?;
    write_artifact(output, &artifact)?;

    println!("\n📊 Merge results:");
    println!("   Groups: {}", outcome.total_groups);
    println!("   Merged: {}", outcome.merged_count());
    println!("   Not matched: {}", outcome.not_matched_count);
    for path in &outcome.non_matched_paths {
        println!("   - {}", path);
    }
    println!("   Output file: {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.logging.dir);

    match cli.command {
        Commands::Merge {
            input,
            output,
            method,
            market,
            property,
            primary_aggregator,
            secondary_aggregator,
            source_pattern,
            translation_pattern,
        } => {
            println!("🔄 Merging {}...", input.display());
            run_merge(
                &config,
                &input,
                &output,
                method,
                market,
                property,
                primary_aggregator,
                secondary_aggregator,
                source_pattern,
                translation_pattern,
            )?;
        }
        Commands::Preview { input, schema, ids } => {
            let schema = SchemaDescriptor::load(&schema)?;
            let records = load_records(&input, ids.as_deref())?;
            let store = open_store(&config)?;
            let target: Arc<dyn TargetCmsPort> = Arc::new(FsCms::new(&config.target.entries_dir));
            let use_case = SendUseCase::new(schema, store, target, config.send_settings());

            let mut payloads = Vec::new();
            for record in &records {
                match use_case.prepare(record).await {
                    Ok(payload) => payloads.push(payload),
                    Err(e) => println!("⚠️  {}: {}", record_label(record), e),
                }
            }
            println!("{}", serde_json::to_string_pretty(&payloads)?);
        }
        Commands::Send {
            input,
            schema,
            ids,
            force,
        } => {
            let schema = SchemaDescriptor::load(&schema)?;
            let records = load_records(&input, ids.as_deref())?;
            let store = open_store(&config)?;
            let target: Arc<dyn TargetCmsPort> = Arc::new(FsCms::new(&config.target.entries_dir));
            let mut settings = config.send_settings();
            settings.allow_unmet_dependencies = force;
            let use_case = SendUseCase::new(schema, store, target, settings);

            println!("🚀 Sending {} records...", records.len());
            let summary = use_case.send_all(&records).await;
            for report in &summary.succeeded {
                println!("✅ {} {} (v{})", report.operation, report.entry.id, report.entry.version);
            }
            for (id, message) in &summary.failed {
                println!("❌ {}: {}", id, message);
            }
            info!("Send complete");
            if !summary.failed.is_empty() {
                bail!("{} of {} records failed", summary.failed.len(), records.len());
            }
        }
        Commands::Deps { input, ids } => {
            let records = load_records(&input, ids.as_deref())?;
            let store = open_store(&config)?;
            for record in &records {
                let unmet = unmet_dependencies(store.as_ref(), &config.migration.source_system, record).await?;
                if unmet.is_empty() {
                    println!("✅ {}: all dependencies migrated", record_label(record));
                    continue;
                }
                println!("⏳ {}: {} pending", record_label(record), unmet.len());
                for dep in unmet {
                    println!("   - {} ({})", dep.id, dep.kind.as_deref().unwrap_or("unknown"));
                }
            }
        }
        Commands::Logs {
            status,
            entity_type,
            operation,
            source_system,
            target_system,
            from,
            to,
            search,
            trace,
            limit,
            offset,
        } => {
            let store = open_store(&config)?;
            if let Some(trace_id) = trace {
                let rows = store.find_by_trace(&trace_id).await?;
                println!("📜 {} migrations in trace {}", rows.len(), trace_id);
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            let filter = ListFilter {
                status: status.as_deref().map(str::parse::<MigrationStatus>).transpose()?,
                entity_type,
                operation,
                source_system,
                target_system,
                from,
                to,
                search,
            };
            let page = store.list(&filter, limit, offset).await?;
            println!("📜 {} of {} migrations", page.rows.len(), page.total_count);
            println!("{}", serde_json::to_string_pretty(&page.rows)?);
        }
    }

    Ok(())
}
