// CLI Interface
//
// This module provides the command-line interface for LeConseil.

use crate::candidate::Candidate;
use crate::config::{EngineConfig, DEFAULT_CONFIG_FILE, MAX_WINDOW_DAYS};
use crate::engine::{GenerationReport, RecommendationEngine, Stores};
use anyhow::{Context, Result as AnyhowResult};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use lestockage::{
    Actor, CacheStore, EventCount, FeedbackStats, RecommendationStore, Storage,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// LeConseil - Product Recommendation Engine
#[derive(Parser, Debug)]
#[command(name = "leconseil")]
#[command(author = "LeConseil Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate, inspect, and attribute product recommendations", long_about = None)]
pub struct Cli {
    /// SQLite database path (overrides config and LECONSEIL_DB_PATH)
    #[arg(global = true, long = "db")]
    pub db_path: Option<PathBuf>,

    /// Directory containing .leconseil/config.toml (defaults to the current directory)
    #[arg(global = true, long = "config", short = 'c')]
    pub config_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(global = true, long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Print machine-readable JSON
    #[arg(global = true, long = "json")]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Exactly one of a user id or a session id
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ActorArgs {
    /// Authenticated user id
    #[arg(long = "user")]
    pub user: Option<i64>,

    /// Anonymous session id
    #[arg(long = "session")]
    pub session: Option<String>,
}

impl ActorArgs {
    fn into_actor(self) -> AnyhowResult<Actor> {
        match (self.user, self.session) {
            (Some(id), None) => Ok(Actor::user(id)),
            (None, Some(id)) => Ok(Actor::session(id)),
            _ => anyhow::bail!("pass exactly one of --user or --session"),
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database schema and write a default config file
    Init,

    /// Generate and persist recommendations for an actor
    Recommend {
        /// Actor to recommend for
        #[command(flatten)]
        actor: ActorArgs,

        /// Maximum number of recommendations
        #[arg(long = "limit")]
        limit: Option<usize>,
    },

    /// List products similar to a product
    Similar {
        /// Product id
        #[arg(long = "product")]
        product: i64,

        /// Maximum number of results
        #[arg(long = "limit")]
        limit: Option<usize>,
    },

    /// Attribute a click to a recommendation
    Click {
        /// Recommendation id
        #[arg(long = "id")]
        id: i64,
    },

    /// Attribute a purchase to every recommendation of a product for an actor
    Purchase {
        /// Product id
        #[arg(long = "product")]
        product: i64,

        /// Actor who purchased
        #[command(flatten)]
        actor: ActorArgs,
    },

    /// Show feedback statistics per recommendation type
    Stats {
        /// Count analytics events from this many days back
        #[arg(
            long = "days",
            default_value = "30",
            value_parser = clap::value_parser!(i64).range(0..=MAX_WINDOW_DAYS)
        )]
        days: i64,
    },

    /// Remove expired cache entries
    PurgeCache {
        /// Remove every entry, not only expired ones
        #[arg(long = "all")]
        all: bool,
    },
}

impl Cli {
    /// Run the CLI
    pub async fn run(self) -> AnyhowResult<()> {
        let config = self.resolve_config()?;
        init_logging_impl(self.verbose, &config.logging.level);
        debug!(db = %config.storage.db_path, "configuration resolved");

        let json = self.json;
        match self.command {
            Commands::Init => cmd_init_impl(config, self.config_dir, json).await,
            Commands::Recommend { actor, limit } => {
                cmd_recommend_impl(config, actor.into_actor()?, limit, json).await
            }
            Commands::Similar { product, limit } => {
                cmd_similar_impl(config, product, limit, json).await
            }
            Commands::Click { id } => cmd_click_impl(config, id, json).await,
            Commands::Purchase { product, actor } => {
                cmd_purchase_impl(config, product, actor.into_actor()?, json).await
            }
            Commands::Stats { days } => cmd_stats_impl(config, days, json).await,
            Commands::PurgeCache { all } => cmd_purge_cache_impl(config, all, json).await,
        }
    }

    fn resolve_config(&self) -> AnyhowResult<EngineConfig> {
        let dir = config_dir(self.config_dir.clone())?;
        let mut config = EngineConfig::load(&dir)
            .with_context(|| format!("Failed to load {:?}", dir.join(DEFAULT_CONFIG_FILE)))?;
        config
            .apply_env()
            .context("Invalid LECONSEIL_* environment override")?;
        if let Some(db) = &self.db_path {
            config.storage.db_path = db.to_string_lossy().into_owned();
        }
        Ok(config)
    }
}

/// Initialize logging implementation
fn init_logging_impl(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn config_dir(explicit: Option<PathBuf>) -> AnyhowResult<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("Failed to read current directory"),
    }
}

/// Open the database and run `f` against an engine on the blocking pool
async fn with_engine<T, F>(config: EngineConfig, f: F) -> AnyhowResult<T>
where
    T: Send + 'static,
    F: FnOnce(&RecommendationEngine<'_>, &Storage) -> AnyhowResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let storage_config = config.storage.clone();
        let storage = Storage::open_with_config(&storage_config.db_path, storage_config.clone())
            .with_context(|| format!("Failed to open database {}", storage_config.db_path))?;
        let engine = RecommendationEngine::new(Stores::from_storage(&storage), config);
        f(&engine, &storage)
    })
    .await
    .context("Engine task failed")?
}

fn print_json<T: Serialize>(value: &T) -> AnyhowResult<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?);
    Ok(())
}

fn print_candidates(candidates: &[Candidate]) {
    for (i, candidate) in candidates.iter().enumerate() {
        println!(
            "{}. product {} [{}] score {:.4}",
            i + 1,
            candidate.product_id,
            candidate.kind,
            candidate.score
        );
        for reason in &candidate.reasoning {
            println!("   - {}", reason);
        }
    }
}

#[derive(Serialize)]
struct FeedbackOutput {
    affected_rows: usize,
}

#[derive(Serialize)]
struct StatsOutput {
    performance: Vec<FeedbackStats>,
    events: Vec<EventCount>,
}

/// Init command implementation
async fn cmd_init_impl(config: EngineConfig, dir: Option<PathBuf>, json: bool) -> AnyhowResult<()> {
    let dir = config_dir(dir)?;
    let config_path = dir.join(DEFAULT_CONFIG_FILE);
    if !config_path.exists() {
        config.save(&dir).context("Failed to write default configuration")?;
        info!(path = %config_path.display(), "configuration written");
    }

    let db_path = config.storage.db_path.clone();
    with_engine(config, |_, _| Ok(())).await?;

    if json {
        print_json(&serde_json::json!({
            "config": config_path.display().to_string(),
            "database": db_path,
        }))
    } else {
        println!("✓ Database ready: {}", db_path);
        println!("  Config: {}", config_path.display());
        Ok(())
    }
}

/// Recommend command implementation
async fn cmd_recommend_impl(
    config: EngineConfig,
    actor: Actor,
    limit: Option<usize>,
    json: bool,
) -> AnyhowResult<()> {
    let limit = limit.unwrap_or(config.aggregation.default_limit);
    info!(%actor, limit, "generating recommendations");

    let report: GenerationReport = with_engine(config, move |engine, _| {
        engine
            .generate_report(&actor, limit)
            .context("Recommendation generation failed")
    })
    .await?;

    if json {
        return print_json(&report);
    }

    if report.recommendations.is_empty() {
        println!("No recommendations available.");
    } else {
        print_candidates(&report.recommendations);
    }
    println!();
    for source in &report.per_source {
        println!("  {}: {} candidate(s)", source.kind, source.candidates);
    }
    for failed in &report.failed_sources {
        println!("  {}: skipped after a read failure", failed);
    }
    println!("  Persisted rows: {}", report.persisted_rows);
    Ok(())
}

/// Similar command implementation
async fn cmd_similar_impl(
    config: EngineConfig,
    product: i64,
    limit: Option<usize>,
    json: bool,
) -> AnyhowResult<()> {
    let similar = with_engine(config, move |engine, _| {
        engine
            .similar_products(product, limit)
            .context("Similarity lookup failed")
    })
    .await?;

    if json {
        return print_json(&similar);
    }
    if similar.is_empty() {
        println!("No similar products for {}.", product);
    } else {
        print_candidates(&similar);
    }
    Ok(())
}

/// Click command implementation
async fn cmd_click_impl(config: EngineConfig, id: i64, json: bool) -> AnyhowResult<()> {
    let affected_rows = with_engine(config, move |engine, _| {
        engine.feedback().record_click(id).context("Failed to record click")
    })
    .await?;

    if json {
        print_json(&FeedbackOutput { affected_rows })
    } else {
        println!("Click recorded ({} row(s) updated)", affected_rows);
        Ok(())
    }
}

/// Purchase command implementation
async fn cmd_purchase_impl(
    config: EngineConfig,
    product: i64,
    actor: Actor,
    json: bool,
) -> AnyhowResult<()> {
    let affected_rows = with_engine(config, move |engine, _| {
        engine
            .feedback()
            .record_purchase(product, &actor)
            .context("Failed to record purchase")
    })
    .await?;

    if json {
        print_json(&FeedbackOutput { affected_rows })
    } else {
        println!("Purchase recorded ({} row(s) updated)", affected_rows);
        Ok(())
    }
}

/// Stats command implementation
async fn cmd_stats_impl(config: EngineConfig, days: i64, json: bool) -> AnyhowResult<()> {
    let since = Duration::try_days(days)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .with_context(|| format!("--days {} is out of range", days))?;
    let stats = with_engine(config, move |_, storage| {
        Ok(StatsOutput {
            performance: storage.performance().context("Failed to read feedback totals")?,
            events: storage
                .count_events_by_name(since)
                .context("Failed to read analytics events")?,
        })
    })
    .await?;

    if json {
        return print_json(&stats);
    }

    if stats.performance.is_empty() {
        println!("No recommendations stored yet.");
    }
    for row in &stats.performance {
        println!(
            "{:<14} shown {:>6}  clicked {:>6}  purchased {:>6}  CTR {:>6.2}%  CVR {:>6.2}%",
            row.kind.as_str(),
            row.shown,
            row.clicked,
            row.purchased,
            row.click_through_rate() * 100.0,
            row.conversion_rate() * 100.0
        );
    }
    if !stats.events.is_empty() {
        println!("\nEvents (last {} days):", days);
        for event in &stats.events {
            println!("  {}: {}", event.name, event.count);
        }
    }
    Ok(())
}

/// Purge-cache command implementation
async fn cmd_purge_cache_impl(config: EngineConfig, all: bool, json: bool) -> AnyhowResult<()> {
    let removed = with_engine(config, move |_, storage| {
        let removed = if all {
            storage.clear()
        } else {
            storage.purge_expired(Utc::now())
        };
        removed.context("Failed to purge cache")
    })
    .await?;

    if json {
        print_json(&serde_json::json!({ "removed": removed }))
    } else {
        println!("Removed {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
        Ok(())
    }
}
