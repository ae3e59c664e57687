//! viewsnap snapshot compaction command.
//!
//! Invoked on a schedule by an external scheduler (cron or similar); runs a
//! single compaction pass and exits. Exit status is non-zero on any
//! unhandled failure, and the final success marker is only logged on full
//! completion.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use common::config::Configuration;
use compactor::{
    CompactionJob, CompactionMetrics, RetentionRuleSet, SqlSnapshotStore, SqlTimePointSelector,
};
use sqlx::postgres::PgPoolOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "viewsnap.toml")]
    config: String,

    /// Log deletions without executing them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    // Load configuration
    let config = if std::path::Path::new(&args.config).exists() {
        Configuration::load_from_path(std::path::Path::new(&args.config))
            .context("Failed to load configuration")?
    } else {
        log::info!("Configuration file not found, using defaults");
        Configuration::default()
    };

    if !config.compaction.enabled {
        log::info!("Compaction is disabled in configuration (compaction.enabled = false)");
        log::info!("Set VIEWSNAP__COMPACTION__ENABLED=true or enable in config file to run");
        return Ok(());
    }

    // Validate the rule table before touching any data
    let rule_set =
        RetentionRuleSet::from_config(&config.compaction).context("Invalid retention rules")?;

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database.dsn)
        .await
        .context("Failed to connect to snapshot database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let dry_run = args.dry_run || config.compaction.dry_run;
    let metrics = CompactionMetrics::new();
    let job = CompactionJob::new(
        rule_set,
        SqlTimePointSelector::new(pool.clone()),
        SqlSnapshotStore::new(pool),
        metrics.clone(),
        dry_run,
    );

    log::info!("***** Compressing snapshots *****");

    let result = job.compact(Utc::now()).await?;

    metrics.summary().log();
    log::info!(
        "Compaction completed: {} snapshots deleted across {} rules ({} periods)",
        result.snapshots_deleted,
        result.rules_applied,
        result.periods_compacted
    );
    log::info!("OK");

    Ok(())
}
