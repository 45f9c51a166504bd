use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use helpdesk_config::AppConfig;
use helpdesk_observability::{init_tracing, TracingConfig};

mod chunker;
mod pipeline;
mod source;

use pipeline::SyncPipeline;

/// Synchronize tickets, KB articles, and configuration items from the source
/// store into the vector index and the knowledge graph.
#[derive(Parser, Debug)]
#[command(name = "sync")]
struct Args {
    /// Only sync tickets updated within the last N hours (default 24).
    #[arg(long)]
    since_hours: Option<i64>,

    /// Maximum number of tickets to sync.
    #[arg(long)]
    limit: Option<i64>,

    /// Shorthand for --since-hours 1.
    #[arg(long)]
    incremental: bool,

    /// Sync everything regardless of update time.
    #[arg(long)]
    full: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = AppConfig::from_env();
    let _guard = init_tracing(
        TracingConfig::for_service("sync").with_log_dir(config.log_dir.clone()),
    );

    let pool = match PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    let mut sync_pipeline = SyncPipeline::new(&config, pool);
    let result = if args.incremental {
        sync_pipeline.run_incremental().await
    } else {
        let since_hours = if args.full {
            None
        } else {
            Some(args.since_hours.unwrap_or(24))
        };
        sync_pipeline.run(since_hours, args.limit).await
    };

    match result {
        Ok(stats) => {
            info!(
                "Sync succeeded: {} tickets, {} KB articles, {} CI items, {} errors",
                stats.tickets_synced, stats.kb_synced, stats.ci_synced, stats.errors
            );
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            std::process::exit(1);
        }
    }
}
