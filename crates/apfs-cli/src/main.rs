use anyhow::Result;
use apfs_ingest::IngestConfig;
use apfs_store::ForecastStore;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "apfs-cli")]
#[command(about = "APFS forecast portal command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion pass: fetch the feed and upsert it into the store.
    Sync,
    /// Create the data table if it does not exist yet.
    Schema,
    /// Serve the dashboard.
    Serve,
    /// Run the cron scheduler until interrupted (requires
    /// APFS_SCHEDULER_ENABLED=1).
    Daemon,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = apfs_ingest::run_once_from_env().await?;
            println!("{}", serde_json::to_string(&summary)?);
        }
        Commands::Schema => {
            let config = IngestConfig::from_env();
            let store = ForecastStore::open(&config.database_url).await?;
            let outcome = store.ensure_schema().await;
            store.close().await;
            outcome?;
            println!("schema ensured in {}", config.database_url);
        }
        Commands::Serve => {
            apfs_web::serve_from_env().await?;
        }
        Commands::Daemon => {
            let config = IngestConfig::from_env();
            match apfs_ingest::maybe_build_scheduler(&config).await? {
                Some(mut sched) => {
                    sched.start().await?;
                    info!(cron = %config.sync_cron, "scheduler running; ctrl-c to stop");
                    tokio::signal::ctrl_c().await?;
                    sched.shutdown().await?;
                }
                None => {
                    eprintln!("scheduler disabled; set APFS_SCHEDULER_ENABLED=1");
                }
            }
        }
    }

    Ok(())
}
