//! Ingestion pipeline orchestration: one fetch, one full-batch upsert.
//!
//! A run is a single linear batch job. It opens its own store handle, pulls
//! the entire feed into memory, projects each raw element onto the stored
//! row shape, applies the batch in one transaction, and closes the handle
//! again on every exit path. Each scheduled invocation is independent and
//! idempotent, so the designed recovery for any failed run is simply the
//! next run.

use std::time::Duration;

use anyhow::{Context, Result};
use apfs_core::RawForecastRecord;
use apfs_feed::{BackoffPolicy, FeedClient, FeedClientConfig};
use apfs_store::ForecastStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "apfs-ingest";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_url: String,
    pub feed_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:data.db".to_string()),
            feed_url: std::env::var("APFS_FEED_URL")
                .unwrap_or_else(|_| apfs_feed::DEFAULT_FEED_URL.to_string()),
            user_agent: std::env::var("APFS_USER_AGENT")
                .unwrap_or_else(|_| "apfs-portal/0.1".to_string()),
            http_timeout_secs: std::env::var("APFS_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            scheduler_enabled: std::env::var("APFS_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: std::env::var("APFS_SYNC_CRON").unwrap_or_else(|_| "0 0 6 * * *".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched_records: usize,
    pub rows_written: usize,
}

/// One complete ingestion run: open store, ensure schema, fetch, project,
/// apply, close. A fetch or write failure aborts the run with zero (or
/// rolled-back) writes and leaves previously stored rows untouched.
pub async fn run_once(config: &IngestConfig) -> Result<RunSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    let span = info_span!("ingest_run", %run_id);

    async {
        let client = FeedClient::new(FeedClientConfig {
            feed_url: config.feed_url.clone(),
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            backoff: BackoffPolicy::default(),
        })
        .context("building feed client")?;

        let store = ForecastStore::open(&config.database_url)
            .await
            .with_context(|| format!("opening store {}", config.database_url))?;

        // The handle is scoped to this run; close on success and failure alike.
        let outcome = fetch_and_apply(&client, &store).await;
        store.close().await;
        let (fetched_records, rows_written) = outcome?;

        let finished_at = Utc::now();
        info!(fetched_records, rows_written, "ingest run complete");
        Ok(RunSummary {
            run_id,
            started_at,
            finished_at,
            fetched_records,
            rows_written,
        })
    }
    .instrument(span)
    .await
}

async fn fetch_and_apply(client: &FeedClient, store: &ForecastStore) -> Result<(usize, usize)> {
    store.ensure_schema().await.context("ensuring schema")?;
    let raw = client
        .fetch()
        .await
        .with_context(|| format!("fetching feed {}", client.feed_url()))?;
    let fetched = raw.len();
    let written = ingest_batch(store, raw).await?;
    Ok((fetched, written))
}

/// Project a fetched batch onto stored rows and apply it as one unit.
pub async fn ingest_batch(store: &ForecastStore, raw: Vec<RawForecastRecord>) -> Result<usize> {
    let records: Vec<_> = raw.into_iter().map(RawForecastRecord::into_record).collect();
    let written = store.apply(&records).await.context("applying batch")?;
    Ok(written)
}

pub async fn run_once_from_env() -> Result<RunSummary> {
    let config = IngestConfig::from_env();
    run_once(&config).await
}

/// Periodic ingestion behind an env flag. Each tick is a fresh, independent
/// run; a failed tick is logged and the next tick retries the whole feed.
pub async fn maybe_build_scheduler(config: &IngestConfig) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job_config = config.clone();
    let job = Job::new_async(config.sync_cron.as_str(), move |_uuid, _l| {
        let config = job_config.clone();
        Box::pin(async move {
            match run_once(&config).await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    rows_written = summary.rows_written,
                    "scheduled ingest run complete"
                ),
                Err(err) => error!(error = %err, "scheduled ingest run failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {}", config.sync_cron))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}
