//! High-level runner API for the bookstore query runner.
//!
//! This module provides a simplified public interface that hides connection
//! setup, the store backends and the report runner.
//!
//! This is the primary API for external users and for the CLI.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

use crate::catalog::ReportRunner;
use crate::db::{BookStore, ConnectArgs, ConnectArgsBuilder, MemoryStore, MongoStore};
use crate::seed::sample_documents;
use crate::telemetry::RunStats;

pub use crate::config::{
    Catalog, DEFAULT_COLLECTION, DEFAULT_DATABASE, DEFAULT_PAGE_SIZE, DEFAULT_URI, RunnerConfig,
};

/// Arguments for running the query catalog
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config: RunnerConfig,
    pub catalog: Catalog,

    /// Run against the built-in sample inventory in memory instead of a server
    pub dry_run: bool,
}

/// Result of a completed catalog run
#[derive(Debug)]
pub struct RunResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub operations_completed: usize,
    pub documents_returned: u64,
    pub documents_matched: u64,
    pub documents_modified: u64,
    pub documents_deleted: u64,
    pub indexes_ensured: usize,
    pub plans_explained: usize,
    pub plans_using_index: usize,
    pub duration: Duration,
    /// p50, p90 and p99 operation latency in milliseconds
    pub percentiles: (Option<u64>, Option<u64>, Option<u64>),
}

/// Run the whole operation catalog, writing the report to `out`
///
/// The connection is acquired once and released after the catalog finishes,
/// whether it succeeded or not. The first failing operation aborts the run.
///
/// # Example
///
/// ```no_run
/// use bookstore_queries::runner::{RunArgs, run_queries};
///
/// # async fn example() -> anyhow::Result<()> {
/// let result = run_queries(RunArgs::default(), std::io::stdout()).await?;
/// println!("Ran {} operations in {:?}", result.operations_completed, result.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_queries<W: Write>(args: RunArgs, out: W) -> Result<RunResult> {
    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now();
    let start = Instant::now();
    info!("Starting run {}", run_id);

    let stats = if args.dry_run {
        info!("Dry run: using the in-memory sample inventory");
        let store = MemoryStore::seeded()?;
        run_catalog(&store, args.catalog, out).await?
    } else {
        let store = MongoStore::connect(connect_args(&args.config)?).await?;
        let outcome = run_catalog(&store, args.catalog, out).await;
        store.close().await;
        outcome?
    };

    Ok(RunResult {
        run_id,
        started_at,
        operations_completed: stats.operations_completed,
        documents_returned: stats.documents_returned,
        documents_matched: stats.documents_matched,
        documents_modified: stats.documents_modified,
        documents_deleted: stats.documents_deleted,
        indexes_ensured: stats.indexes_ensured,
        plans_explained: stats.plans_explained,
        plans_using_index: stats.plans_using_index,
        duration: start.elapsed(),
        percentiles: stats.get_percentiles(),
    })
}

pub(crate) async fn run_catalog<S, W>(store: &S, catalog: Catalog, out: W) -> Result<RunStats>
where
    S: BookStore + ?Sized,
    W: Write,
{
    ReportRunner::new(store, catalog, out).run().await
}

/// Arguments for (re)creating the sample collection
#[derive(Debug, Clone, Default)]
pub struct SeedArgs {
    pub config: RunnerConfig,

    /// Insert on top of the current contents instead of dropping them first
    pub keep_existing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub inserted: u64,
    pub dropped: bool,
}

/// Load the sample inventory into the configured collection
pub async fn run_seed(args: SeedArgs) -> Result<SeedResult> {
    let store = MongoStore::connect(connect_args(&args.config)?).await?;
    let outcome = seed_collection(&store, args.keep_existing).await;
    store.close().await;
    outcome
}

pub(crate) async fn seed_collection<S: BookStore + ?Sized>(
    store: &S,
    keep_existing: bool,
) -> Result<SeedResult> {
    let dropped = if keep_existing {
        false
    } else {
        store
            .drop_collection()
            .await
            .with_context(|| format!("Failed to drop {}", store.namespace()))?;
        true
    };

    let inserted = store
        .insert_many(sample_documents()?)
        .await
        .with_context(|| format!("Failed to insert sample books into {}", store.namespace()))?;
    info!("Inserted {} books into {}", inserted, store.namespace());

    Ok(SeedResult { inserted, dropped })
}

fn connect_args(config: &RunnerConfig) -> Result<ConnectArgs> {
    Ok(ConnectArgsBuilder::default()
        .uri(config.uri.as_str())
        .database(config.database.as_str())
        .collection(config.collection.as_str())
        .build()?)
}
