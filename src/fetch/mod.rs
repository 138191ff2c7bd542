//! Fetch module: concurrent fetching with pagination and retry
//!
//! This module contains the fetch layer used by every extraction task:
//! - `Frontier`: deduplicating work queue fed by seeds and pagination
//! - `WorkerPool`: bounded workers retrying each URL a fixed number of times
//! - `pagination`: computes follow-up page URLs from a first page
//! - `ResultSink`: in-memory or file-per-response accumulation
//! - `Fetcher`: the caller-facing entry point tying them to the failure store

mod client;
mod frontier;
mod pagination;
mod pool;
mod progress;
mod sink;

pub use client::{build_http_client, decode_html, decode_json, fetch_once, AttemptFailure};
pub use frontier::Frontier;
pub use pagination::{expand, expand_payload, PaginationLinks};
pub use pool::{PoolSettings, WorkerPool};
pub use progress::{Progress, ProgressSnapshot};
pub use sink::{payload_file_name, FetchResults, FetchedPayload, ResultSink, SinkContents, SinkMode};

use crate::config::{Config, FetcherConfig};
use crate::state::{FetchFailure, FetchRequest, PayloadKind};
use crate::storage::{FailureStore, SharedStore};
use crate::Result;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

/// One task's worth of work for the fetcher
#[derive(Debug, Clone)]
pub struct FetchJob {
    /// Task name; failures are tracked per task
    pub task: String,
    pub batch_id: i64,
    /// Seed URLs computed for this run
    pub urls: Vec<String>,
    pub kind: PayloadKind,
    pub follow_pagination: bool,
    pub mode: SinkMode,
}

impl FetchJob {
    /// Creates a JSON, in-memory job that follows pagination
    pub fn new(task: impl Into<String>, batch_id: i64, urls: Vec<String>) -> Self {
        Self {
            task: task.into(),
            batch_id,
            urls,
            kind: PayloadKind::Json,
            follow_pagination: true,
            mode: SinkMode::Memory,
        }
    }

    pub fn kind(mut self, kind: PayloadKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn follow_pagination(mut self, follow: bool) -> Self {
        self.follow_pagination = follow;
        self
    }

    pub fn mode(mut self, mode: SinkMode) -> Self {
        self.mode = mode;
        self
    }
}

/// What a fetch produced
#[derive(Debug)]
pub struct FetchReport {
    /// Successful payloads or file paths
    pub results: FetchResults,
    /// URLs that exhausted their attempts, now recorded as pending
    pub failures: Vec<FetchFailure>,
    /// Pending records deleted because their URL succeeded
    pub resolved: usize,
    /// Distinct seed URLs (job URLs plus pending ones)
    pub requested: usize,
    /// Pending URLs loaded from the store before the run
    pub pending_loaded: usize,
}

/// Caller-facing fetch entry point
pub struct Fetcher {
    client: Client,
    settings: FetcherConfig,
    store: SharedStore,
}

impl Fetcher {
    /// Creates a fetcher from the loaded configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Process configuration; only `fetcher` and `user-agent` are used
    /// * `store` - Failure store shared with the caller
    pub fn new(config: &Config, store: SharedStore) -> Result<Self> {
        let client = build_http_client(&config.user_agent, &config.fetcher)?;
        Ok(Self {
            client,
            settings: config.fetcher.clone(),
            store,
        })
    }

    fn store(&self) -> MutexGuard<'_, dyn FailureStore + Send + 'static> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches every URL of a job, plus the task's pending failures
    ///
    /// Terminal failures are recorded in the store before returning, even
    /// when the run is aborted by a pagination error.
    ///
    /// # Returns
    ///
    /// * `Ok(FetchReport)` - The run drained; some URLs may have failed
    /// * `Err(ColetaError)` - The run was aborted
    pub async fn fetch(&self, job: FetchJob) -> Result<FetchReport> {
        let task_id: Arc<str> = Arc::from(job.task.as_str());

        let pending = self.store().load_pending(&job.task)?;
        let pending_urls: HashSet<String> = pending.iter().map(|r| r.url.clone()).collect();
        if !pending.is_empty() {
            tracing::info!(
                "{}: resuming {} pending URL(s) from previous runs",
                job.task,
                pending.len()
            );
        }

        let mut seen = HashSet::new();
        let seeds: Vec<FetchRequest> = pending
            .iter()
            .map(|record| record.url.clone())
            .chain(job.urls.iter().cloned())
            .filter(|url| seen.insert(url.clone()))
            .map(|url| FetchRequest::new(url, Arc::clone(&task_id), job.batch_id))
            .collect();

        let frontier = Arc::new(Frontier::new());
        let requested = frontier.seed(seeds);

        tracing::info!("{}: fetching {} URL(s)", job.task, requested);

        let progress = Arc::new(Progress::new(
            job.task.clone(),
            requested,
            self.settings.progress_interval,
        ));
        let sink = Arc::new(ResultSink::new(job.mode.clone()));
        let pool = WorkerPool::new(
            self.client.clone(),
            PoolSettings {
                concurrency: self.settings.concurrency,
                max_attempts: self.settings.max_attempts,
                retry_delay: Duration::from_millis(self.settings.retry_delay_ms),
                kind: job.kind,
                follow_pagination: job.follow_pagination,
                page_parameter: self.settings.page_parameter.clone(),
            },
        );

        let run = pool
            .run(Arc::clone(&frontier), Arc::clone(&sink), Arc::clone(&progress))
            .await;
        progress.finish();

        let contents = sink.finalize();
        self.record_failures(&contents.failures)?;
        run?;

        let resolved = if self.settings.resolve_on_success {
            self.resolve_succeeded(&job.task, &contents.succeeded, &pending_urls)?
        } else {
            0
        };

        tracing::info!(
            "{}: {} succeeded, {} failed, {} pending record(s) resolved",
            job.task,
            contents.results.len(),
            contents.failures.len(),
            resolved
        );

        Ok(FetchReport {
            results: contents.results,
            failures: contents.failures,
            resolved,
            requested,
            pending_loaded: pending.len(),
        })
    }

    fn record_failures(&self, failures: &[FetchFailure]) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }

        let mut store = self.store();
        for failure in failures {
            store.record_failure(
                &failure.request.task_id,
                &failure.request.url,
                failure.request.batch_id,
                failure.kind,
                failure.attempts,
            )?;
        }
        tracing::warn!(
            "Recorded {} pending failure(s) for task {}",
            failures.len(),
            failures[0].request.task_id
        );
        Ok(())
    }

    fn resolve_succeeded(
        &self,
        task: &str,
        succeeded: &[FetchRequest],
        pending_urls: &HashSet<String>,
    ) -> Result<usize> {
        let mut store = self.store();
        let mut resolved = 0;
        for request in succeeded.iter().filter(|r| pending_urls.contains(&r.url)) {
            if store.resolve_failure(task, &request.url)? {
                resolved += 1;
            }
        }
        Ok(resolved)
    }
}
