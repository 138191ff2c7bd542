//! Bounded fetch worker pool
//!
//! A fixed number of workers drain the frontier. Each worker:
//! 1. Waits for the next request (or exits when the run is drained)
//! 2. Claims the URL in the processed set, discarding duplicates
//! 3. Attempts the request up to `max_attempts` times, holding a semaphore
//!    permit for each attempt
//! 4. Expands pagination on JSON successes and pushes the new pages
//! 5. Hands the terminal outcome to the sink
//!
//! A pagination error closes the frontier and fails the whole run.

use crate::fetch::client::fetch_once;
use crate::fetch::frontier::Frontier;
use crate::fetch::pagination::expand_payload;
use crate::fetch::progress::Progress;
use crate::fetch::sink::ResultSink;
use crate::state::{FetchFailure, FetchOutcome, FetchRequest, PayloadKind};
use crate::{ColetaError, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-run settings of the pool
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub kind: PayloadKind,
    pub follow_pagination: bool,
    pub page_parameter: String,
}

/// State shared by every worker of one run
struct WorkerContext {
    client: Client,
    semaphore: Arc<Semaphore>,
    frontier: Arc<Frontier>,
    sink: Arc<ResultSink>,
    progress: Arc<Progress>,
    settings: PoolSettings,
}

pub struct WorkerPool {
    client: Client,
    settings: PoolSettings,
}

impl WorkerPool {
    pub fn new(client: Client, settings: PoolSettings) -> Self {
        Self { client, settings }
    }

    /// Drains the frontier and returns once every worker has stopped
    ///
    /// # Arguments
    ///
    /// * `frontier` - Seeded frontier; continuations are pushed back into it
    /// * `sink` - Receives one outcome per processed URL
    /// * `progress` - Completed/total counter of the run
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every dispatched URL reached a terminal outcome
    /// * `Err(ColetaError)` - The run was aborted (pagination contract
    ///   change, sink write error or a crashed worker)
    pub async fn run(
        &self,
        frontier: Arc<Frontier>,
        sink: Arc<ResultSink>,
        progress: Arc<Progress>,
    ) -> Result<()> {
        let concurrency = self.settings.concurrency.max(1);
        let context = Arc::new(WorkerContext {
            client: self.client.clone(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            frontier: Arc::clone(&frontier),
            sink,
            progress,
            settings: self.settings.clone(),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            workers.spawn(run_worker(worker_id, Arc::clone(&context)));
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => ColetaError::Worker(e.to_string()),
            };
            frontier.close();
            if first_error.is_none() {
                tracing::error!("Aborting fetch run: {}", error);
                first_error = Some(error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

async fn run_worker(worker_id: usize, context: Arc<WorkerContext>) -> Result<()> {
    tracing::trace!("Worker {} started", worker_id);

    while let Some(request) = context.frontier.next().await {
        let result = process_request(&context, request).await;
        context.frontier.complete();
        if let Err(e) = result {
            context.frontier.close();
            return Err(e);
        }
    }

    tracing::trace!("Worker {} finished", worker_id);
    Ok(())
}

async fn process_request(context: &WorkerContext, request: FetchRequest) -> Result<()> {
    if !context.frontier.mark_processed(&request.url) {
        tracing::trace!("Skipping duplicate {}", request.url);
        context.progress.discard();
        return Ok(());
    }

    let outcome = fetch_with_retries(context, request).await?;

    // Computed before the payload moves into the sink; applied after so the
    // page itself is collected even when its links turn out to be broken.
    let continuations = match &outcome {
        FetchOutcome::Success { payload, .. }
            if context.settings.follow_pagination && context.settings.kind == PayloadKind::Json =>
        {
            match payload.as_json() {
                Some(value) => expand_payload(value, &context.settings.page_parameter),
                None => Ok(Vec::new()),
            }
        }
        _ => Ok(Vec::new()),
    };
    let request = outcome.request().clone();

    context.sink.collect(outcome).await?;
    context.progress.complete();

    let continuations = continuations.map_err(|e| {
        tracing::error!("Pagination of {} failed: {}", request.url, e);
        e
    })?;

    let mut discovered = 0;
    for url in continuations {
        if context.frontier.push(request.continuation(url)) {
            discovered += 1;
        }
    }
    if discovered > 0 {
        tracing::debug!("{} expanded into {} more pages", request.url, discovered);
        context.progress.add(discovered);
    }

    Ok(())
}

/// Attempts one URL until it succeeds, fails terminally or runs out of attempts
async fn fetch_with_retries(context: &WorkerContext, request: FetchRequest) -> Result<FetchOutcome> {
    let max_attempts = context.settings.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = {
            let _permit = context
                .semaphore
                .acquire()
                .await
                .map_err(|e| ColetaError::Worker(e.to_string()))?;
            tracing::debug!("GET {} (attempt {}/{})", request.url, attempt, max_attempts);
            fetch_once(&context.client, &request.url, context.settings.kind).await
        };

        match result {
            Ok(payload) => return Ok(FetchOutcome::Success { request, payload }),
            Err(failure) if failure.kind.is_retryable() && attempt < max_attempts => {
                tracing::debug!(
                    "Attempt {}/{} for {} failed ({}), retrying",
                    attempt,
                    max_attempts,
                    request.url,
                    failure
                );
                if !context.settings.retry_delay.is_zero() {
                    tokio::time::sleep(context.settings.retry_delay).await;
                }
            }
            Err(failure) => {
                tracing::warn!(
                    "Giving up on {} after {} attempt(s): {}",
                    request.url,
                    attempt,
                    failure
                );
                return Ok(FetchOutcome::Failure(FetchFailure {
                    request,
                    kind: failure.kind,
                    attempts: attempt,
                    detail: failure.detail,
                }));
            }
        }
    }
}
