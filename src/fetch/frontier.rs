//! URL frontier shared by the fetch workers
//!
//! The frontier holds the queue of requests still to be dispatched and the
//! processed set used to guarantee that no URL is fetched twice in one run.
//! A URL enters the processed set when a worker claims it after dequeue, so
//! the same URL may sit in the queue more than once; the claim discards the
//! extra copies.

use crate::state::FetchRequest;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FetchRequest>,
    processed: HashSet<String>,
    /// Requests handed out by `pop`/`next` and not yet `complete`d
    in_flight: usize,
    closed: bool,
}

/// Work queue of not-yet-processed URLs
#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the initial requests of a run
    ///
    /// Returns how many requests were accepted.
    pub fn seed<I>(&self, requests: I) -> usize
    where
        I: IntoIterator<Item = FetchRequest>,
    {
        requests
            .into_iter()
            .map(|request| self.push(request))
            .filter(|accepted| *accepted)
            .count()
    }

    /// Queues a request unless its URL was already processed
    ///
    /// Returns `false` when the push was a no-op.
    pub fn push(&self, request: FetchRequest) -> bool {
        {
            let mut state = self.lock();
            if state.closed || state.processed.contains(&request.url) {
                return false;
            }
            state.queue.push_back(request);
        }
        self.notify.notify_waiters();
        true
    }

    /// Takes the next queued request without waiting
    ///
    /// An empty result only means nothing is queued right now: requests in
    /// flight elsewhere may still push continuations. Every request returned
    /// here must be followed by a call to [`Frontier::complete`].
    pub fn pop(&self) -> Option<FetchRequest> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let request = state.queue.pop_front()?;
        state.in_flight += 1;
        Some(request)
    }

    /// Waits for the next request
    ///
    /// Returns `None` once the queue is empty and no request is in flight,
    /// or as soon as the frontier is closed.
    pub async fn next(&self) -> Option<FetchRequest> {
        loop {
            let notified = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(request) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(request);
                }
                if state.in_flight == 0 {
                    return None;
                }
                // Registered before the lock is released so a concurrent
                // `complete` or `push` cannot slip between check and wait.
                self.notify.notified()
            };
            notified.await;
        }
    }

    /// Marks a request handed out by `pop`/`next` as finished
    pub fn complete(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Adds a URL to the processed set
    ///
    /// Returns `false` if it was already there, in which case the caller
    /// holds a duplicate and must discard it.
    pub fn mark_processed(&self, url: &str) -> bool {
        let mut state = self.lock();
        if state.processed.contains(url) {
            return false;
        }
        state.processed.insert(url.to_string())
    }

    /// Whether `url` has already been claimed by a worker
    pub fn is_processed(&self, url: &str) -> bool {
        self.lock().processed.contains(url)
    }

    /// Stops handing out work; pending waiters return `None`
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear();
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Snapshot of every URL processed so far
    pub fn processed_urls(&self) -> HashSet<String> {
        self.lock().processed.clone()
    }
}
