//! Reconciliation controller
//!
//! Workers pull resource keys from a [`WorkQueue`], run the adapter and the
//! sync executor, and hand the outcome to the status reporter. Per-key state
//! follows `Pending -> Syncing -> {Reported, Failed}`; retryable failures go
//! back to `Pending` behind an exponential backoff.

use crate::adapter::normalize;
use crate::backoff::BackoffPolicy;
use crate::error::CoreError;
use crate::executor::{SyncExecutor, SyncOutcome};
use crate::metrics::ControllerMetrics;
use crate::queue::WorkQueue;
use crate::reporter::{ReportOutcome, StatusReporter};
use crate::resource::{ResourceKey, StoredResource};
use crate::store::ResourceStore;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Waiting in the queue, or for a retry timer
    Pending,
    Syncing,
    /// Status for the current generation is recorded
    Reported,
    /// Sync failed with no retries left for this generation
    Failed,
}

#[derive(Clone, Debug)]
struct KeyState {
    phase: Phase,
    generation: Option<i64>,
    attempts: u32,
    /// Nothing left to do until a new generation or a resync
    settled: bool,
}

impl Default for KeyState {
    fn default() -> Self {
        Self {
            phase: Phase::Pending,
            generation: None,
            attempts: 0,
            settled: false,
        }
    }
}

pub struct Controller {
    store: Arc<dyn ResourceStore>,
    executor: SyncExecutor,
    reporter: StatusReporter,
    queue: WorkQueue<ResourceKey>,
    states: Mutex<HashMap<ResourceKey, KeyState>>,
    backoff: BackoffPolicy,
    metrics: ControllerMetrics,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        executor: SyncExecutor,
        reporter: StatusReporter,
        backoff: BackoffPolicy,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            store,
            executor,
            reporter,
            queue: WorkQueue::new(),
            states: Mutex::new(HashMap::new()),
            backoff,
            metrics,
        }
    }

    pub fn queue(&self) -> &WorkQueue<ResourceKey> {
        &self.queue
    }

    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    /// Current phase of `key`, `None` for unknown or deleted keys
    pub fn phase(&self, key: &ResourceKey) -> Option<Phase> {
        self.states.lock().get(key).map(|s| s.phase)
    }

    /// Handle a create or update event
    pub fn enqueue(&self, key: ResourceKey) {
        {
            let mut states = self.states.lock();
            let state = states.entry(key.clone()).or_default();
            if state.phase != Phase::Syncing {
                state.phase = Phase::Pending;
            }
        }
        self.queue.add(key);
        self.metrics.work_queue_depth.set(self.queue.len() as i64);
    }

    /// Handle a delete event, cancelling any pending retry for the key
    pub fn enqueue_deleted(&self, key: ResourceKey) {
        self.queue.forget(&key);
        if let Some(state) = self.states.lock().get_mut(&key) {
            state.settled = false;
        }
        self.enqueue(key);
    }

    /// Re-apply every known resource regardless of generation
    pub fn resync(&self) {
        let keys: Vec<ResourceKey> = {
            let mut states = self.states.lock();
            for state in states.values_mut() {
                state.settled = false;
                state.attempts = 0;
            }
            states.keys().cloned().collect()
        };
        debug!("Resyncing {} resources", keys.len());
        for key in keys {
            self.enqueue(key);
        }
    }

    /// Run `workers` workers until [`Controller::shutdown`] is called
    pub async fn run(self: Arc<Self>, workers: usize) {
        info!("Starting reconciliation with {} workers", workers);
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let controller = self.clone();
                tokio::spawn(async move { controller.worker(id).await })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
            }
        }
        info!("Reconciliation stopped");
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    async fn worker(&self, id: usize) {
        while let Some(key) = self.queue.next().await {
            self.metrics.work_queue_depth.set(self.queue.len() as i64);
            let processed = AssertUnwindSafe(self.process(&key)).catch_unwind().await;
            if processed.is_err() {
                error!("Worker {} panicked while reconciling {}", id, key);
                self.count(&key, "error");
                self.settle(&key, Phase::Failed);
            }
            self.queue.done(&key);
        }
        debug!("Worker {} stopped", id);
    }

    /// Reconcile one key: sync the current generation and report its status
    pub async fn process(&self, key: &ResourceKey) {
        let kind = key.kind.as_str();
        let _timer = self
            .metrics
            .reconcile_duration_seconds
            .with_label_values(&[kind])
            .start_timer();

        let stored = match self.store.get(key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return self.cleanup(key).await,
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                self.count(key, "error");
                return self.retry_or_fail(key, &e);
            }
        };

        if !self.begin(key, &stored) {
            debug!("{} is up to date at generation {}", key, stored.generation);
            self.count(key, "skipped");
            return;
        }

        let outcome = match normalize(key, &stored.object) {
            Ok(resource) => self.executor.apply(&resource).await,
            Err(e) => {
                warn!("{} is invalid: {}", key, e);
                SyncOutcome::failed(e)
            }
        };

        let report = self.reporter.report(key, &outcome, stored.generation).await;
        match &report {
            Ok(written) => {
                self.metrics
                    .status_writes_total
                    .with_label_values(&[report_label(*written)])
                    .inc();
            }
            Err(e) => {
                warn!("Failed to report status of {}: {}", key, e);
                self.metrics
                    .status_writes_total
                    .with_label_values(&["error"])
                    .inc();
            }
        }

        match (report, outcome.error()) {
            (Ok(ReportOutcome::Stale), _) => {
                // The newer generation gets its own pass
                self.set_phase(key, Phase::Pending);
                self.queue.add(key.clone());
                self.count(key, "stale");
            }
            (Ok(ReportOutcome::Deleted), _) => self.cleanup(key).await,
            (Err(e), _) => {
                self.count(key, "error");
                self.retry_or_fail(key, &e);
            }
            (Ok(_), None) => {
                info!("Reconciled {} at generation {}", key, stored.generation);
                self.settle(key, Phase::Reported);
                self.count(key, "success");
            }
            (Ok(_), Some(e)) => {
                self.count(key, "failed");
                self.retry_or_fail(key, e);
            }
        }
    }

    // Marks the key syncing; false when the stored generation is already settled
    fn begin(&self, key: &ResourceKey, stored: &StoredResource) -> bool {
        let mut states = self.states.lock();
        let state = states.entry(key.clone()).or_default();
        if state.generation == Some(stored.generation) && state.settled {
            return false;
        }
        if state.generation != Some(stored.generation) {
            state.generation = Some(stored.generation);
            state.attempts = 0;
        }
        state.settled = false;
        state.phase = Phase::Syncing;
        true
    }

    fn retry_or_fail(&self, key: &ResourceKey, err: &CoreError) {
        let mut states = self.states.lock();
        let state = states.entry(key.clone()).or_default();

        if err.is_retryable() && !self.backoff.exhausted(state.attempts) {
            state.attempts += 1;
            state.phase = Phase::Pending;
            let delay = self.backoff.delay(state.attempts);
            debug!(
                "Retrying {} in {:?} (attempt {}): {}",
                key, delay, state.attempts, err
            );
            self.queue.add_after(key.clone(), delay);
            return;
        }

        if err.is_retryable() {
            warn!(
                "Giving up on {} after {} retries: {}",
                key, state.attempts, err
            );
        }
        state.phase = Phase::Failed;
        state.settled = true;
    }

    async fn cleanup(&self, key: &ResourceKey) {
        self.queue.forget(key);
        self.states.lock().remove(key);
        match self.executor.remove(key).await {
            Ok(()) => info!("Removed data plane objects of deleted {}", key),
            Err(e) => {
                error!("Failed to clean up data plane objects of {}: {}", key, e);
                self.metrics.deletions_failed_total.inc();
            }
        }
        self.count(key, "deleted");
    }

    fn settle(&self, key: &ResourceKey, phase: Phase) {
        if let Some(state) = self.states.lock().get_mut(key) {
            state.phase = phase;
            state.settled = true;
            state.attempts = 0;
        }
    }

    fn set_phase(&self, key: &ResourceKey, phase: Phase) {
        if let Some(state) = self.states.lock().get_mut(key) {
            state.phase = phase;
        }
    }

    fn count(&self, key: &ResourceKey, result: &str) {
        self.metrics
            .reconcile_total
            .with_label_values(&[key.kind.as_str(), result])
            .inc();
    }
}

fn report_label(outcome: ReportOutcome) -> &'static str {
    match outcome {
        ReportOutcome::Disabled => "disabled",
        ReportOutcome::Written => "written",
        ReportOutcome::Unchanged => "unchanged",
        ReportOutcome::Stale => "stale",
        ReportOutcome::Deleted => "deleted",
        ReportOutcome::NotApplicable => "skipped",
    }
}
