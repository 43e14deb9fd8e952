//! Scheduler: a ticking coordinator that dispatches due workflows to worker
//! tasks and applies their results.
//!
//! Workers never touch workflow state. Each one executes its ticket and
//! sends the result back over a channel; the coordinator loop is the only
//! place results are applied to the orchestrator.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, warn};

use super::executor::Executor;
use super::orchestrator::{Disposition, Orchestrator};
use crate::error::Result;
use crate::model::workflow::{RunId, RunResult, RunTicket, WorkflowId};
use crate::telemetry::workflow::{record_transition, start_run_span};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often due workflows are evaluated.
    pub tick_interval: Duration,
    /// Maximum attempts executing at once.
    pub max_concurrent: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            max_concurrent: 4,
        }
    }
}

/// A finished attempt on its way back to the coordinator.
struct Completion {
    ticket: RunTicket,
    result: RunResult,
}

/// Cloneable scheduler handle.
pub struct Scheduler<E: Executor> {
    orchestrator: Arc<Orchestrator>,
    executor: Arc<E>,
    config: SchedulerConfig,
    shutdown: Arc<Notify>,
    active_runs: Arc<AtomicUsize>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: Arc<Mutex<mpsc::UnboundedReceiver<Completion>>>,
}

impl<E: Executor> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            executor: Arc::clone(&self.executor),
            config: self.config.clone(),
            shutdown: Arc::clone(&self.shutdown),
            active_runs: Arc::clone(&self.active_runs),
            completions_tx: self.completions_tx.clone(),
            completions_rx: Arc::clone(&self.completions_rx),
        }
    }
}

impl<E: Executor> Scheduler<E> {
    pub fn new(orchestrator: Arc<Orchestrator>, executor: Arc<E>, config: SchedulerConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            executor,
            config,
            shutdown: Arc::new(Notify::new()),
            active_runs: Arc::new(AtomicUsize::new(0)),
            completions_tx,
            completions_rx: Arc::new(Mutex::new(completions_rx)),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Attempts dispatched whose results have not been applied yet.
    pub fn active_runs(&self) -> usize {
        self.active_runs.load(Ordering::Acquire)
    }

    /// Signal the coordinator loop to stop. Attempts still executing are
    /// left to finish but released in the orchestrator, so their results
    /// are stale and another scheduler can dispatch those workflows again.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run-now command: start an attempt immediately on a worker.
    pub fn run_now(&self, id: &WorkflowId) -> Result<RunId> {
        let ticket = self.orchestrator.run_now(id)?;
        let run_id = ticket.run_id;
        self.spawn_worker(ticket);
        Ok(run_id)
    }

    /// Run the coordinator loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut completions = self.completions_rx.lock().await;
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_ms = self.config.tick_interval.as_millis() as u64,
            max_concurrent = self.config.max_concurrent,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let released = self.orchestrator.release_in_flight();
                    info!(active_runs = self.active_runs(), released, "scheduler shutting down");
                    return Ok(());
                }
                Some(completion) = completions.recv() => {
                    self.apply(completion);
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now());
                }
            }
        }
    }

    /// Dispatch every due workflow that fits in the remaining capacity.
    /// Returns how many attempts were started.
    pub fn tick(&self, now: DateTime<Utc>) -> usize {
        let capacity = self
            .config
            .max_concurrent
            .saturating_sub(self.active_runs());
        if capacity == 0 {
            debug!("at capacity, promoting elapsed retries only");
        }

        let tickets = self.orchestrator.claim_due(now, capacity);
        let started = tickets.len();
        for ticket in tickets {
            self.spawn_worker(ticket);
        }
        started
    }

    fn spawn_worker(&self, ticket: RunTicket) {
        self.active_runs.fetch_add(1, Ordering::AcqRel);

        let executor = Arc::clone(&self.executor);
        let tx = self.completions_tx.clone();
        let span = start_run_span(ticket.workflow_id.as_str(), &ticket.run_id.0);

        tokio::spawn(
            async move {
                let start = Instant::now();
                // Executors are connector code; a panic fails the attempt.
                let attempt = tokio::spawn({
                    let ticket = ticket.clone();
                    async move { executor.execute(ticket).await }.in_current_span()
                });
                let result = match attempt.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(workflow = %ticket.workflow_id, run = %ticket.run_id, "executor aborted: {e}");
                        RunResult::failure(
                            format!("executor panicked: {e}"),
                            start.elapsed().as_millis() as u64,
                        )
                    }
                };
                if tx.send(Completion { ticket, result }).is_err() {
                    debug!("scheduler gone, dropping run result");
                }
            }
            .instrument(span),
        );
    }

    fn apply(&self, completion: Completion) {
        self.active_runs.fetch_sub(1, Ordering::AcqRel);
        let Completion { ticket, result } = completion;
        let span = start_run_span(ticket.workflow_id.as_str(), &ticket.run_id.0);

        match self.orchestrator.complete(&ticket, result) {
            Ok(Disposition::Applied(wf)) => {
                record_transition(&span, "running", &wf.status.to_string());
            }
            Ok(Disposition::Stale) => {
                debug!(workflow = %ticket.workflow_id, run = %ticket.run_id, "stale result ignored");
            }
            Err(e) => {
                error!(workflow = %ticket.workflow_id, run = %ticket.run_id, "applying run result failed: {e}");
            }
        }
    }
}
