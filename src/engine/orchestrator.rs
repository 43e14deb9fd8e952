//! Workflow orchestrator: owns every workflow and enforces the lifecycle.
//!
//! Each workflow sits behind its own lock. Every state change, including the
//! matching action event, happens while that lock is held, so transitions on
//! one workflow are linearizable and their events reach the feed in order.
//! Attempts are identified by [`RunId`]; a result for anything other than
//! the workflow's in-flight attempt is discarded as stale.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use super::advisor::{Advisor, CannedAdvisor};
use super::backoff::RetryPolicy;
use crate::config::catalog::WorkflowCatalog;
use crate::error::{Error, Result};
use crate::event::{ActionEvent, EventStatus, EventType, NewActionEvent, TransitionRecord};
use crate::feed::ActionFeed;
use crate::model::workflow::*;
use crate::telemetry::metrics;

/// What happened to a reported run result.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// The result was applied; the workflow's new state.
    Applied(Workflow),
    /// The ticket is no longer the workflow's in-flight attempt.
    Stale,
}

struct Slot {
    command: Option<PathBuf>,
    state: Mutex<Workflow>,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, Workflow> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owner of all workflow state.
pub struct Orchestrator {
    slots: BTreeMap<WorkflowId, Slot>,
    feed: ActionFeed,
    retry: RetryPolicy,
    smoothing: f64,
    attention_threshold: f64,
    advisor: Arc<dyn Advisor>,
}

impl Orchestrator {
    /// Build from a catalog with the canned advisor.
    pub fn new(catalog: &WorkflowCatalog, feed: ActionFeed) -> Self {
        let advisor = CannedAdvisor {
            attention_threshold: catalog.policy.attention_threshold,
        };
        Self::with_advisor(catalog, feed, Arc::new(advisor))
    }

    pub fn with_advisor(
        catalog: &WorkflowCatalog,
        feed: ActionFeed,
        advisor: Arc<dyn Advisor>,
    ) -> Self {
        let now = Utc::now();
        let slots = catalog
            .workflows
            .iter()
            .map(|def| {
                let next_trigger = if def.status == Status::Paused {
                    NextTrigger::Paused
                } else {
                    let delay = def.first_trigger_secs.unwrap_or(def.cadence_secs);
                    NextTrigger::At(after(now, std::time::Duration::from_secs(delay)))
                };
                let workflow = Workflow {
                    id: WorkflowId::new(def.id.clone()),
                    name: def.name.clone(),
                    source: def.source.clone(),
                    status: def.status,
                    next_trigger,
                    last_run: None,
                    success_rate: def.success_rate,
                    ai_recommendation: def.recommendation.clone(),
                    cadence_secs: def.cadence_secs,
                    consecutive_failures: 0,
                    attempts: 0,
                    in_flight: None,
                };
                let slot = Slot {
                    command: def.command.clone(),
                    state: Mutex::new(workflow),
                };
                (WorkflowId::new(def.id.clone()), slot)
            })
            .collect::<BTreeMap<_, _>>();

        info!(workflows = slots.len(), "orchestrator initialized");

        Self {
            slots,
            feed,
            retry: catalog.policy.retry_policy(),
            smoothing: catalog.policy.smoothing,
            attention_threshold: catalog.policy.attention_threshold,
            advisor,
        }
    }

    pub fn feed(&self) -> &ActionFeed {
        &self.feed
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn slot(&self, id: &WorkflowId) -> Result<&Slot> {
        self.slots
            .get(id)
            .ok_or_else(|| Error::WorkflowNotFound(id.to_string()))
    }

    /// Snapshot of one workflow.
    pub fn get(&self, id: &WorkflowId) -> Result<Workflow> {
        Ok(self.slot(id)?.lock().clone())
    }

    /// Snapshots of all workflows, ordered by id.
    pub fn list(&self) -> Vec<Workflow> {
        self.slots.values().map(|s| s.lock().clone()).collect()
    }

    /// Persistent failure shows up as a success rate below the threshold.
    pub fn needs_attention(&self, workflow: &Workflow) -> bool {
        workflow.success_rate < self.attention_threshold
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start an attempt immediately, whatever the next trigger says.
    pub fn run_now(&self, id: &WorkflowId) -> Result<RunTicket> {
        let slot = self.slot(id)?;
        let mut wf = slot.lock();
        let now = Utc::now();

        if wf.status == Status::Paused {
            return Err(Error::WorkflowPaused(id.clone()));
        }
        if wf.in_flight.is_some() {
            return Err(Error::RunInFlight(id.clone()));
        }
        if wf.status == Status::Failed {
            self.transition(
                &mut wf,
                Status::Queued,
                EventStatus::Success,
                "Retry requested by operator".to_string(),
                None,
            )?;
            wf.next_trigger = NextTrigger::At(now);
        }

        info!(workflow = %id, "run-now requested");
        self.dispatch(slot, &mut wf, now)
    }

    /// Hold a workflow. Any in-flight attempt is abandoned: its result will
    /// be reported as stale.
    pub fn pause(&self, id: &WorkflowId) -> Result<Workflow> {
        let mut wf = self.slot(id)?.lock();
        if wf.status == Status::Paused {
            return Ok(wf.clone());
        }

        let abandoned = wf.in_flight;
        let description = match abandoned {
            Some(run) => format!("Paused by operator; run {run} abandoned"),
            None => "Paused by operator".to_string(),
        };
        self.transition(&mut wf, Status::Paused, EventStatus::Success, description, abandoned)?;
        wf.in_flight = None;
        wf.next_trigger = NextTrigger::Paused;
        Ok(wf.clone())
    }

    /// Put a paused workflow back in the queue, due immediately.
    pub fn resume(&self, id: &WorkflowId) -> Result<Workflow> {
        let mut wf = self.slot(id)?.lock();
        if wf.status != Status::Paused {
            return Ok(wf.clone());
        }

        self.transition(
            &mut wf,
            Status::Queued,
            EventStatus::Success,
            "Resumed by operator".to_string(),
            None,
        )?;
        wf.next_trigger = NextTrigger::At(Utc::now());
        Ok(wf.clone())
    }

    /// Refresh the advisory text. Never touches status.
    pub fn optimize(&self, id: &WorkflowId) -> Result<Workflow> {
        let mut wf = self.slot(id)?.lock();
        let recommendation = self.advisor.recommend(&wf);
        debug!(workflow = %id, recommendation = ?recommendation, "optimize");
        wf.ai_recommendation = recommendation;
        Ok(wf.clone())
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    /// One scheduler tick: requeue failed workflows whose backoff elapsed,
    /// then start up to `limit` due workflows, earliest trigger first.
    pub fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Vec<RunTicket> {
        let mut due = Vec::new();

        for (id, slot) in &self.slots {
            let mut wf = slot.lock();
            if wf.status == Status::Failed && wf.next_trigger.is_due(now) {
                let promoted = self.transition(
                    &mut wf,
                    Status::Queued,
                    EventStatus::Success,
                    "Backoff elapsed; retrying".to_string(),
                    None,
                );
                match promoted {
                    Ok(_) => wf.next_trigger = NextTrigger::At(now),
                    Err(e) => error!(workflow = %id, "retry promotion failed: {e}"),
                }
            }
            if wf.is_due(now) {
                if let Some(at) = wf.next_trigger.at() {
                    due.push((at, id));
                }
            }
        }

        due.sort();

        let mut tickets = Vec::new();
        for (_, id) in due.into_iter().take(limit) {
            let Some(slot) = self.slots.get(id) else {
                continue;
            };
            let mut wf = slot.lock();
            // Re-check: a command may have raced in between the two passes.
            if !wf.is_due(now) {
                continue;
            }
            match self.dispatch(slot, &mut wf, now) {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => error!(workflow = %id, "dispatch failed: {e}"),
            }
        }
        tickets
    }

    /// Forget every in-flight attempt without changing status. Late results
    /// for them are stale. Returns how many attempts were released.
    pub fn release_in_flight(&self) -> usize {
        let mut released = 0;
        for (id, slot) in &self.slots {
            let mut wf = slot.lock();
            if let Some(run) = wf.in_flight.take() {
                debug!(workflow = %id, run = %run, "in-flight attempt released");
                released += 1;
            }
        }
        released
    }

    /// Apply an executor's result for `ticket`.
    pub fn complete(&self, ticket: &RunTicket, result: RunResult) -> Result<Disposition> {
        let slot = self.slot(&ticket.workflow_id)?;
        let mut wf = slot.lock();

        if wf.in_flight != Some(ticket.run_id) {
            warn!(
                workflow = %ticket.workflow_id,
                run = %ticket.run_id,
                status = %wf.status,
                "discarding stale run result"
            );
            return Ok(Disposition::Stale);
        }

        let now = Utc::now();
        let duration_ms = result.duration_ms();
        metrics::workflow_runs().add(
            1,
            &[KeyValue::new(
                "result",
                if result.is_success() { "success" } else { "failure" },
            )],
        );
        metrics::run_duration_ms().record(duration_ms as f64, &[]);

        match result {
            RunResult::Succeeded { .. } => {
                let next = after(now, wf.cadence().to_std().unwrap_or_default());
                let rate = self.smoothed(wf.success_rate, true);
                let description = format!(
                    "Run {} completed in {duration_ms}ms; success rate {rate:.0}%",
                    ticket.run_id
                );
                self.transition(
                    &mut wf,
                    Status::Running,
                    EventStatus::Success,
                    description,
                    Some(ticket.run_id),
                )?;
                wf.success_rate = rate;
                wf.consecutive_failures = 0;
                wf.next_trigger = NextTrigger::At(next);
            }
            RunResult::Failed { failure, .. } => {
                let failures = wf.consecutive_failures.saturating_add(1);
                let delay = self.retry.delay(failures);
                let rate = self.smoothed(wf.success_rate, false);
                let description = format!(
                    "Run {} failed after {duration_ms}ms: {}; retry in {}s",
                    ticket.run_id,
                    failure.message,
                    delay.as_secs()
                );
                self.transition(
                    &mut wf,
                    Status::Failed,
                    EventStatus::Failed,
                    description,
                    Some(ticket.run_id),
                )?;
                wf.success_rate = rate;
                wf.consecutive_failures = failures;
                wf.next_trigger = NextTrigger::At(after(now, delay));

                if self.needs_attention(&wf) {
                    warn!(
                        workflow = %wf.id,
                        success_rate = wf.success_rate,
                        consecutive_failures = failures,
                        "workflow needs attention"
                    );
                }
            }
        }

        wf.in_flight = None;
        wf.last_run = Some(now);
        Ok(Disposition::Applied(wf.clone()))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn dispatch(&self, slot: &Slot, wf: &mut Workflow, now: DateTime<Utc>) -> Result<RunTicket> {
        let run_id = RunId::new();
        let attempt = wf.attempts.saturating_add(1);

        if wf.status == Status::Queued {
            self.transition(
                wf,
                Status::Running,
                EventStatus::Pending,
                format!("Run {run_id} started (attempt {attempt})"),
                Some(run_id),
            )?;
        }

        wf.attempts = attempt;
        wf.in_flight = Some(run_id);
        debug!(workflow = %wf.id, run = %run_id, attempt, "run dispatched");

        Ok(RunTicket {
            workflow_id: wf.id.clone(),
            run_id,
            source: wf.source.clone(),
            attempt,
            command: slot.command.clone(),
            dispatched_at: now,
        })
    }

    /// Change status and append exactly one event describing the change.
    ///
    /// The caller holds the workflow lock. Status only changes once the
    /// event is in the feed.
    fn transition(
        &self,
        wf: &mut Workflow,
        to: Status,
        status: EventStatus,
        description: String,
        run_id: Option<RunId>,
    ) -> Result<ActionEvent> {
        let from = wf.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }

        let event = self.feed.append(
            NewActionEvent::new(
                EventType::Workflow,
                format!("{}: {from} -> {to}", wf.name),
                wf.source.clone(),
            )
            .description(description)
            .status(status)
            .transition(TransitionRecord {
                workflow_id: wf.id.clone(),
                from,
                to,
                run_id,
            }),
        )?;
        wf.status = to;

        metrics::workflow_transitions().add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
        info!(workflow = %wf.id, %from, %to, event = event.id, "workflow transition");

        Ok(event)
    }

    /// Exponentially smoothed success rate after one more outcome.
    fn smoothed(&self, rate: f64, success: bool) -> f64 {
        let sample = if success { 100.0 } else { 0.0 };
        (rate + self.smoothing * (sample - rate)).clamp(0.0, 100.0)
    }
}

/// `now + delay`, saturating at the maximum representable time.
fn after(now: DateTime<Utc>, delay: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
