//! Workflow records.
//!
//! A workflow is a named automation with a status lifecycle. It is created
//! from the catalog at startup, driven by execution outcomes and operator
//! commands, and never deleted (only paused).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::ExecutionFailure;

/// Upper bound on a workflow cadence: one leap year.
pub const MAX_CADENCE_SECS: u64 = 366 * 86_400;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Snapshot of one automation's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Stable identity from the catalog.
    pub id: WorkflowId,

    /// Display name (e.g. "Weekly LinkedIn Post").
    pub name: String,

    /// Collaborator that performs the automation (e.g. "social", "portfolio").
    pub source: String,

    pub status: Status,

    pub next_trigger: NextTrigger,

    pub last_run: Option<DateTime<Utc>>,

    /// Rolling success percentage, 0-100.
    pub success_rate: f64,

    /// Advisory text. Has no effect on state.
    pub ai_recommendation: Option<String>,

    /// Seconds between successful runs.
    pub cadence_secs: u64,

    /// Failures since the last success. Drives the retry backoff.
    pub consecutive_failures: u32,

    /// Total execution attempts dispatched.
    pub attempts: u32,

    /// The attempt currently executing, if any.
    pub in_flight: Option<RunId>,
}

impl Workflow {
    pub fn cadence(&self) -> Duration {
        Duration::seconds(self.cadence_secs.min(MAX_CADENCE_SECS) as i64)
    }

    /// Whether the scheduler may start an attempt at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, Status::Queued | Status::Running)
            && self.in_flight.is_none()
            && self.next_trigger.is_due(now)
    }

    /// Human-readable ETA, as shown on the dashboard.
    pub fn next_trigger_label(&self, now: DateTime<Utc>) -> String {
        match self.next_trigger {
            NextTrigger::Paused => "Paused".to_string(),
            NextTrigger::At(at) if at <= now => "Now".to_string(),
            NextTrigger::At(at) => {
                let eta = humanize(at - now);
                if self.status == Status::Failed {
                    format!("Retry in {eta}")
                } else {
                    format!("In {eta}")
                }
            }
        }
    }
}

/// Compact duration rendering: "3d 4h", "2h 15m", "15m", "40s".
fn humanize(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    let (days, hours, mins) = (secs / 86_400, (secs % 86_400) / 3_600, (secs % 3_600) / 60);
    match (days, hours, mins) {
        (0, 0, 0) => format!("{secs}s"),
        (0, 0, m) => format!("{m}m"),
        (0, h, 0) => format!("{h}h"),
        (0, h, m) => format!("{h}h {m}m"),
        (d, 0, _) => format!("{d}d"),
        (d, h, _) => format!("{d}d {h}h"),
    }
}

/// Newtype for workflow IDs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Active and healthy. Stays schedulable after each success.
    Running,
    /// Waiting for its next trigger.
    Queued,
    /// Last attempt failed; a retry is scheduled.
    Failed,
    /// Held by an operator. Never auto-transitions.
    Paused,
}

impl Status {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Queued, Running)
                | (Running, Running)    // success, stays schedulable
                | (Running, Failed)
                | (Failed, Queued)      // backoff elapsed or run-now
                | (Running, Paused)
                | (Queued, Paused)
                | (Failed, Paused)
                | (Paused, Queued) // resume
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Running => "running",
            Status::Queued => "queued",
            Status::Failed => "failed",
            Status::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Status::Running),
            "queued" => Ok(Status::Queued),
            "failed" => Ok(Status::Failed),
            "paused" => Ok(Status::Paused),
            other => Err(crate::error::Error::Other(format!(
                "unknown workflow status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Next trigger
// ---------------------------------------------------------------------------

/// When the workflow is next eligible to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "at", rename_all = "snake_case")]
pub enum NextTrigger {
    At(DateTime<Utc>),
    Paused,
}

impl NextTrigger {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self {
            NextTrigger::At(at) => *at <= now,
            NextTrigger::Paused => false,
        }
    }

    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            NextTrigger::At(at) => Some(*at),
            NextTrigger::Paused => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Identity of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything an executor needs to perform one attempt.
///
/// The orchestrator only accepts a result for the ticket whose `run_id`
/// matches the workflow's in-flight attempt.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub workflow_id: WorkflowId,
    pub run_id: RunId,
    pub source: String,
    /// 1-based attempt counter across the workflow's lifetime.
    pub attempt: u32,
    /// Hook to execute, if the catalog configured one.
    pub command: Option<PathBuf>,
    pub dispatched_at: DateTime<Utc>,
}

/// What the executor reports back for a ticket.
#[derive(Debug, Clone)]
pub enum RunResult {
    Succeeded {
        duration_ms: u64,
    },
    Failed {
        failure: ExecutionFailure,
        duration_ms: u64,
    },
}

impl RunResult {
    pub fn success(duration_ms: u64) -> Self {
        RunResult::Succeeded { duration_ms }
    }

    pub fn failure(message: impl Into<String>, duration_ms: u64) -> Self {
        RunResult::Failed {
            failure: ExecutionFailure::new(message),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Succeeded { .. })
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            RunResult::Succeeded { duration_ms } | RunResult::Failed { duration_ms, .. } => {
                *duration_ms
            }
        }
    }
}
