//! Execution of a single workflow attempt.

use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::model::workflow::{RunResult, RunTicket};

/// Performs the automation behind a ticket (posting, syncing, nudging).
///
/// Failures are reported in the returned [`RunResult`], never panicked or
/// propagated.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, ticket: RunTicket) -> impl Future<Output = RunResult> + Send;
}

/// Runs the workflow's configured hook command.
///
/// A workflow without a command has nothing to run and succeeds at once.
#[derive(Debug, Clone, Default)]
pub struct HookExecutor;

impl Executor for HookExecutor {
    async fn execute(&self, ticket: RunTicket) -> RunResult {
        let start = Instant::now();
        let Some(ref command) = ticket.command else {
            debug!(workflow = %ticket.workflow_id, run = %ticket.run_id, "no hook configured");
            return RunResult::success(0);
        };

        let result = run_hook(&ticket, command).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                info!(
                    workflow = %ticket.workflow_id,
                    run = %ticket.run_id,
                    duration_ms,
                    "hook completed"
                );
                RunResult::success(duration_ms)
            }
            Err(message) => {
                warn!(
                    workflow = %ticket.workflow_id,
                    run = %ticket.run_id,
                    duration_ms,
                    error = %message,
                    "hook failed"
                );
                RunResult::failure(message, duration_ms)
            }
        }
    }
}

async fn run_hook(ticket: &RunTicket, command: &Path) -> Result<(), String> {
    // Resolve relative command paths against the process CWD (project root).
    let abs_command = if command.is_relative() {
        std::env::current_dir()
            .map_err(|e| format!("cannot resolve {}: {e}", command.display()))?
            .join(command)
    } else {
        command.to_path_buf()
    };

    debug!(
        workflow = %ticket.workflow_id,
        command = %abs_command.display(),
        "running hook"
    );

    let status = Command::new(&abs_command)
        .env("GROWTH_WORKFLOW_ID", ticket.workflow_id.as_str())
        .env("GROWTH_RUN_ID", ticket.run_id.0.to_string())
        .env("GROWTH_ATTEMPT", ticket.attempt.to_string())
        .env("GROWTH_SOURCE", &ticket.source)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| format!("cannot start {}: {e}", abs_command.display()))?;

    if status.success() {
        Ok(())
    } else {
        Err(format!(
            "hook exited with status {}",
            status.code().unwrap_or(-1)
        ))
    }
}
