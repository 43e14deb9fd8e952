//! Workflow engine: lifecycle state machine, retry policy, scheduling.

pub mod advisor;
pub mod backoff;
pub mod executor;
pub mod orchestrator;
pub mod scheduler;

pub use advisor::{Advisor, CannedAdvisor};
pub use backoff::RetryPolicy;
pub use executor::{Executor, HookExecutor};
pub use orchestrator::{Disposition, Orchestrator};
pub use scheduler::{Scheduler, SchedulerConfig};
