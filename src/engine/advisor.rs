//! Advisory text for workflows.
//!
//! The orchestrator stores whatever an [`Advisor`] returns and displays it;
//! recommendations never influence workflow state.

use crate::model::workflow::{Status, Workflow};

/// Provider of optimization hints.
pub trait Advisor: Send + Sync {
    /// A recommendation for `workflow`, or `None` to clear the current one.
    fn recommend(&self, workflow: &Workflow) -> Option<String>;
}

/// Rule-based canned recommendations.
#[derive(Debug, Clone)]
pub struct CannedAdvisor {
    /// Success rate below which reliability advice is given.
    pub attention_threshold: f64,
}

impl Default for CannedAdvisor {
    fn default() -> Self {
        Self {
            attention_threshold: 50.0,
        }
    }
}

impl Advisor for CannedAdvisor {
    fn recommend(&self, workflow: &Workflow) -> Option<String> {
        if workflow.status == Status::Paused {
            return None;
        }
        if workflow.consecutive_failures >= 3 || workflow.success_rate < self.attention_threshold {
            return Some(format!(
                "{} keeps failing; check the {} connection before the next retry.",
                workflow.name, workflow.source
            ));
        }
        if workflow.status == Status::Failed {
            return Some("A single failure is usually transient; the retry should recover it.".to_string());
        }
        if workflow.success_rate >= 95.0 && workflow.cadence_secs > 86_400 {
            return Some(format!(
                "{} is reliable; running it more often could grow engagement.",
                workflow.name
            ));
        }
        match workflow.source.as_str() {
            "social" => Some("Posting on Tuesday mornings gets the most engagement.".to_string()),
            "mentor" => Some("Share your latest project before the next mentor check-in.".to_string()),
            _ => None,
        }
    }
}
