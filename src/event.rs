//! Action events: the entries of the action feed.
//!
//! The orchestrator emits one event per workflow status transition; other
//! collaborators (post scheduling, portfolio sync, mentor nudges) append
//! their own. Events are immutable once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::workflow::{RunId, Status, WorkflowId};

/// An appended event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    /// Monotonic sequence number, starting at 1. Consumers can detect gaps.
    pub id: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub title: String,
    pub description: String,
    pub status: EventStatus,
    /// Originating collaborator.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Present on workflow status transitions.
    pub transition: Option<TransitionRecord>,
}

/// Category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Workflow,
    SocialPost,
    PortfolioSync,
    MentorNudge,
    Learning,
    Score,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Workflow => "workflow",
            EventType::SocialPost => "social_post",
            EventType::PortfolioSync => "portfolio_sync",
            EventType::MentorNudge => "mentor_nudge",
            EventType::Learning => "learning",
            EventType::Score => "score",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Pending,
    Failed,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventStatus::Success => "success",
            EventStatus::Pending => "pending",
            EventStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// The workflow status change an event describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub workflow_id: WorkflowId,
    pub from: Status,
    pub to: Status,
    pub run_id: Option<RunId>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// An event before it is appended. The feed assigns `id` and `timestamp`.
#[derive(Debug, Clone)]
pub struct NewActionEvent {
    pub(crate) event_type: EventType,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) status: EventStatus,
    pub(crate) source: String,
    pub(crate) transition: Option<TransitionRecord>,
}

impl NewActionEvent {
    pub fn new(event_type: EventType, title: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type,
            title: title.into(),
            description: String::new(),
            status: EventStatus::Success,
            source: source.into(),
            transition: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn transition(mut self, transition: TransitionRecord) -> Self {
        self.transition = Some(transition);
        self
    }

    /// Reject events missing a required field.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidEvent("title is required".to_string()));
        }
        if self.source.trim().is_empty() {
            return Err(Error::InvalidEvent("source is required".to_string()));
        }
        if let Some(ref t) = self.transition {
            if t.workflow_id.as_str().is_empty() {
                return Err(Error::InvalidEvent(
                    "transition is missing its workflow id".to_string(),
                ));
            }
            if self.event_type != EventType::Workflow {
                return Err(Error::InvalidEvent(format!(
                    "transition attached to a {} event",
                    self.event_type
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn into_event(self, id: u64, timestamp: DateTime<Utc>) -> ActionEvent {
        ActionEvent {
            id,
            event_type: self.event_type,
            title: self.title,
            description: self.description,
            status: self.status,
            source: self.source,
            timestamp,
            transition: self.transition,
        }
    }
}
