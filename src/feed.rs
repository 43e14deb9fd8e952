//! Append-only action feed.
//!
//! A lock-protected ordered log shared by every writer. Sequence numbers are
//! assigned under the lock, so two appends from the same writer are always
//! listed in append order, and events a writer emits while holding its own
//! lock (the orchestrator does, per workflow) keep their causal order.
//!
//! Consumers either pull ([`ActionFeed::list`], [`ActionFeed::since`]) or
//! subscribe for push delivery ([`ActionFeed::subscribe`]).

use chrono::Utc;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::Result;
use crate::event::{ActionEvent, NewActionEvent};
use crate::telemetry::metrics;

/// Buffered events per push subscriber before it starts lagging.
const DEFAULT_PUSH_CAPACITY: usize = 256;

/// Cloneable handle to a shared feed.
#[derive(Clone)]
pub struct ActionFeed {
    inner: Arc<Inner>,
}

struct Inner {
    log: Mutex<Vec<ActionEvent>>,
    push: broadcast::Sender<ActionEvent>,
}

/// Resume point for [`ActionFeed::list`]: events with an id strictly below
/// `before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub before: u64,
}

impl ActionFeed {
    pub fn new() -> Self {
        Self::with_push_capacity(DEFAULT_PUSH_CAPACITY)
    }

    pub fn with_push_capacity(capacity: usize) -> Self {
        let (push, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                log: Mutex::new(Vec::new()),
                push,
            }),
        }
    }

    fn log(&self) -> MutexGuard<'_, Vec<ActionEvent>> {
        self.inner.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and append an event, returning it with its id and timestamp.
    ///
    /// Fails only with [`crate::error::Error::InvalidEvent`]; a well-formed
    /// event is never dropped.
    pub fn append(&self, new: NewActionEvent) -> Result<ActionEvent> {
        new.validate()?;

        let mut log = self.log();
        let id = log.len() as u64 + 1;
        // Timestamps never go backwards, even if the wall clock does.
        let now = Utc::now();
        let timestamp = log.last().map_or(now, |last| last.timestamp.max(now));
        let event = new.into_event(id, timestamp);
        log.push(event.clone());

        // Sent under the lock so subscribers observe append order.
        let _ = self.inner.push.send(event.clone());
        drop(log);

        metrics::feed_appends().add(
            1,
            &[KeyValue::new("event_type", event.event_type.to_string())],
        );
        debug!(id, event_type = %event.event_type, source = %event.source, "event appended");

        Ok(event)
    }

    /// Newest-first listing of at most `limit` events below `cursor`.
    ///
    /// The returned iterator reads lazily, one event per step, and is
    /// finite: events appended after `list` returns are never yielded.
    pub fn list(&self, limit: usize, cursor: Option<Cursor>) -> FeedIter {
        let newest = self.latest_id().saturating_add(1);
        FeedIter {
            feed: self.clone(),
            before: cursor.map_or(newest, |c| c.before.min(newest)),
            remaining: limit,
        }
    }

    /// Events with `id > seq`, oldest first.
    pub fn since(&self, seq: u64) -> Vec<ActionEvent> {
        let log = self.log();
        let start = usize::try_from(seq).unwrap_or(usize::MAX).min(log.len());
        log[start..].to_vec()
    }

    /// Id of the newest event, or 0 when empty.
    pub fn latest_id(&self) -> u64 {
        self.log().len() as u64
    }

    pub fn len(&self) -> usize {
        self.log().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log().is_empty()
    }

    /// Push delivery of every event appended from now on, in append order.
    pub fn subscribe(&self) -> broadcast::Receiver<ActionEvent> {
        self.inner.push.subscribe()
    }
}

impl Default for ActionFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy, restartable newest-first walk over the feed.
pub struct FeedIter {
    feed: ActionFeed,
    before: u64,
    remaining: usize,
}

impl FeedIter {
    /// Where to restart to continue after the last yielded event, or `None`
    /// once the oldest event has been reached.
    pub fn cursor(&self) -> Option<Cursor> {
        (self.before > 1).then_some(Cursor {
            before: self.before,
        })
    }
}

impl Iterator for FeedIter {
    type Item = ActionEvent;

    fn next(&mut self) -> Option<ActionEvent> {
        if self.remaining == 0 || self.before <= 1 {
            return None;
        }
        let log = self.feed.log();
        // Ids are 1-based and dense, so id N lives at index N - 1.
        let id = (self.before - 1).min(log.len() as u64);
        if id == 0 {
            self.before = 1;
            return None;
        }
        let event = log[(id - 1) as usize].clone();
        self.before = id;
        self.remaining -= 1;
        Some(event)
    }
}
