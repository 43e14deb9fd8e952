//! Workflow lifecycle: state machine, retry backoff, commands, and the
//! events every transition leaves in the feed.

use chrono::{Duration, Utc};
use growth_engine::config::catalog::WorkflowCatalog;
use growth_engine::engine::{Advisor, Disposition, Orchestrator};
use growth_engine::error::Error;
use growth_engine::event::{ActionEvent, EventStatus};
use growth_engine::feed::ActionFeed;
use growth_engine::model::workflow::*;
use std::sync::Arc;

const CATALOG: &str = r#"
[policy]
strategy = "fixed"
base_secs = 900
smoothing = 0.5
attention_threshold = 50.0

[[workflow]]
id = "post"
name = "Weekly LinkedIn Post"
source = "social"
cadence_secs = 604800
first_trigger_secs = 0
status = "queued"
success_rate = 50.0

[[workflow]]
id = "sync"
name = "GitHub Portfolio Sync"
source = "portfolio"
cadence_secs = 86400
first_trigger_secs = 3600
status = "running"
success_rate = 90.0

[[workflow]]
id = "mentor"
name = "Mentor Check-in"
source = "mentor"
cadence_secs = 3600
status = "paused"
"#;

fn test_orchestrator() -> Orchestrator {
    let catalog = WorkflowCatalog::from_toml_str(CATALOG).expect("valid catalog");
    Orchestrator::new(&catalog, ActionFeed::new())
}

fn id(s: &str) -> WorkflowId {
    WorkflowId::new(s)
}

/// Dispatch the "post" workflow via a tick.
fn claim_post(orch: &Orchestrator) -> RunTicket {
    let tickets = orch.claim_due(Utc::now(), 10);
    tickets
        .into_iter()
        .find(|t| t.workflow_id == id("post"))
        .expect("post should be due")
}

fn transitions(events: &[ActionEvent], workflow: &str) -> Vec<(Status, Status)> {
    events
        .iter()
        .filter_map(|e| e.transition.as_ref())
        .filter(|t| t.workflow_id.as_str() == workflow)
        .map(|t| (t.from, t.to))
        .collect()
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[test]
fn workflows_start_from_the_catalog() {
    let orch = test_orchestrator();
    let all = orch.list();
    assert_eq!(all.len(), 3);

    let mentor = orch.get(&id("mentor")).unwrap();
    assert_eq!(mentor.status, Status::Paused);
    assert_eq!(mentor.next_trigger, NextTrigger::Paused);
    assert_eq!(mentor.next_trigger_label(Utc::now()), "Paused");
    assert_eq!(mentor.success_rate, 100.0);

    let sync = orch.get(&id("sync")).unwrap();
    assert_eq!(sync.status, Status::Running);
    assert!(sync.next_trigger_label(Utc::now()).starts_with("In "));

    assert!(orch.feed().is_empty(), "creation is not a transition");
}

// ---------------------------------------------------------------------------
// Success path
// ---------------------------------------------------------------------------

#[test]
fn queued_workflow_runs_and_stays_schedulable() {
    let orch = test_orchestrator();

    let ticket = claim_post(&orch);
    let running = orch.get(&id("post")).unwrap();
    assert_eq!(running.status, Status::Running);
    assert_eq!(running.in_flight, Some(ticket.run_id));
    assert_eq!(ticket.attempt, 1);

    let before = Utc::now();
    let wf = match orch.complete(&ticket, RunResult::success(120)).unwrap() {
        Disposition::Applied(wf) => wf,
        Disposition::Stale => panic!("expected Applied"),
    };

    assert_eq!(wf.status, Status::Running);
    assert_eq!(wf.in_flight, None);
    assert_eq!(wf.success_rate, 75.0); // 50 + 0.5 * (100 - 50)
    assert!(wf.last_run.unwrap() >= before);
    let next = wf.next_trigger.at().unwrap();
    assert!(next >= before + Duration::seconds(604_800));

    let events = orch.feed().since(0);
    assert_eq!(
        transitions(&events, "post"),
        [
            (Status::Queued, Status::Running),
            (Status::Running, Status::Running)
        ]
    );
    assert_eq!(events[0].status, EventStatus::Pending);
    assert_eq!(events[1].status, EventStatus::Success);
    assert_eq!(events[1].source, "social");

    // Not due again until the cadence elapses.
    assert!(orch.claim_due(Utc::now(), 10).iter().all(|t| t.workflow_id != id("post")));
    assert_eq!(orch.get(&id("post")).unwrap().status, Status::Running);
}

#[test]
fn workflows_are_not_dispatched_before_their_trigger() {
    let orch = test_orchestrator();
    let now = Utc::now();

    let ids: Vec<_> = orch.claim_due(now, 10).into_iter().map(|t| t.workflow_id).collect();
    assert_eq!(ids, [id("post")]);

    let later: Vec<_> = orch
        .claim_due(now + Duration::hours(2), 10)
        .into_iter()
        .map(|t| t.workflow_id)
        .collect();
    assert_eq!(later, [id("sync")], "post is in flight, mentor is paused");

    // A dispatch from `running` is not a status change.
    assert!(transitions(&orch.feed().since(0), "sync").is_empty());
}

#[test]
fn claim_respects_limit_earliest_first() {
    let orch = test_orchestrator();
    let tickets = orch.claim_due(Utc::now() + Duration::hours(2), 1);
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].workflow_id, id("post"));
}

// ---------------------------------------------------------------------------
// Failure and retry
// ---------------------------------------------------------------------------

#[test]
fn failure_schedules_retry_after_backoff() {
    let orch = test_orchestrator();
    let ticket = claim_post(&orch);

    let before = Utc::now();
    orch.complete(&ticket, RunResult::failure("LinkedIn API returned 503", 40))
        .unwrap();

    let wf = orch.get(&id("post")).unwrap();
    assert_eq!(wf.status, Status::Failed);
    assert_eq!(wf.consecutive_failures, 1);
    assert_eq!(wf.success_rate, 25.0);
    let retry_at = wf.next_trigger.at().unwrap();
    assert!(retry_at >= before + Duration::seconds(900));
    assert!(retry_at <= Utc::now() + Duration::seconds(900));
    assert!(wf.next_trigger_label(Utc::now()).starts_with("Retry in "));

    let failed_event = orch.feed().since(0).pop().unwrap();
    assert_eq!(failed_event.status, EventStatus::Failed);
    assert!(failed_event.description.contains("503"));

    // Still inside the backoff window: nothing happens.
    assert!(orch.claim_due(Utc::now(), 10).iter().all(|t| t.workflow_id != id("post")));
    assert_eq!(orch.get(&id("post")).unwrap().status, Status::Failed);

    // Backoff elapsed: requeued and dispatched in the same tick.
    let tickets = orch.claim_due(Utc::now() + Duration::minutes(16), 10);
    let retry = tickets.iter().find(|t| t.workflow_id == id("post")).unwrap();
    assert_eq!(retry.attempt, 2);
    assert_eq!(orch.get(&id("post")).unwrap().status, Status::Running);

    assert_eq!(
        transitions(&orch.feed().since(0), "post"),
        [
            (Status::Queued, Status::Running),
            (Status::Running, Status::Failed),
            (Status::Failed, Status::Queued),
            (Status::Queued, Status::Running),
        ]
    );
}

#[test]
fn exponential_backoff_grows_per_consecutive_failure() {
    let catalog = WorkflowCatalog::from_toml_str(
        r#"
[policy]
strategy = "exponential"
base_secs = 60
max_secs = 200
multiplier = 2.0

[[workflow]]
id = "flaky"
name = "Flaky Sync"
source = "portfolio"
cadence_secs = 3600
first_trigger_secs = 0
"#,
    )
    .unwrap();
    let orch = Orchestrator::new(&catalog, ActionFeed::new());
    let flaky = id("flaky");

    for expected_secs in [60, 120, 200, 200] {
        let ticket = orch.run_now(&flaky).unwrap();
        let before = Utc::now();
        orch.complete(&ticket, RunResult::failure("timeout", 5)).unwrap();
        let wf = orch.get(&flaky).unwrap();
        let delay = wf.next_trigger.at().unwrap() - before;
        assert!(
            delay >= Duration::seconds(expected_secs)
                && delay <= Duration::seconds(expected_secs + 5),
            "expected ~{expected_secs}s, got {delay}"
        );
    }

    // A success resets the failure streak.
    let ticket = orch.run_now(&flaky).unwrap();
    orch.complete(&ticket, RunResult::success(5)).unwrap();
    assert_eq!(orch.get(&flaky).unwrap().consecutive_failures, 0);
}

#[test]
fn persistent_failure_needs_attention() {
    let orch = test_orchestrator();
    let post = id("post");
    assert!(!orch.needs_attention(&orch.get(&post).unwrap()));

    let ticket = orch.run_now(&post).unwrap();
    orch.complete(&ticket, RunResult::failure("auth expired", 1)).unwrap();

    let wf = orch.get(&post).unwrap();
    assert!(orch.needs_attention(&wf));
    assert_eq!(wf.status, Status::Failed, "attention is a flag, not a state");
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[test]
fn paused_workflow_never_ticks_and_rejects_run_now() {
    let orch = test_orchestrator();
    let mentor = id("mentor");

    let far = Utc::now() + Duration::days(365);
    assert!(orch.claim_due(far, 10).iter().all(|t| t.workflow_id != mentor));
    assert_eq!(orch.get(&mentor).unwrap().status, Status::Paused);

    let before = orch.feed().latest_id();
    let result = orch.run_now(&mentor);
    assert!(matches!(result, Err(Error::WorkflowPaused(ref w)) if *w == mentor));
    assert_eq!(orch.feed().latest_id(), before, "no event on rejected run-now");
    assert!(transitions(&orch.feed().since(0), "mentor").is_empty());
}

#[test]
fn unknown_workflow_is_rejected() {
    let orch = test_orchestrator();
    let ghost = id("ghost");
    assert!(matches!(orch.run_now(&ghost), Err(Error::WorkflowNotFound(_))));
    assert!(matches!(orch.pause(&ghost), Err(Error::WorkflowNotFound(_))));
    assert!(matches!(orch.resume(&ghost), Err(Error::WorkflowNotFound(_))));
    assert!(matches!(orch.optimize(&ghost), Err(Error::WorkflowNotFound(_))));
    assert!(matches!(orch.get(&ghost), Err(Error::WorkflowNotFound(_))));
    assert!(orch.feed().is_empty());
}

#[test]
fn run_now_ignores_next_trigger() {
    let orch = test_orchestrator();
    let sync = id("sync");
    assert!(!orch.get(&sync).unwrap().is_due(Utc::now()));

    let ticket = orch.run_now(&sync).unwrap();
    assert_eq!(orch.get(&sync).unwrap().in_flight, Some(ticket.run_id));
    assert!(matches!(orch.run_now(&sync), Err(Error::RunInFlight(_))));
}

#[test]
fn run_now_on_failed_requeues_then_runs() {
    let orch = test_orchestrator();
    let post = id("post");
    let ticket = orch.run_now(&post).unwrap();
    orch.complete(&ticket, RunResult::failure("boom", 1)).unwrap();

    orch.run_now(&post).unwrap();
    assert_eq!(
        transitions(&orch.feed().since(0), "post"),
        [
            (Status::Queued, Status::Running),
            (Status::Running, Status::Failed),
            (Status::Failed, Status::Queued),
            (Status::Queued, Status::Running),
        ]
    );
}

#[test]
fn pause_and_resume() {
    let orch = test_orchestrator();
    let sync = id("sync");

    let paused = orch.pause(&sync).unwrap();
    assert_eq!(paused.status, Status::Paused);
    assert_eq!(paused.next_trigger, NextTrigger::Paused);

    // Pausing twice is not a transition.
    orch.pause(&sync).unwrap();
    assert_eq!(transitions(&orch.feed().since(0), "sync").len(), 1);

    let resumed = orch.resume(&sync).unwrap();
    assert_eq!(resumed.status, Status::Queued);
    assert!(resumed.is_due(Utc::now()));

    // Resuming a non-paused workflow is a no-op.
    orch.resume(&sync).unwrap();
    assert_eq!(
        transitions(&orch.feed().since(0), "sync"),
        [
            (Status::Running, Status::Paused),
            (Status::Paused, Status::Queued)
        ]
    );
}

#[test]
fn late_result_after_pause_is_stale() {
    let orch = test_orchestrator();
    let post = id("post");
    let ticket = claim_post(&orch);

    orch.pause(&post).unwrap();
    let events_before = orch.feed().latest_id();

    let disposition = orch.complete(&ticket, RunResult::success(10)).unwrap();
    assert!(matches!(disposition, Disposition::Stale));

    let wf = orch.get(&post).unwrap();
    assert_eq!(wf.status, Status::Paused);
    assert_eq!(wf.success_rate, 50.0);
    assert_eq!(orch.feed().latest_id(), events_before);
}

#[test]
fn result_for_an_older_attempt_cannot_clobber_a_newer_one() {
    let orch = test_orchestrator();
    let post = id("post");

    let first = orch.run_now(&post).unwrap();
    orch.complete(&first, RunResult::failure("boom", 1)).unwrap();
    let second = orch.run_now(&post).unwrap();

    // Duplicate delivery of the first attempt's callback.
    let replay = orch.complete(&first, RunResult::success(1)).unwrap();
    assert!(matches!(replay, Disposition::Stale));
    assert_eq!(orch.get(&post).unwrap().in_flight, Some(second.run_id));
}

struct FixedAdvisor(Option<&'static str>);

impl Advisor for FixedAdvisor {
    fn recommend(&self, _workflow: &Workflow) -> Option<String> {
        self.0.map(str::to_string)
    }
}

#[test]
fn optimize_is_advisory_only() {
    let catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();
    let orch = Orchestrator::with_advisor(
        &catalog,
        ActionFeed::new(),
        Arc::new(FixedAdvisor(Some("Post on Tuesdays"))),
    );

    for wf in orch.list() {
        let after = orch.optimize(&wf.id).unwrap();
        assert_eq!(after.status, wf.status);
        assert_eq!(after.next_trigger, wf.next_trigger);
        assert_eq!(after.ai_recommendation.as_deref(), Some("Post on Tuesdays"));
    }
    assert!(orch.feed().is_empty());

    let clearing = Orchestrator::with_advisor(&catalog, ActionFeed::new(), Arc::new(FixedAdvisor(None)));
    let wf = clearing.optimize(&id("sync")).unwrap();
    assert_eq!(wf.ai_recommendation, None);
}

// ---------------------------------------------------------------------------
// Event ordering under concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_commands_produce_a_consistent_event_chain() {
    let orch = Arc::new(test_orchestrator());
    let workflows = ["post", "sync"];

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let orch = Arc::clone(&orch);
            std::thread::spawn(move || {
                for round in 0..100 {
                    let wf = id(workflows[(worker + round) % 2]);
                    match (worker + round) % 4 {
                        0 => {
                            if let Ok(ticket) = orch.run_now(&wf) {
                                let result = if round % 3 == 0 {
                                    RunResult::failure("flaky", 1)
                                } else {
                                    RunResult::success(1)
                                };
                                let _ = orch.complete(&ticket, result);
                            }
                        }
                        1 => {
                            let _ = orch.pause(&wf);
                        }
                        2 => {
                            let _ = orch.resume(&wf);
                        }
                        _ => {
                            let _ = orch.claim_due(Utc::now(), 1);
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let events = orch.feed().since(0);
    for name in workflows {
        let chain = transitions(&events, name);
        for pair in chain.windows(2) {
            assert_eq!(pair[0].1, pair[1].0, "{name}: broken chain {pair:?}");
        }
        for (from, to) in &chain {
            assert!(from.can_transition_to(*to), "{name}: illegal {from} -> {to}");
        }
        if let Some(last) = chain.last() {
            assert_eq!(orch.get(&id(name)).unwrap().status, last.1);
        }
    }
}
