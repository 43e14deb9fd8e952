//! Score store persistence against an in-memory SQLite database.

use growth_engine::db::Db;
use growth_engine::error::{Error, Result};
use growth_engine::event::EventType;
use growth_engine::feed::ActionFeed;
use growth_engine::model::growth::{GrowthMetrics, Level};
use growth_engine::score::{MetricsSource, StaticMetrics};
use growth_engine::store::{SCORE_KEY, ScoreStore};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts how often the store asks for a snapshot.
struct CountingSource {
    inner: StaticMetrics,
    calls: AtomicUsize,
}

impl CountingSource {
    fn new(inner: StaticMetrics) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricsSource for CountingSource {
    fn snapshot(&self) -> Result<GrowthMetrics> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.snapshot()
    }
}

struct BrokenSource;

impl MetricsSource for BrokenSource {
    fn snapshot(&self) -> Result<GrowthMetrics> {
        Err(Error::InvalidMetrics("connector returned no data".to_string()))
    }
}

async fn test_store() -> (Db, ScoreStore) {
    let db = Db::in_memory().await.expect("in-memory db");
    (db.clone(), ScoreStore::new(db))
}

#[tokio::test]
async fn health_check_passes() {
    let (db, _) = test_store().await;
    assert!(db.health_check().await.is_ok());
}

#[tokio::test]
async fn absent_score_is_not_an_error() {
    let (_, store) = test_store().await;
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn refresh_writes_through() {
    let (db, store) = test_store().await;

    let score = store.refresh(&StaticMetrics::sample()).await.unwrap();
    assert_eq!(score.total, 73);

    assert_eq!(store.load().await.unwrap(), Some(score));

    let raw = db.kv_get("growth", SCORE_KEY).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["total"], 73);
    assert_eq!(value["level"], "high");
    assert_eq!(value["color"], "green");
    assert!(value["breakdown"]["mentorFeedback"].is_number());
}

#[tokio::test]
async fn current_reads_through_without_recomputing() {
    let (_, store) = test_store().await;
    let source = CountingSource::new(StaticMetrics::sample());

    let first = store.current(&source).await.unwrap();
    assert_eq!(source.calls(), 1);

    let second = store.current(&source).await.unwrap();
    assert_eq!(source.calls(), 1, "stored score should be reused");
    assert_eq!(first, second);
}

#[tokio::test]
async fn announce_posts_the_stored_score_to_the_feed() {
    let (_, store) = test_store().await;
    let source = CountingSource::new(StaticMetrics::sample());
    let feed = ActionFeed::new();

    let score = store.announce(&source, &feed).await.unwrap();
    assert_eq!(score.total, 73);
    store.announce(&source, &feed).await.unwrap();
    assert_eq!(source.calls(), 1, "second announce reads the stored score");

    let events: Vec<_> = feed.since(0);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::Score);
    assert_eq!(events[0].title, "Growth score 73");
    assert_eq!(events[0].description, "Level high (green)");
    assert!(events[0].transition.is_none());
}

#[tokio::test]
async fn refresh_replaces_previous_score() {
    let (_, store) = test_store().await;
    store.refresh(&StaticMetrics::sample()).await.unwrap();

    let weak = StaticMetrics(GrowthMetrics {
        skill_progress: 10.0,
        posting_frequency: 0.0,
        network_engagement: 20.0,
        mentor_feedback: 1.0,
    });
    let score = store.refresh(&weak).await.unwrap();
    assert_eq!(score.level, Level::Low);
    assert_eq!(store.load().await.unwrap().unwrap().level, Level::Low);
}

#[tokio::test]
async fn corrupt_value_triggers_recompute() {
    let (db, store) = test_store().await;
    db.kv_put("growth", SCORE_KEY, "{not json").await.unwrap();

    assert!(store.load().await.unwrap().is_none());

    let source = CountingSource::new(StaticMetrics::sample());
    let score = store.current(&source).await.unwrap();
    assert_eq!(source.calls(), 1);
    assert_eq!(store.load().await.unwrap(), Some(score));
}

#[tokio::test]
async fn failing_source_leaves_stored_score_untouched() {
    let (_, store) = test_store().await;
    let stored = store.refresh(&StaticMetrics::sample()).await.unwrap();

    let result = store.refresh(&BrokenSource).await;
    assert!(matches!(result, Err(Error::InvalidMetrics(_))));
    assert_eq!(store.load().await.unwrap(), Some(stored));
}

#[tokio::test]
async fn clear_forgets_the_score() {
    let (_, store) = test_store().await;
    store.refresh(&StaticMetrics::sample()).await.unwrap();

    assert!(store.clear().await.unwrap());
    assert!(store.load().await.unwrap().is_none());
    assert!(!store.clear().await.unwrap());
}

#[tokio::test]
async fn file_database_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("growth.db").display());

    {
        let db = Db::connect(&url).await.unwrap();
        db.migrate().await.unwrap();
        ScoreStore::new(db)
            .refresh(&StaticMetrics::sample())
            .await
            .unwrap();
    }

    let db = Db::connect(&url).await.unwrap();
    db.migrate().await.unwrap();
    let score = ScoreStore::new(db).load().await.unwrap().unwrap();
    assert_eq!(score.total, 73);
}
