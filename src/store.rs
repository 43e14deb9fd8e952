//! Score store: the last computed growth score, persisted so it survives
//! restarts without recomputation.
//!
//! Read-through on load, write-through on every recomputation. An absent
//! key is not an error; it triggers a recompute from the metrics source.

use tracing::{debug, info, warn};

use crate::db::Db;
use crate::error::Result;
use crate::event::{EventType, NewActionEvent};
use crate::feed::ActionFeed;
use crate::model::growth::GrowthScore;
use crate::score::{self, MetricsSource};

const NAMESPACE: &str = "growth";
pub const SCORE_KEY: &str = "growthScore";

/// Persistence for the current [`GrowthScore`].
#[derive(Clone)]
pub struct ScoreStore {
    db: Db,
}

impl ScoreStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// The stored score, if any. A value that no longer parses is treated
    /// as absent.
    pub async fn load(&self) -> Result<Option<GrowthScore>> {
        let Some(raw) = self.db.kv_get(NAMESPACE, SCORE_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(score) => Ok(Some(score)),
            Err(e) => {
                warn!(key = SCORE_KEY, "discarding unreadable stored score: {e}");
                Ok(None)
            }
        }
    }

    /// Replace the stored score.
    pub async fn save(&self, score: &GrowthScore) -> Result<()> {
        let json = serde_json::to_string(score)?;
        self.db.kv_put(NAMESPACE, SCORE_KEY, &json).await?;
        debug!(total = score.total, level = %score.level, "score saved");
        Ok(())
    }

    /// Recompute from `source` and write through.
    pub async fn refresh(&self, source: &dyn MetricsSource) -> Result<GrowthScore> {
        let metrics = source.snapshot()?;
        let score = score::compute(&metrics);
        self.save(&score).await?;
        info!(total = score.total, level = %score.level, "growth score refreshed");
        Ok(score)
    }

    /// The stored score, computing and storing one first if none exists.
    pub async fn current(&self, source: &dyn MetricsSource) -> Result<GrowthScore> {
        match self.load().await? {
            Some(score) => Ok(score),
            None => self.refresh(source).await,
        }
    }

    /// Load the current score (read-through) and post it to the feed.
    pub async fn announce(
        &self,
        source: &dyn MetricsSource,
        feed: &ActionFeed,
    ) -> Result<GrowthScore> {
        let score = self.current(source).await?;
        feed.append(
            NewActionEvent::new(
                EventType::Score,
                format!("Growth score {}", score.total),
                "score",
            )
            .description(format!("Level {} ({})", score.level, score.color)),
        )?;
        Ok(score)
    }

    /// Forget the stored score.
    pub async fn clear(&self) -> Result<bool> {
        self.db.kv_delete(NAMESPACE, SCORE_KEY).await
    }
}
