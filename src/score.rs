//! Growth score engine.
//!
//! Reduces a [`GrowthMetrics`] snapshot to a 0-100 [`GrowthScore`]. The
//! computation is a total, side-effect-free function: out-of-domain inputs
//! are saturated rather than rejected, so it can be called from any thread.

use opentelemetry::KeyValue;

use crate::error::Result;
use crate::model::growth::{Breakdown, GrowthMetrics, GrowthScore, Level};
use crate::telemetry::metrics;

/// Weights in percent: skill, posting, network, mentor.
pub const WEIGHTS: [u32; 4] = [30, 25, 25, 20];

const _: () = assert!(WEIGHTS[0] + WEIGHTS[1] + WEIGHTS[2] + WEIGHTS[3] == 100);

/// Posts per week at which the posting signal saturates.
pub const POSTING_SATURATION: f64 = 10.0;

/// Upper end of the mentor feedback scale.
pub const MENTOR_SCALE: f64 = 10.0;

/// Compute the growth score for a snapshot.
pub fn compute(metrics: &GrowthMetrics) -> GrowthScore {
    let score = compute_quiet(metrics);
    metrics::score_computed().add(1, &[KeyValue::new("level", score.level.to_string())]);
    score
}

/// [`compute`] without recording telemetry.
fn compute_quiet(m: &GrowthMetrics) -> GrowthScore {
    let normalized = [
        saturate(m.skill_progress),
        saturate(m.posting_frequency / POSTING_SATURATION * 100.0),
        saturate(m.network_engagement),
        saturate(m.mentor_feedback / MENTOR_SCALE * 100.0),
    ];

    let weighted = |i: usize| normalized[i] * f64::from(WEIGHTS[i]) / 100.0;
    let breakdown = Breakdown {
        skill_progress: weighted(0),
        posting_frequency: weighted(1),
        network_engagement: weighted(2),
        mentor_feedback: weighted(3),
    };

    // Each normalized term is in [0, 100] and the weights sum to 100%, so
    // the rounded sum is in [0, 100].
    let total = breakdown.sum().round().clamp(0.0, 100.0) as u8;
    let level = Level::from_total(total);

    GrowthScore {
        total,
        breakdown,
        level,
        color: level.color(),
    }
}

/// Clamp a normalized signal to [0, 100]. NaN counts as no signal.
fn saturate(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

// ---------------------------------------------------------------------------
// Metrics sources
// ---------------------------------------------------------------------------

/// Supplier of the current metrics snapshot (connectors, mock data, files).
pub trait MetricsSource: Send + Sync {
    fn snapshot(&self) -> Result<GrowthMetrics>;
}

/// A source that always returns the same snapshot.
#[derive(Debug, Clone, Copy)]
pub struct StaticMetrics(pub GrowthMetrics);

impl StaticMetrics {
    /// The dashboard's built-in sample profile.
    pub fn sample() -> Self {
        Self(GrowthMetrics {
            skill_progress: 78.0,
            posting_frequency: 6.0,
            network_engagement: 72.0,
            mentor_feedback: 8.5,
        })
    }
}

impl MetricsSource for StaticMetrics {
    fn snapshot(&self) -> Result<GrowthMetrics> {
        Ok(self.0)
    }
}
