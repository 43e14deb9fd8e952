//! Growth metrics and the score derived from them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Current snapshot of the four raw activity signals.
///
/// No identity: there is only ever "the current" snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthMetrics {
    /// Skill progress, 0-100.
    pub skill_progress: f64,
    /// Posts per week. Unbounded, practically 0-15.
    pub posting_frequency: f64,
    /// Network engagement, 0-100.
    pub network_engagement: f64,
    /// Mentor feedback, 0-10.
    pub mentor_feedback: f64,
}

impl GrowthMetrics {
    /// Parse a snapshot from a JSON object.
    ///
    /// Missing or non-numeric fields are rejected with
    /// [`Error::InvalidMetrics`]. Out-of-range numbers are accepted; the
    /// score engine saturates them.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::InvalidMetrics(e.to_string()))
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::InvalidMetrics(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// Weighted sub-scores. Their rounded sum is the score total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub skill_progress: f64,
    pub posting_frequency: f64,
    pub network_engagement: f64,
    pub mentor_feedback: f64,
}

impl Breakdown {
    pub fn sum(&self) -> f64 {
        self.skill_progress + self.posting_frequency + self.network_engagement + self.mentor_feedback
    }
}

/// Derived 0-100 health score. Replaced wholesale, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthScore {
    pub total: u8,
    pub breakdown: Breakdown,
    pub level: Level,
    pub color: Color,
}

/// Categorical band of a score total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
    Excellent,
}

impl Level {
    /// Step function over the total with breakpoints 40 / 65 / 85.
    /// Each band is inclusive-lower, exclusive-upper; the top band is open.
    pub fn from_total(total: u8) -> Self {
        match total {
            0..40 => Level::Low,
            40..65 => Level::Medium,
            65..85 => Level::High,
            _ => Level::Excellent,
        }
    }

    pub fn color(self) -> Color {
        match self {
            Level::Low => Color::Red,
            Level::Medium => Color::Yellow,
            Level::High => Color::Green,
            Level::Excellent => Color::Blue,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
            Level::Excellent => "excellent",
        };
        write!(f, "{s}")
    }
}

/// Severity tag, one-to-one with [`Level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Red,
    Yellow,
    Green,
    Blue,
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Color::Red => "red",
            Color::Yellow => "yellow",
            Color::Green => "green",
            Color::Blue => "blue",
        };
        write!(f, "{s}")
    }
}
