//! # growth-engine
//!
//! Growth scoring, automation workflow orchestration, and the action feed
//! behind the growth dashboard.
//!
//! - [`score`] reduces activity metrics to a 0-100 score with a level.
//! - [`store`] persists the last score in a local SQLite key/value store.
//! - [`engine`] runs workflows through their lifecycle on a scheduler.
//! - [`feed`] is the append-only log of everything that happened.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod event;
pub mod feed;
pub mod model;
pub mod score;
pub mod store;
pub mod telemetry;
