//! Core data model.
//!
//! Two independent halves: the growth-score value types, and the workflow
//! records the orchestrator owns.

pub mod growth;
pub mod workflow;
