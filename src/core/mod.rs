//! Core data model: identifiers, tasks, the dependency graph, goals, and
//! plans.

pub mod goal;
pub mod graph;
pub mod plan;
pub mod task;
pub mod types;
