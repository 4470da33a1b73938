//! Planning and execution glue between the configuration and the
//! declarative engine.

pub mod differ;
pub mod executor;
pub mod planner;
