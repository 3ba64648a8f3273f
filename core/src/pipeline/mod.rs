// actuate/src/pipeline/mod.rs

//! The executor that drives one dispatch, the collector that aggregates its
//! results, and the result types handed back to callers.

pub(crate) mod collector;
pub(crate) mod execution;
pub mod result;

pub use result::{ActionStats, ExecutionResult, ExecutionStats};
