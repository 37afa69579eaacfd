//! Batching, concurrent dispatch and run control.
//!
//! - [`batcher`] - partition the record stream into work units
//! - [`dispatcher`] - bounded worker pool around the extractor
//! - [`controller`] - phases, staging, error log and the run summary

pub mod batcher;
pub mod controller;
pub mod dispatcher;

pub use batcher::{BatchEvent, Batcher};
pub use controller::{Pipeline, RunPhase, RunResult};
pub use dispatcher::{process_unit, DispatchEvent, DispatchHandle, Dispatcher, UnitOutcome};
