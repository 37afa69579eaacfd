//! Run reporting: the advisory error log and progress callbacks.
//!
//! Both are handed to the controller at construction and live for exactly one
//! run. Nothing in the pipeline reads them back.

mod error_log;
mod progress;

pub use error_log::ErrorLog;
pub use progress::{NoProgress, ProgressSink};
