//! State module for tracking scrape progress
//!
//! # Components
//!
//! - `PageTask`: one page number moving from pending to success or exhausted
//! - `SchedulerState`: run-scoped counters and the adaptive concurrency level
//! - `ProgressSnapshot`: read-only progress view derived from the counters

mod page_task;
mod run_state;

// Re-export main types
pub use page_task::{Exhausted, PageOutcome, PageStatus, PageTask};
pub use run_state::{adapted_concurrency, ProgressSnapshot, SchedulerPhase, SchedulerState};
