//! Run-scoped scheduler state
//!
//! `SchedulerState` is owned by one range-scrape invocation. Workers only
//! touch it through [`SchedulerState::settle`], which updates the completed
//! and failure counters together, so callers keep it behind a single lock.

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Phases of a range scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    Idle,
    Running,
    /// Spawning the page tasks of a batch
    Dispatching,
    /// Waiting for every task of the batch to settle
    Waiting,
    /// Re-evaluating concurrency at a batch boundary
    Adapting,
    Done,
    /// Unrecoverable setup or storage fault
    Failed,
}

impl SchedulerPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: SchedulerPhase) -> bool {
        use SchedulerPhase::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Failed)
                | (Running, Dispatching)
                | (Running, Done)
                | (Running, Failed)
                | (Dispatching, Waiting)
                | (Waiting, Adapting)
                | (Waiting, Failed)
                | (Adapting, Dispatching)
                | (Adapting, Done)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Dispatching => "dispatching",
            Self::Waiting => "waiting",
            Self::Adapting => "adapting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable counters for one range scrape
#[derive(Debug, Clone)]
pub struct SchedulerState {
    /// Current phase
    pub phase: SchedulerPhase,

    /// Current adaptive concurrency level
    pub concurrency: usize,

    /// Pages in the requested range
    pub total_pages: u64,

    /// Pages settled so far (success or exhausted)
    pub completed: u64,

    /// Pages exhausted so far
    pub failed: u64,

    /// Pages exhausted since the last adaptation
    pub window_failures: u32,

    /// When the run left `Idle`
    pub started_at: Option<Instant>,
}

impl SchedulerState {
    pub fn new(total_pages: u64, concurrency: usize) -> Self {
        Self {
            phase: SchedulerPhase::Idle,
            concurrency,
            total_pages,
            completed: 0,
            failed: 0,
            window_failures: 0,
            started_at: None,
        }
    }

    /// Moves to `next`, logging transitions the state machine does not expect
    pub fn transition(&mut self, next: SchedulerPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!("Unexpected scheduler transition: {} -> {}", self.phase, next);
        }
        tracing::trace!("Scheduler phase: {} -> {}", self.phase, next);

        if next == SchedulerPhase::Running && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.phase = next;
    }

    /// Records one settled task
    pub fn settle(&mut self, failed: bool) {
        self.completed += 1;
        if failed {
            self.failed += 1;
            self.window_failures += 1;
        }
    }

    /// Applies the adaptation rule at a batch boundary
    ///
    /// Returns the new concurrency when it changed.
    pub fn adapt(&mut self, failure_threshold: u32, floor: usize) -> Option<usize> {
        let next = adapted_concurrency(
            self.concurrency,
            self.window_failures,
            failure_threshold,
            floor,
        )?;
        self.window_failures = 0;
        let changed = next != self.concurrency;
        self.concurrency = next;
        changed.then_some(next)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Point-in-time progress view
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::compute(
            self.phase,
            self.completed,
            self.failed,
            self.total_pages,
            self.concurrency,
            self.elapsed(),
        )
    }
}

/// Concurrency after a batch boundary, or `None` when no adaptation applies
///
/// Adaptation fires only when the window's failures exceed the threshold:
/// `max(floor, floor(current * 0.7))`, never above `current`.
pub fn adapted_concurrency(
    current: usize,
    window_failures: u32,
    failure_threshold: u32,
    floor: usize,
) -> Option<usize> {
    if window_failures <= failure_threshold {
        return None;
    }
    let reduced = current * 7 / 10;
    Some(reduced.max(floor).min(current))
}

/// Progress of a running or finished range scrape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub phase: SchedulerPhase,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
    pub concurrency: usize,
    pub elapsed_secs: f64,
    /// Pages per second
    pub rate: f64,
    /// `None` until the rate is known
    pub eta_secs: Option<f64>,
    /// Fraction of settled pages that succeeded, 0.0..=1.0
    pub success_rate: f64,
}

impl ProgressSnapshot {
    pub fn compute(
        phase: SchedulerPhase,
        completed: u64,
        failed: u64,
        total: u64,
        concurrency: usize,
        elapsed: Duration,
    ) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            completed as f64 / elapsed_secs
        } else {
            0.0
        };
        let eta_secs = if rate > 0.0 {
            Some(total.saturating_sub(completed) as f64 / rate)
        } else {
            None
        };
        let success_rate = if completed > 0 {
            completed.saturating_sub(failed) as f64 / completed as f64
        } else {
            0.0
        };

        Self {
            phase,
            completed,
            failed,
            total,
            concurrency,
            elapsed_secs,
            rate,
            eta_secs,
            success_rate,
        }
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} pages, {:.2} pages/sec, success {:.1}%, concurrency {}",
            self.completed,
            self.total,
            self.rate,
            self.success_rate * 100.0,
            self.concurrency
        )?;
        if let Some(eta) = self.eta_secs {
            write!(f, ", ETA {:.0}s", eta)?;
        }
        Ok(())
    }
}
