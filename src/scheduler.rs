//! Frame scheduler: coalesces reactions onto the next frame boundary.
//!
//! Tasks are plain values; two tasks are the same task when they compare
//! equal. Scheduling a task that is already pending is a no-op (a higher
//! priority still promotes it). At the frame boundary the owner drains the
//! batch with [`FrameScheduler::begin_frame`] (or runs it in place with
//! [`FrameScheduler::flush`]): high lane first, then normal, each in
//! insertion order. Tasks scheduled while a batch runs land in the next frame.
//!
//! At most one frame request is outstanding with the [`FrameClock`] at any
//! time, no matter how many tasks are pending.

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_test;

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::rc::Rc;

/// Execution lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    #[default]
    Normal,
    /// Runs before every normal task of the same frame.
    High,
}

/// Source of frame-boundary callbacks (the host's animation frame).
pub trait FrameClock {
    /// Ask the host to drive one frame soon.
    fn request_frame(&mut self);
}

/// Clock for hosts that drive frames themselves, and for tests.
///
/// Clones share the request counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    requests: Rc<Cell<usize>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of frame requests received.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl FrameClock for ManualClock {
    fn request_frame(&mut self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// Outcome of one flushed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Tasks that ran to completion.
    pub executed: usize,
    /// Tasks that returned an error. Their siblings still ran.
    pub failed: usize,
}

impl FlushReport {
    /// Count one task result, logging failures.
    pub fn record<T: Debug, E: Display>(&mut self, task: &T, result: Result<(), E>) {
        match result {
            Ok(()) => self.executed += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(task = ?task, error = %e, "frame task failed");
            }
        }
    }

    /// Fold another report into this one.
    pub fn absorb(&mut self, other: FlushReport) {
        self.executed += other.executed;
        self.failed += other.failed;
    }
}

/// Per-frame task queue with two priority lanes.
pub struct FrameScheduler<T> {
    high: Vec<T>,
    normal: Vec<T>,
    pending: HashMap<T, Priority>,
    clock: Box<dyn FrameClock>,
    frame_requested: bool,
}

impl<T> FrameScheduler<T>
where
    T: Eq + Hash + Clone + Debug,
{
    #[must_use]
    pub fn new(clock: Box<dyn FrameClock>) -> Self {
        Self { high: Vec::new(), normal: Vec::new(), pending: HashMap::new(), clock, frame_requested: false }
    }

    /// Queue `task` for the next frame. Returns `false` when it was already
    /// pending at the same or higher priority.
    pub fn schedule(&mut self, task: T, priority: Priority) -> bool {
        match self.pending.get(&task).copied() {
            Some(existing) if existing >= priority => return false,
            Some(_) => {
                // Promotion: normal -> high.
                self.normal.retain(|t| *t != task);
            }
            None => {}
        }
        self.pending.insert(task.clone(), priority);
        match priority {
            Priority::High => self.high.push(task),
            Priority::Normal => self.normal.push(task),
        }
        self.request_frame();
        true
    }

    /// Drop a pending task. Returns `false` if it was not pending.
    pub fn cancel(&mut self, task: &T) -> bool {
        let Some(priority) = self.pending.remove(task) else {
            return false;
        };
        match priority {
            Priority::High => self.high.retain(|t| t != task),
            Priority::Normal => self.normal.retain(|t| t != task),
        }
        true
    }

    #[must_use]
    pub fn is_pending(&self, task: &T) -> bool {
        self.pending.contains_key(task)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether a frame request is outstanding with the clock.
    #[must_use]
    pub fn frame_requested(&self) -> bool {
        self.frame_requested
    }

    /// Take this frame's batch: high lane, then normal lane.
    ///
    /// Clears the outstanding frame request, so anything scheduled while
    /// the batch runs requests a fresh frame.
    pub fn begin_frame(&mut self) -> Vec<T> {
        self.frame_requested = false;
        self.pending.clear();
        let mut batch = std::mem::take(&mut self.high);
        batch.append(&mut self.normal);
        batch
    }

    /// Run this frame's batch with `run`. Failures are logged and counted.
    pub fn flush<E, F>(&mut self, mut run: F) -> FlushReport
    where
        E: Display,
        F: FnMut(&T) -> Result<(), E>,
    {
        let batch = self.begin_frame();
        let mut report = FlushReport::default();
        for task in &batch {
            report.record(task, run(task));
        }
        report
    }

    fn request_frame(&mut self) {
        if !self.frame_requested {
            self.frame_requested = true;
            self.clock.request_frame();
        }
    }
}
