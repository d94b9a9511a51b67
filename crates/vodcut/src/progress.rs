//! Typed progress events and the whole-percent tracker shared by download workers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Pipeline stage a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Downloading,
    Combining,
    Finalizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Downloading => f.write_str("Downloading"),
            Phase::Combining => f.write_str("Combining"),
            Phase::Finalizing => f.write_str("Finalizing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Percent { phase: Phase, percent: u8 },
    Status { phase: Phase, message: String },
}

/// Callback invoked from worker tasks; must be cheap and thread-safe.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Optional progress callback shared between pipeline stages.
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<ProgressCallback>,
}

impl ProgressSink {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn percent(&self, phase: Phase, percent: u8) {
        self.emit(ProgressEvent::Percent { phase, percent });
    }

    pub fn status(&self, phase: Phase, message: impl Into<String>) {
        self.emit(ProgressEvent::Status {
            phase,
            message: message.into(),
        });
    }
}

impl From<Option<ProgressCallback>> for ProgressSink {
    fn from(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Counts completed units and reports whole percentages, never going backwards.
///
/// Completions may be recorded from many tasks at once; each new percentage is emitted once.
#[derive(Debug)]
pub struct PercentTracker {
    phase: Phase,
    total: usize,
    done: AtomicUsize,
    last: Mutex<Option<u8>>,
    sink: ProgressSink,
}

impl PercentTracker {
    pub fn new(phase: Phase, total: usize, sink: ProgressSink) -> Self {
        Self {
            phase,
            total,
            done: AtomicUsize::new(0),
            last: Mutex::new(None),
            sink,
        }
    }

    /// Record one finished unit and return the new completed count.
    pub fn complete_one(&self) -> usize {
        let done = self.done.fetch_add(1, Ordering::AcqRel) + 1;
        self.report(done);
        done
    }

    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Acquire)
    }

    fn report(&self, done: usize) {
        let percent = if self.total == 0 {
            100
        } else {
            (done.min(self.total) * 100 / self.total) as u8
        };

        let mut last = self.last.lock();
        if last.is_some_and(|prev| prev >= percent) {
            return;
        }
        *last = Some(percent);
        if self.phase == Phase::Downloading {
            self.sink
                .status(self.phase, format!("{} {percent}%", self.phase));
        }
        self.sink.percent(self.phase, percent);
    }
}
