//! Per-worker telemetry emission.
//!
//! `StatsTracker` is a thin capability bound to one worker name, writing
//! `(worker, metric, delta)` events to a shared channel. It holds no local
//! aggregation state — aggregation is `Display`'s job (see `display.rs`).

use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

/// Either side of a telemetry event's payload.
#[derive(Debug, Clone, Copy)]
pub enum Delta {
    Count(u64),
    Elapsed(Duration),
}

#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub worker: String,
    pub metric: &'static str,
    pub delta: Delta,
}

#[derive(Clone)]
pub struct StatsTracker {
    worker: String,
    sender: UnboundedSender<TelemetryEvent>,
}

impl StatsTracker {
    pub fn new(worker: impl Into<String>, sender: UnboundedSender<TelemetryEvent>) -> Self {
        Self {
            worker: worker.into(),
            sender,
        }
    }

    /// Emit `(name, metric, +1)`. Silently drops the event if Display has
    /// already gone away — telemetry is never on the correctness path.
    pub fn increment(&self, metric: &'static str) {
        let _ = self.sender.send(TelemetryEvent {
            worker: self.worker.clone(),
            metric,
            delta: Delta::Count(1),
        });
    }

    /// Increment by an arbitrary count in one event, e.g. batch size.
    pub fn increment_by(&self, metric: &'static str, count: u64) {
        if count == 0 {
            return;
        }
        let _ = self.sender.send(TelemetryEvent {
            worker: self.worker.clone(),
            metric,
            delta: Delta::Count(count),
        });
    }

    /// Scoped timer: start now, emit the elapsed duration when the guard
    /// drops (normal return, `?`-propagated error, or panic unwind all
    /// trigger the same `Drop` impl, so release happens on every exit path).
    pub fn track(&self, metric: &'static str) -> TimerGuard<'_> {
        TimerGuard {
            tracker: self,
            metric,
            start: Instant::now(),
        }
    }
}

pub struct TimerGuard<'a> {
    tracker: &'a StatsTracker,
    metric: &'static str,
    start: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let _ = self.tracker.sender.send(TelemetryEvent {
            worker: self.tracker.worker.clone(),
            metric: self.metric,
            delta: Delta::Elapsed(self.start.elapsed()),
        });
    }
}
