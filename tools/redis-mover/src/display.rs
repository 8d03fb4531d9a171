//! Live-refreshing terminal table of per-worker counters, built from the
//! `TelemetryEvent` stream. Grounded in `tools/monarch/src/doctor.rs`'s
//! colored status-table rendering, swapping `ratatui`/`crossterm` (used
//! elsewhere in the teacher for an interactive dashboard this tool has no
//! need of) for plain `colored` + carriage-return repaint, since this is a
//! one-shot progress readout rather than an interactive TUI.

use std::collections::BTreeMap;
use std::time::Duration;

use colored::Colorize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::stats::{Delta, TelemetryEvent};

#[derive(Debug, Default, Clone)]
struct WorkerState {
    counts: BTreeMap<&'static str, u64>,
    elapsed: BTreeMap<&'static str, Duration>,
}

/// Running totals, keyed by worker name. Exposed mainly for tests; the
/// live loop only ever touches it through `apply` and `render`.
#[derive(Debug, Default)]
pub struct AggregatedState {
    workers: BTreeMap<String, WorkerState>,
}

impl AggregatedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: TelemetryEvent) {
        let state = self.workers.entry(event.worker).or_default();
        match event.delta {
            Delta::Count(n) => {
                *state.counts.entry(event.metric).or_insert(0) += n;
            },
            Delta::Elapsed(d) => {
                *state.elapsed.entry(event.metric).or_insert(Duration::ZERO) += d;
            },
        }
    }

    /// Orders workers the way the spec groups them: checker, scanner,
    /// reader, writer, global, with anything unrecognized trailing so a
    /// future worker kind never panics the sort.
    fn ordered_names(&self) -> Vec<&str> {
        fn rank(name: &str) -> u8 {
            match name.chars().next() {
                Some('c') => 0,
                Some('s') => 1,
                Some('r') => 2,
                Some('w') => 3,
                Some('g') => 4,
                _ => 5,
            }
        }
        let mut names: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        names.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.cmp(b)));
        names
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for name in self.ordered_names() {
            let state = &self.workers[name];
            let batches = state.counts.get("batches").copied().unwrap_or(0);

            // Every raw field renders as-is; every field also gets a
            // per-batch average once `batches` is nonzero, so both land in
            // one sorted-by-name collection per spec 4.7 rather than three
            // separate, un-interleaved passes.
            let mut fields: Vec<(String, String)> = Vec::new();
            for (metric, count) in &state.counts {
                fields.push((metric.to_string(), count.to_string()));
                if batches > 0 && *metric != "batches" {
                    let avg = *count as f64 / batches as f64;
                    fields.push((format!("{metric}_avg"), format!("{avg:.2}")));
                }
            }
            for (metric, total) in &state.elapsed {
                if batches > 0 {
                    let avg_ms = total.as_secs_f64() * 1000.0 / batches as f64;
                    fields.push((format!("{metric}_avg"), format!("{avg_ms:.1}")));
                }
            }
            fields.sort_by(|a, b| a.0.cmp(&b.0));

            let mut line = format!("{:<12}", colorize_worker(name));
            for (metric, value) in &fields {
                line.push_str(&format!(" {metric}={value}"));
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

fn colorize_worker(name: &str) -> colored::ColoredString {
    match name.chars().next() {
        Some('s') => name.cyan().bold(),
        Some('c') => name.yellow(),
        Some('r') => name.green(),
        Some('w') => name.magenta(),
        _ => name.normal(),
    }
}

/// Drains whatever telemetry is currently queued without blocking, folding
/// each event into `state`. Used both by the periodic refresh and by the
/// final drain after every stage has joined.
fn drain_available(receiver: &mut UnboundedReceiver<TelemetryEvent>, state: &mut AggregatedState) {
    while let Ok(event) = receiver.try_recv() {
        state.apply(event);
    }
}

/// Runs until `stop` resolves, repainting every `refresh_interval`, then
/// drains any events still queued and renders once more so the final
/// totals reflect every batch that was ever reported — not just whatever
/// had arrived by the last periodic tick.
pub async fn run(
    mut receiver: UnboundedReceiver<TelemetryEvent>,
    refresh_interval: Duration,
    stop: tokio::sync::oneshot::Receiver<()>,
) -> AggregatedState {
    let mut state = AggregatedState::new();
    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                drain_available(&mut receiver, &mut state);
                repaint(&state);
            }
            event = receiver.recv() => {
                match event {
                    Some(event) => state.apply(event),
                    None => break,
                }
            }
            _ = &mut stop => break,
        }
    }

    drain_available(&mut receiver, &mut state);
    repaint(&state);
    state
}

fn repaint(state: &AggregatedState) {
    print!("\x1b[2J\x1b[H");
    println!("{}", "redis-mover".bold());
    println!("{}", state.render());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(worker: &str, metric: &'static str, delta: Delta) -> TelemetryEvent {
        TelemetryEvent {
            worker: worker.to_string(),
            metric,
            delta,
        }
    }

    #[test]
    fn aggregates_counts_across_events() {
        let mut state = AggregatedState::new();
        state.apply(event("reader-0", "keys_read", Delta::Count(10)));
        state.apply(event("reader-0", "keys_read", Delta::Count(5)));
        assert_eq!(state.workers["reader-0"].counts["keys_read"], 15);
    }

    #[test]
    fn averages_elapsed_over_batch_count() {
        let mut state = AggregatedState::new();
        state.apply(event("writer-0", "batches", Delta::Count(2)));
        state.apply(event("writer-0", "write_elapsed", Delta::Elapsed(Duration::from_millis(100))));
        state.apply(event("writer-0", "write_elapsed", Delta::Elapsed(Duration::from_millis(300))));
        let rendered = state.render();
        assert!(rendered.contains("write_elapsed_avg=200.0"));
    }

    #[test]
    fn orders_by_role_then_name() {
        let mut state = AggregatedState::new();
        state.apply(event("writer-1", "x", Delta::Count(1)));
        state.apply(event("scanner", "x", Delta::Count(1)));
        state.apply(event("checker-0", "x", Delta::Count(1)));
        state.apply(event("global_0", "x", Delta::Count(1)));
        state.apply(event("mystery", "x", Delta::Count(1)));
        let order = state.ordered_names();
        assert_eq!(
            order,
            vec!["checker-0", "scanner", "writer-1", "global_0", "mystery"]
        );
    }
}
