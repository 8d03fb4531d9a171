//! Wires the four stages together: builds the channels, starts every
//! worker, drives the Scanner to completion, then walks the pipeline
//! stage by stage — inject sentinels, join, inject the next stage's
//! sentinels — per spec section 4.8. Grounded in the startup/shutdown
//! sequencing of `PublisherHandle::start`/`stop` in
//! `services/comsrv/src/core/redis/publisher.rs`, generalized from one
//! fixed worker to N-wide fan-out at each of four stages.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::batch::StageMessage;
use crate::display::{self, AggregatedState};
use crate::endpoint::EndpointAddr;
use crate::error::{MoverError, Result};
use crate::stages::{self, checker, reader, scanner, writer};
use crate::stats::StatsTracker;

pub struct RunConfig {
    pub source: EndpointAddr,
    pub destination: EndpointAddr,
    pub batch_size: usize,
    pub count_limit: Option<u64>,
    pub checkers: usize,
    pub readers: usize,
    pub writers: usize,
    pub track_items: bool,
    pub refresh_interval: Duration,
}

pub struct RunSummary {
    pub keys_scanned: u64,
    pub final_state: AggregatedState,
}

pub async fn run(config: RunConfig) -> Result<RunSummary> {
    let readers = config.readers.max(1);
    let writers = config.writers.max(1);
    let checkers = config.checkers;

    let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = oneshot::channel();
    let display_task = tokio::spawn(display::run(telemetry_rx, config.refresh_interval, stop_rx));

    // Readers -> Writers
    let (write_tx, write_rx) = mpsc::channel::<StageMessage<reader::KeyDump>>(4 * writers);
    let write_rx = stages::shared(write_rx);
    let writer_handles: Vec<_> = (0..writers)
        .map(|i| {
            let stats = StatsTracker::new(format!("writer-{i}"), telemetry_tx.clone());
            let destination = config.destination.clone();
            let write_rx = write_rx.clone();
            let track_items = config.track_items;
            tokio::spawn(async move { writer::run(destination, write_rx, track_items, stats).await })
        })
        .collect();

    // (Checkers or Scanner) -> Readers
    let (read_tx, read_rx) = mpsc::channel::<StageMessage<Vec<u8>>>(4 * readers);
    let read_rx = stages::shared(read_rx);
    let reader_handles: Vec<_> = (0..readers)
        .map(|i| {
            let stats = StatsTracker::new(format!("reader-{i}"), telemetry_tx.clone());
            let source = config.source.clone();
            let read_rx = read_rx.clone();
            let out = write_tx.clone();
            let track_items = config.track_items;
            tokio::spawn(async move { reader::run(source, read_rx, out, track_items, stats).await })
        })
        .collect();

    // Scanner -> Checkers (only when checkers are configured)
    let (scanner_out, checker_handles) = if checkers > 0 {
        let (scan_tx, scan_rx) = mpsc::channel::<StageMessage<Vec<u8>>>(4 * checkers);
        let scan_rx = stages::shared(scan_rx);
        let handles: Vec<_> = (0..checkers)
            .map(|i| {
                let stats = StatsTracker::new(format!("checker-{i}"), telemetry_tx.clone());
                let destination = config.destination.clone();
                let scan_rx = scan_rx.clone();
                let out = read_tx.clone();
                let track_items = config.track_items;
                tokio::spawn(async move { checker::run(destination, scan_rx, out, track_items, stats).await })
            })
            .collect();
        (scan_tx, handles)
    } else {
        (read_tx.clone(), Vec::new())
    };

    // Spec 4.8 step 7: the whole scan-through-join sequence runs under one
    // global "process" timer, a peer to the per-stage timers the workers
    // emit under their own names (matches the `global_0` tracker wrapping
    // `move_data`'s join sequence in the distilled implementation).
    let global_stats = StatsTracker::new("global_0", telemetry_tx.clone());
    let keys_scanned = {
        let _timer = global_stats.track("process");

        let scanner_stats = StatsTracker::new("scanner", telemetry_tx.clone());
        let scanner_config = scanner::ScannerConfig {
            source: config.source.clone(),
            batch_size: config.batch_size,
            count_limit: config.count_limit,
            track_items: config.track_items,
        };
        let keys_scanned = scanner::run(scanner_config, scanner_out.clone(), scanner_stats).await?;
        info!(keys_scanned, "scan complete, draining pipeline");

        // Scanner is done: tell whoever reads its output queue there's no more.
        let scan_consumers = if checkers > 0 { checkers } else { readers };
        send_sentinels(&scanner_out, scan_consumers).await;
        drop(scanner_out);

        join_all_stage(checker_handles, "checker").await?;
        if checkers > 0 {
            // Checkers have all exited; readers now need their own sentinels.
            send_sentinels(&read_tx, readers).await;
        }
        drop(read_tx);

        join_all_stage(reader_handles, "reader").await?;
        send_sentinels(&write_tx, writers).await;
        drop(write_tx);

        join_all_stage(writer_handles, "writer").await?;
        keys_scanned
    };

    let _ = stop_tx.send(());
    let final_state = display_task.await.map_err(|e| MoverError::Cluster {
        addr: "display".to_string(),
        reason: e.to_string(),
    })?;

    Ok(RunSummary {
        keys_scanned,
        final_state,
    })
}

async fn send_sentinels<T: Send + 'static>(sender: &mpsc::Sender<StageMessage<T>>, count: usize) {
    for _ in 0..count {
        let _ = sender.send(StageMessage::EndOfStream).await;
    }
}

async fn join_all_stage(
    handles: Vec<tokio::task::JoinHandle<Result<()>>>,
    stage: &str,
) -> Result<()> {
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {},
            Ok(Err(err)) => {
                error!(stage, error = %err, "worker exited with an error");
                return Err(err);
            },
            Err(join_err) => {
                error!(stage, error = %join_err, "worker task panicked");
                return Err(MoverError::Cluster {
                    addr: stage.to_string(),
                    reason: join_err.to_string(),
                });
            },
        }
    }
    Ok(())
}
