//! Checker stage (optional, `--checkers N`) — filters out keys that
//! already exist at the destination before they reach a Reader, so the
//! expensive DUMP/RESTORE round trip is only paid for keys worth copying.

use tokio::sync::mpsc::Sender;
use tracing::debug;

use crate::batch::StageMessage;
use crate::endpoint::{EndpointAddr, PipelineBuffer, PipelineReply, RedisEndpoint};
use crate::error::Result;
use crate::stages::SharedReceiver;
use crate::stats::StatsTracker;

pub async fn run(
    destination: EndpointAddr,
    input: SharedReceiver<Vec<u8>>,
    out: Sender<StageMessage<Vec<u8>>>,
    track_items: bool,
    stats: StatsTracker,
) -> Result<()> {
    let mut endpoint = RedisEndpoint::connect(destination).await?;

    loop {
        let batch = match recv(&input).await {
            Some(batch) => batch,
            None => break,
        };
        if batch.is_empty() {
            continue;
        }

        let mut buffer = PipelineBuffer::new();
        for key in &batch {
            buffer.exists(key.clone());
        }
        let replies = {
            let _timer = stats.track("check_elapsed");
            endpoint.execute(buffer).await?
        };

        let mut survivors = Vec::with_capacity(batch.len());
        for (key, reply) in batch.into_iter().zip(replies) {
            match reply {
                Ok(PipelineReply::Exists(true)) => stats.increment("keys_skipped"),
                Ok(_) => survivors.push(key),
                Err(err) => {
                    debug!(error = %err, "EXISTS check failed, treating key as not present");
                    survivors.push(key);
                },
            }
        }

        stats.increment("batches");
        if !survivors.is_empty() {
            if track_items {
                stats.increment_by("keys_checked", survivors.len() as u64);
            }
            let _ = out.send(StageMessage::batch(survivors)).await;
        }
    }
    Ok(())
}

async fn recv(input: &SharedReceiver<Vec<u8>>) -> Option<Vec<Vec<u8>>> {
    let mut guard = input.lock().await;
    match guard.recv().await {
        Some(StageMessage::Batch(batch)) => Some(batch),
        Some(StageMessage::EndOfStream) | None => None,
    }
}
