//! Reader stage — `DUMP`s each candidate key from the source and forwards
//! `(key, dump)` pairs downstream. A key that vanished between scan and
//! read yields a `None` dump; that pair still rides to the Writer rather
//! than being dropped here, since whether a missing dump is worth a log
//! line is the Writer's call, not the Reader's (spec section 9).

use tokio::sync::mpsc::Sender;
use tracing::warn;

use crate::batch::StageMessage;
use crate::endpoint::{EndpointAddr, PipelineBuffer, PipelineReply, RedisEndpoint};
use crate::error::Result;
use crate::stages::SharedReceiver;
use crate::stats::StatsTracker;

pub type KeyDump = (Vec<u8>, Option<Vec<u8>>);

pub async fn run(
    source: EndpointAddr,
    input: SharedReceiver<Vec<u8>>,
    out: Sender<StageMessage<KeyDump>>,
    track_items: bool,
    stats: StatsTracker,
) -> Result<()> {
    let mut endpoint = RedisEndpoint::connect(source).await?;

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
            buffer.dump(key.clone());
        }
        let replies = {
            let _timer = stats.track("read_elapsed");
            endpoint.execute(buffer).await?
        };

        let mut pairs = Vec::with_capacity(batch.len());
        for (key, reply) in batch.into_iter().zip(replies) {
            match reply {
                Ok(PipelineReply::Dump(value)) => pairs.push((key, value)),
                Ok(_) => unreachable!("reader only issues DUMP commands"),
                Err(err) => warn!(error = %err, "DUMP failed, key will be skipped"),
            }
        }

        stats.increment("batches");
        if track_items {
            stats.increment_by("keys_read", pairs.len() as u64);
        }
        if !pairs.is_empty() {
            let _ = out.send(StageMessage::batch(pairs)).await;
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
