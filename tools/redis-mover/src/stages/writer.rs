//! Writer stage — `RESTORE`s each `(key, dump)` pair at the destination.
//! TTL is always zero and `REPLACE` is never set (spec section 7): a key
//! that already exists at the destination fails its RESTORE and is
//! logged, not silently overwritten.

use tracing::{debug, trace};

use crate::batch::StageMessage;
use crate::endpoint::{EndpointAddr, PipelineBuffer, PipelineReply, RedisEndpoint};
use crate::error::Result;
use crate::stages::reader::KeyDump;
use crate::stages::SharedReceiver;
use crate::stats::StatsTracker;

pub async fn run(
    destination: EndpointAddr,
    input: SharedReceiver<KeyDump>,
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
        let mut restorable_keys = Vec::with_capacity(batch.len());
        let mut missing: u64 = 0;
        for (key, dump) in batch {
            match dump {
                Some(value) => {
                    buffer.restore(key.clone(), value);
                    restorable_keys.push(key);
                },
                None => missing += 1,
            }
        }
        if missing > 0 {
            stats.increment_by("keys_missing", missing);
        }
        if buffer.is_empty() {
            stats.increment("batches");
            continue;
        }

        let replies = {
            let _timer = stats.track("write_elapsed");
            endpoint.execute(buffer).await?
        };

        let mut written: u64 = 0;
        for (key, reply) in restorable_keys.into_iter().zip(replies) {
            match reply {
                Ok(PipelineReply::Restore) => {
                    written += 1;
                    if track_items {
                        trace!(key = %String::from_utf8_lossy(&key), "restored key");
                    }
                },
                Ok(_) => unreachable!("writer only issues RESTORE commands"),
                Err(err) => {
                    debug!(key = %String::from_utf8_lossy(&key), error = %err, "RESTORE failed, leaving destination untouched");
                },
            }
        }

        stats.increment("batches");
        stats.increment_by("keys_written", written);
    }
    Ok(())
}

async fn recv(input: &SharedReceiver<KeyDump>) -> Option<Vec<KeyDump>> {
    let mut guard = input.lock().await;
    match guard.recv().await {
        Some(StageMessage::Batch(batch)) => Some(batch),
        Some(StageMessage::EndOfStream) | None => None,
    }
}
