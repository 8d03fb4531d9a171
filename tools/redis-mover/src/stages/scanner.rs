//! Scanner stage — the single producer that walks the source keyspace via
//! `SCAN` and emits batches of key names. There is always exactly one
//! scanner; spec section 4.3 doesn't parameterize its count the way the
//! other three stages are.

use tokio::sync::mpsc::Sender;

use crate::batch::StageMessage;
use crate::endpoint::{EndpointAddr, RedisEndpoint, ScanState};
use crate::error::Result;
use crate::stats::StatsTracker;

pub struct ScannerConfig {
    pub source: EndpointAddr,
    pub batch_size: usize,
    pub count_limit: Option<u64>,
    pub track_items: bool,
}

/// Returns the number of keys actually emitted downstream.
pub async fn run(
    config: ScannerConfig,
    out: Sender<StageMessage<Vec<u8>>>,
    stats: StatsTracker,
) -> Result<u64> {
    let mut endpoint = RedisEndpoint::connect(config.source).await?;
    let mut state = ScanState::new();
    let mut emitted: u64 = 0;
    let mut pending: Vec<Vec<u8>> = Vec::with_capacity(config.batch_size);

    'scan: while !state.is_exhausted() {
        if at_limit(config.count_limit, emitted) {
            break;
        }
        let chunk = {
            let _timer = stats.track("scan_elapsed");
            endpoint.scan_chunk(&mut state, config.batch_size).await?
        };
        for key in chunk {
            if at_limit(config.count_limit, emitted) {
                break 'scan;
            }
            pending.push(key);
            emitted += 1;
            if pending.len() >= config.batch_size {
                flush(&out, &mut pending, config.track_items, &stats).await;
            }
        }
    }
    if !pending.is_empty() {
        flush(&out, &mut pending, config.track_items, &stats).await;
    }
    Ok(emitted)
}

fn at_limit(limit: Option<u64>, emitted: u64) -> bool {
    matches!(limit, Some(n) if emitted >= n)
}

async fn flush(
    out: &Sender<StageMessage<Vec<u8>>>,
    pending: &mut Vec<Vec<u8>>,
    track_items: bool,
    stats: &StatsTracker,
) {
    let batch = std::mem::take(pending);
    stats.increment("batches");
    if track_items {
        stats.increment_by("keys_scanned", batch.len() as u64);
    }
    let _ = out.send(StageMessage::batch(batch)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_check() {
        assert!(!at_limit(None, 1_000_000));
        assert!(!at_limit(Some(10), 9));
        assert!(at_limit(Some(10), 10));
        assert!(at_limit(Some(10), 11));
    }
}
