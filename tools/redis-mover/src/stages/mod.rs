//! The four pipeline stages. Each stage is a plain async function rather
//! than an actor struct, mirroring `PublisherHandle::start` in
//! `services/comsrv/src/core/redis/publisher.rs` — spawn, hand it its
//! inputs/outputs, `await` the `JoinHandle`.
//!
//! `tokio::sync::mpsc::Receiver` has exactly one consumer, but the spec
//! allows N checkers/readers/writers to share one upstream queue. Wrapping
//! the receiver in `Arc<Mutex<_>>` turns it into a work-stealing queue: the
//! Coordinator enqueues one `EndOfStream` per consumer, and whichever
//! worker pops it exits without forwarding it (see `batch.rs`).

pub mod checker;
pub mod reader;
pub mod scanner;
pub mod writer;

use std::sync::Arc;

use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;

use crate::batch::StageMessage;

pub type SharedReceiver<T> = Arc<Mutex<Receiver<StageMessage<T>>>>;

pub fn shared<T>(receiver: Receiver<StageMessage<T>>) -> SharedReceiver<T> {
    Arc::new(Mutex::new(receiver))
}
