//! Batches and the end-of-stream sentinel that rides the same channel.

/// One hop's worth of homogeneous items, or the sentinel marking that no
/// more batches will follow for this particular consumer.
///
/// Modeling both cases as one enum (rather than a closed channel) is what
/// lets the Coordinator enqueue exactly N sentinels per channel for N
/// consumers, independent of how many producers fed that channel — see
/// spec section 9, "End-of-stream propagation".
pub enum StageMessage<T> {
    Batch(Vec<T>),
    EndOfStream,
}

impl<T> StageMessage<T> {
    pub fn batch(items: Vec<T>) -> Self {
        Self::Batch(items)
    }
}
