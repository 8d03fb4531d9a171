use thiserror::Error;

/// Errors fatal to a single worker's lifetime.
///
/// Per spec section 7, a connect failure or unexpected exception is fatal
/// to the *owning worker*, not to the whole run; the Coordinator does not
/// attempt to recover a dead worker's output.
#[derive(Debug, Error)]
pub enum MoverError {
    #[error("failed to connect to {addr}: neither cluster nor single-node probe succeeded ({source})")]
    Connect {
        addr: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("cluster topology discovery failed for {addr}: {reason}")]
    Cluster { addr: String, reason: String },

    #[error("invalid endpoint address {0:?}: expected host[:port][#db]")]
    InvalidAddress(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MoverError>;
