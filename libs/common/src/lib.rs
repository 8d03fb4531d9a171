//! Shared basics for redis-mover binaries.
//!
//! Provides logging initialization and a small error type, split out the
//! way `common` is split out for every VoltageEMS service.

pub mod error;
pub mod logging;

pub mod prelude {
    pub use crate::error::{Error, Result};
}
