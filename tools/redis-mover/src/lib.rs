//! Library surface for `redis-mover`, split out of the binary crate so
//! integration tests (`tests/end_to_end.rs`) can drive `coordinator::run`
//! directly against real Redis containers, the way `voltage_modbus` splits
//! `src/lib.rs` from its `src/bin/*.rs` demos in the teacher's workspace.

pub mod batch;
pub mod cli;
pub mod coordinator;
pub mod display;
pub mod endpoint;
pub mod error;
pub mod stages;
pub mod stats;
