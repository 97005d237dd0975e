//! CLI command implementations.

mod pubsub;
mod start;

pub use pubsub::{run_notify, run_subscribe};
pub use start::run_start;
