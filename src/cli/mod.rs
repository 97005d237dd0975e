//! Trackcast CLI - unified command-line interface.
//!
//! Provides a single binary entry point for:
//! - `trackcast start` - Start the broker
//! - `trackcast subscribe` - Stream shipment events (kcat -C style)
//! - `trackcast notify` - Push a status change through the notify ingress

mod args;
pub mod commands;

pub use args::{Cli, Commands, ConnectArgs, NotifyArgs, OutputFormat, RoleArg, SubscribeArgs};
