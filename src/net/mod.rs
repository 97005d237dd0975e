//! Networking layer.
//!
//! This module provides networking infrastructure:
//! - `listener` - Peer-facing TCP accept loop
//! - `connection` - Per-connection tasks and message routing

pub mod connection;
pub mod listener;
