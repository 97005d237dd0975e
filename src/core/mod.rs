//! Core runtime infrastructure.
//!
//! This module contains the essential components for running the trackcast broker:
//! - `config` - Configuration parsing and validation
//! - `runtime` - Main runtime orchestration
//! - `time` - Deterministic time utilities

pub mod config;
pub mod runtime;
pub mod time;

pub use config::*;
pub use runtime::*;
pub use time::*;
