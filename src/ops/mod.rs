//! Operations and observability.
//!
//! This module provides operational tooling:
//! - `telemetry` - Logging setup and the admin HTTP endpoint

pub mod telemetry;

pub use telemetry::*;
