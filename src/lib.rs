#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: some functions are inherently complex
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Import style
#![allow(clippy::wildcard_imports)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
// Control flow style
#![allow(clippy::if_not_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::single_match_else)]
#![allow(clippy::manual_let_else)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
// Option/Result patterns
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Explicit returns
#![allow(clippy::needless_return)]
#![allow(clippy::semicolon_if_nothing_returned)]
// Lock scoping
#![allow(clippy::significant_drop_tightening)]
// String allocation efficiency
#![allow(clippy::format_push_string)]

//! Trackcast - real-time shipment notification broker.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::runtime` - Main runtime orchestration
//! - `core::time` - Deterministic time utilities
//!
//! ## Broker
//! - `broker` - Coordinator owning registry and subscription state
//! - `broker::session` - Per-connection session state
//! - `broker::registry` - Identity to session mapping
//! - `broker::subscriptions` - Topic subscription index
//! - `broker::liveness` - Probe/eviction sweep
//!
//! ## Protocol & Auth
//! - `protocol` - Tagged JSON wire messages
//! - `auth` - Identity verification seam
//!
//! ## Networking
//! - `net::listener` - Peer-facing TCP accept loop
//! - `net::connection` - Per-connection tasks and routing
//!
//! ## Operations
//! - `ops::telemetry` - Logging setup and admin HTTP endpoint

// Core infrastructure
pub mod core;

// Broker state and fan-out
pub mod broker;

// Wire protocol and identity verification
pub mod auth;
pub mod protocol;

// Networking
pub mod net;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, runtime, time};
pub use broker::{registry, session, subscriptions};
pub use ops::telemetry;
