//! llamawatch-core — process watchdog and metrics bridge for an inference server.
//!
//! Provides:
//! - `collector` — `/proc` access, parsers, and the server `ProcessLocator`
//! - `probe` — HTTP health/slot probing of the inference server
//! - `registry` — exported metric values and Prometheus text rendering
//! - `watchdog` — the periodic collection cycle fusing the above
//! - `config` — validated runtime configuration

pub mod collector;
pub mod config;
pub mod probe;
pub mod registry;
pub mod watchdog;

/// Crate version with the git revision it was built from.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_SHA"), ")");
