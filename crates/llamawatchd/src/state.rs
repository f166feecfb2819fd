//! Shared application state and the global allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use llamawatch_core::registry::MetricsRegistry;

/// State handed to every HTTP handler.
///
/// The registry is written by the watchdog only; handlers just render it.
#[derive(Clone)]
pub(crate) struct AppState {
    pub registry: Arc<MetricsRegistry>,
}
