//! Process discovery for the inference server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ProcessLocator              │
//! │  - /proc/[pid]/cmdline  (signature scan) │
//! │  - /proc/[pid]/stat     (cpu, identity)  │
//! │  - /proc/[pid]/status   (VmRSS)          │
//! └────────────────────┬─────────────────────┘
//!                      │
//!               ┌──────▼──────┐
//!               │  FileSystem │ (trait)
//!               └──────┬──────┘
//!              ┌───────┴───────┐
//!       ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │
//!       │  (Linux)    │ │  (Testing)  │
//!       └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use llamawatch_core::collector::{MockFs, ProcessLocator};
//!
//! let mut locator = ProcessLocator::new(MockFs::llama_host(), "/proc", "llama-server");
//! let handle = locator.locate().unwrap();
//! let usage = locator.sample(&handle).unwrap();
//! assert_eq!(usage.cpu_percent, 0.0);
//! ```

pub mod mock;
pub mod procfs;
pub mod traits;

pub use mock::MockFs;
pub use procfs::{ProcessError, ProcessHandle, ProcessLocator, ProcessObservation, UsageSample};
pub use traits::{FileSystem, RealFs};
