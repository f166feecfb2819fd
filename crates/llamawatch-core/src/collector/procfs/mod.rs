//! Readers for the Linux `/proc` filesystem.
//!
//! Parsers for the per-process files and the locator that finds and samples
//! the inference server process.

pub mod locator;
pub mod parser;

pub use locator::{ProcessError, ProcessHandle, ProcessLocator, ProcessObservation, UsageSample};
pub use parser::ParseError;
