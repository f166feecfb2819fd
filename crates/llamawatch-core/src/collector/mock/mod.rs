//! Mock `/proc` filesystem and ready-made process tables for tests.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::{LLAMA_PID, MockProcess};
