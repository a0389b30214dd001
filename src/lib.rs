//! Waveflow library crate: declarative workflow documents, triggers, and the wave-scheduling runtime.
pub mod cli;
pub mod core;
pub mod logging;

/// Current crate version string exposed for the CLI and tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub type Result<T> = std::result::Result<T, anyhow::Error>;
