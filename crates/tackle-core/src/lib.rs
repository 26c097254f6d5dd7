//! Core library for tackle: configuration loading, package resolution,
//! checksum handling, installation and process execution.

pub mod checksum;
pub mod config;
pub mod exec;
pub mod install;
pub mod io;
pub mod paths;
pub mod registry;
pub mod settings;
pub mod wait;
pub mod which;

pub use exec::{ExecError, ExecOutcome, ExecutionController};
pub use paths::*;
pub use settings::Settings;

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("tackle/", env!("CARGO_PKG_VERSION"));
