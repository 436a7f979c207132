//! gattlink CLI library
//!
//! Argument parsing, configuration loading and the command handlers that
//! drive a `GattSession` over the simulated transport.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::CliAppConfig;
pub use error::{CliError, Result};
