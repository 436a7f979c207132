//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a full session against a simulated peripheral
    Demo {
        /// Number of notifications the peripheral sends
        #[arg(short, long, default_value_t = 3)]
        notifications: u8,
        /// Drop the link from the peripheral side instead of disconnecting
        #[arg(long)]
        drop_link: bool,
        /// Hex payload written to the control characteristic
        #[arg(short, long, default_value = "01")]
        payload: String,
    },
    /// Attempt a connection the peripheral never answers
    Timeout,
    /// Print an example configuration file
    ExampleConfig,
}
