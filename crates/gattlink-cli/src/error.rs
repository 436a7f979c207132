//! Error handling for the gattlink CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("GATT error: {0}")]
    Gatt(#[from] gattlink_core::GattError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Write rejected for characteristic {0}")]
    WriteRejected(uuid::Uuid),

    #[error("Hex decoding error: {0}")]
    HexDecoding(#[from] hex::FromHexError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
