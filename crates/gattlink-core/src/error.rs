//! Error types for the GATT session

use thiserror::Error;

use crate::protocol::GattStatus;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors surfaced by blocking session operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattError {
    /// Unspecified failure, including a transport refusing a request outright
    /// and a wait ended by [`force_unblock`](crate::GattSession::force_unblock)
    #[error("GATT operation failed")]
    Generic,

    #[error("Not connected to a BLE device")]
    NotConnected,

    /// Connect timed out or produced no connection handle
    #[error("BLE connection failed")]
    ConnectionFailed,

    #[error("Service discovery failed with status {status}")]
    ServicesDiscovery { status: GattStatus },

    #[error("Characteristic discovery failed with status {status}")]
    CharacteristicsDiscovery { status: GattStatus },

    #[error("Characteristic configuration failed with status {status}")]
    CharacteristicConfiguring { status: GattStatus },
}

impl GattError {
    /// Whether the error was caused by the link being absent or lost
    pub fn is_link_loss(&self) -> bool {
        matches!(self, GattError::NotConnected | GattError::ConnectionFailed)
    }
}

/// Result type for GATT session operations
pub type GattResult<T> = std::result::Result<T, GattError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gatt_error_display() {
        assert_eq!(GattError::Generic.to_string(), "GATT operation failed");
        assert_eq!(
            GattError::NotConnected.to_string(),
            "Not connected to a BLE device"
        );

        let err = GattError::ServicesDiscovery {
            status: GattStatus::FAILURE,
        };
        assert_eq!(
            err.to_string(),
            "Service discovery failed with status 0x0101"
        );

        let err = GattError::CharacteristicConfiguring {
            status: GattStatus::WRITE_NOT_PERMITTED,
        };
        assert_eq!(
            err.to_string(),
            "Characteristic configuration failed with status 0x0003"
        );
    }

    #[test]
    fn test_link_loss_classification() {
        assert!(GattError::NotConnected.is_link_loss());
        assert!(GattError::ConnectionFailed.is_link_loss());
        assert!(!GattError::Generic.is_link_loss());
        assert!(!GattError::CharacteristicsDiscovery {
            status: GattStatus::FAILURE
        }
        .is_link_loss());
    }
}
