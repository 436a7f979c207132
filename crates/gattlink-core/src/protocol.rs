//! GATT protocol constants and status codes

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Descriptor UUIDs and Values
// ----------------------------------------------------------------------------

/// Bluetooth SIG base UUID that 16-bit attribute numbers expand into
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x00000000_0000_1000_8000_00805F9B34FB);

/// Client characteristic configuration descriptor (0x2902)
pub const CLIENT_CHARACTERISTIC_CONFIGURATION_UUID: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805F9B34FB);

/// Descriptor value that turns notifications on
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Descriptor value that turns notifications and indications off
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// How long `connect` waits for the transport before giving up
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Expand a 16-bit SIG-assigned number into a full UUID
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | ((short as u128) << 96))
}

// ----------------------------------------------------------------------------
// Status Codes
// ----------------------------------------------------------------------------

/// Completion status reported by the transport driver for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GattStatus(pub u16);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0x0000);
    pub const READ_NOT_PERMITTED: GattStatus = GattStatus(0x0002);
    pub const WRITE_NOT_PERMITTED: GattStatus = GattStatus(0x0003);
    pub const INSUFFICIENT_AUTHENTICATION: GattStatus = GattStatus(0x0005);
    pub const REQUEST_NOT_SUPPORTED: GattStatus = GattStatus(0x0006);
    pub const INSUFFICIENT_ENCRYPTION: GattStatus = GattStatus(0x000F);
    pub const CONNECTION_CONGESTED: GattStatus = GattStatus(0x008F);
    /// Catch-all failure used by most platform stacks
    pub const FAILURE: GattStatus = GattStatus(0x0101);

    pub fn is_success(self) -> bool {
        self == GattStatus::SUCCESS
    }
}

impl Default for GattStatus {
    fn default() -> Self {
        GattStatus::SUCCESS
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl From<u16> for GattStatus {
    fn from(code: u16) -> Self {
        GattStatus(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_uuid_expansion() {
        assert_eq!(short_uuid(0x2902), CLIENT_CHARACTERISTIC_CONFIGURATION_UUID);
        assert_eq!(
            short_uuid(0x180D).to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_status_success() {
        assert!(GattStatus::SUCCESS.is_success());
        assert!(GattStatus::default().is_success());
        assert!(!GattStatus::FAILURE.is_success());
        assert!(!GattStatus::from(0x0005).is_success());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(GattStatus::FAILURE.to_string(), "0x0101");
        assert_eq!(GattStatus(0x8F).to_string(), "0x008f");
    }
}
