//! GATT session configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{CLIENT_CHARACTERISTIC_CONFIGURATION_UUID, DEFAULT_CONNECTION_TIMEOUT};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for a GATT session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum time `connect` waits for the connected callback
    pub connection_timeout: Duration,
    /// Upper bound on the disconnect wait; `None` waits until the transport
    /// reports the link down
    pub disconnect_timeout: Option<Duration>,
    /// Descriptor written when enabling notifications
    pub notification_descriptor: Uuid,
    /// Whether dropping the session disconnects a live link
    pub disconnect_on_drop: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            disconnect_timeout: None,
            notification_descriptor: CLIENT_CHARACTERISTIC_CONFIGURATION_UUID,
            disconnect_on_drop: true,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection timeout
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Bound the disconnect wait
    pub fn with_disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = Some(timeout);
        self
    }

    /// Set the descriptor used to enable notifications
    pub fn with_notification_descriptor(mut self, uuid: Uuid) -> Self {
        self.notification_descriptor = uuid;
        self
    }

    /// Enable or disable disconnect on drop
    pub fn with_disconnect_on_drop(mut self, enabled: bool) -> Self {
        self.disconnect_on_drop = enabled;
        self
    }
}
