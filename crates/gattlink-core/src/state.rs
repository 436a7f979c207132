//! Session state machine and per-operation bookkeeping

use std::fmt;
use std::sync::Arc;

use crate::error::GattResult;
use crate::transport::{GattTransport, SessionObserver};

// ----------------------------------------------------------------------------
// Session Phase
// ----------------------------------------------------------------------------

/// Connection phase of the single managed link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Connected => "connected",
            SessionPhase::Disconnecting => "disconnecting",
        };
        f.write_str(label)
    }
}

// ----------------------------------------------------------------------------
// Operation Bookkeeping
// ----------------------------------------------------------------------------

/// Set only while the matching operation is blocked on its rendezvous
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OperationFlags {
    pub discovering_services: bool,
    pub discovering_characteristics: bool,
    pub configuring_characteristic: bool,
}

impl OperationFlags {
    pub fn any(&self) -> bool {
        self.discovering_services
            || self.discovering_characteristics
            || self.configuring_characteristic
    }
}

/// Completion results written by the event sink before it signals.
///
/// `None` means no completion has been delivered since the slot was cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ErrorSlots {
    pub services: Option<GattResult<()>>,
    pub characteristics: Option<GattResult<()>>,
    pub configuration: Option<GattResult<()>>,
}

/// Blocking operations that complete through an error slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingOperation {
    DiscoverServices,
    DiscoverCharacteristics,
    ConfigureNotification,
}

impl PendingOperation {
    pub const ALL: [PendingOperation; 3] = [
        PendingOperation::DiscoverServices,
        PendingOperation::DiscoverCharacteristics,
        PendingOperation::ConfigureNotification,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PendingOperation::DiscoverServices => "discover-services",
            PendingOperation::DiscoverCharacteristics => "discover-characteristics",
            PendingOperation::ConfigureNotification => "configure-notification",
        }
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Everything guarded by the session state lock
pub(crate) struct SessionState<T: GattTransport> {
    pub phase: SessionPhase,
    pub device: Option<T::Device>,
    pub connection: Option<T::Connection>,
    pub disconnect_requested: bool,
    /// Generation of the most recent connection attempt
    pub attempt: u64,
    pub flags: OperationFlags,
    pub slots: ErrorSlots,
    pub observer: Option<Arc<dyn SessionObserver>>,
}

impl<T: GattTransport> SessionState<T> {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            device: None,
            connection: None,
            disconnect_requested: false,
            attempt: 0,
            flags: OperationFlags::default(),
            slots: ErrorSlots::default(),
            observer: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == SessionPhase::Connected
    }

    /// Begin a connection attempt to `device`, returning its generation
    pub fn start_connecting(&mut self, device: T::Device) -> u64 {
        self.device = Some(device);
        self.connection = None;
        self.phase = SessionPhase::Connecting;
        self.attempt += 1;
        self.attempt
    }

    /// Whether an event stamped with `attempt` belongs to the current link.
    /// Unstamped events always do.
    pub fn is_current(&self, attempt: Option<u64>) -> bool {
        attempt.map_or(true, |attempt| attempt == self.attempt)
    }

    /// Record an established link
    pub fn mark_connected(&mut self, connection: T::Connection) {
        self.connection = Some(connection);
        self.phase = SessionPhase::Connected;
    }

    /// Hand the connection out for a requested disconnect
    pub fn start_disconnecting(&mut self) -> Option<T::Connection> {
        let connection = self.connection.take()?;
        self.phase = SessionPhase::Disconnecting;
        self.disconnect_requested = true;
        Some(connection)
    }

    /// Return to idle, yielding the connection handle if one was held
    pub fn mark_idle(&mut self) -> Option<T::Connection> {
        self.phase = SessionPhase::Idle;
        self.connection.take()
    }

    fn flag_mut(&mut self, operation: PendingOperation) -> &mut bool {
        match operation {
            PendingOperation::DiscoverServices => &mut self.flags.discovering_services,
            PendingOperation::DiscoverCharacteristics => {
                &mut self.flags.discovering_characteristics
            }
            PendingOperation::ConfigureNotification => &mut self.flags.configuring_characteristic,
        }
    }

    fn slot_mut(&mut self, operation: PendingOperation) -> &mut Option<GattResult<()>> {
        match operation {
            PendingOperation::DiscoverServices => &mut self.slots.services,
            PendingOperation::DiscoverCharacteristics => &mut self.slots.characteristics,
            PendingOperation::ConfigureNotification => &mut self.slots.configuration,
        }
    }

    /// Arm the flag and clear the slot before the transport call
    pub fn begin(&mut self, operation: PendingOperation) {
        *self.flag_mut(operation) = true;
        *self.slot_mut(operation) = None;
    }

    /// Disarm the flag and take whatever completion was delivered
    pub fn finish(&mut self, operation: PendingOperation) -> Option<GattResult<()>> {
        *self.flag_mut(operation) = false;
        self.slot_mut(operation).take()
    }

    /// Armed and still without a completion
    pub fn is_awaiting(&mut self, operation: PendingOperation) -> bool {
        *self.flag_mut(operation) && self.slot_mut(operation).is_none()
    }

    /// Store a completion for an awaiting operation.
    ///
    /// Returns `false` (and stores nothing) when the operation is not
    /// awaiting, so only the first completion is kept.
    pub fn complete(&mut self, operation: PendingOperation, result: GattResult<()>) -> bool {
        if !self.is_awaiting(operation) {
            return false;
        }
        *self.slot_mut(operation) = Some(result);
        true
    }

    /// The handle is present exactly while connected
    pub fn invariant_holds(&self) -> bool {
        self.connection.is_some() == self.is_connected()
    }
}
