//! Callback surface invoked by the transport driver

use std::fmt;
use std::sync::Weak;

use tracing::{debug, info, trace, warn};

use crate::error::GattError;
use crate::notification::Notification;
use crate::protocol::GattStatus;
use crate::session::Shared;
use crate::state::{PendingOperation, SessionPhase};
use crate::transport::{GattTransport, LinkEvent};

// ----------------------------------------------------------------------------
// Event Sink
// ----------------------------------------------------------------------------

/// Handle through which a [`GattTransport`] reports completions.
///
/// Cheap to clone and safe to call from any thread. It holds the session
/// weakly: events arriving after the session is dropped are discarded.
///
/// The sink handed to [`GattTransport::initiate_connect`] is bound to that
/// connection attempt. Once a later attempt starts, its link events and
/// completions are discarded, so a slow report about an abandoned link cannot
/// be mistaken for news about the current one.
pub struct EventSink<T: GattTransport> {
    shared: Weak<Shared<T>>,
    attempt: Option<u64>,
}

impl<T: GattTransport> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            attempt: self.attempt,
        }
    }
}

impl<T: GattTransport> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &(self.shared.strong_count() > 0))
            .field("attempt", &self.attempt)
            .finish()
    }
}

impl<T: GattTransport> EventSink<T> {
    /// A sink that follows whichever attempt is current
    pub(crate) fn new(shared: Weak<Shared<T>>) -> Self {
        Self {
            shared,
            attempt: None,
        }
    }

    pub(crate) fn for_attempt(shared: Weak<Shared<T>>, attempt: u64) -> Self {
        Self {
            shared,
            attempt: Some(attempt),
        }
    }

    /// Whether the owning session is still alive
    pub fn is_attached(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// The link came up or went down
    pub fn on_connection_state_changed(&self, event: LinkEvent<T::Connection>) {
        let Some(shared) = self.shared.upgrade() else {
            debug!(?event, "session dropped; ignoring connection state change");
            return;
        };
        match event {
            LinkEvent::Connected(connection) => shared.handle_connected(self.attempt, connection),
            LinkEvent::Disconnected { status } => shared.handle_disconnected(self.attempt, status),
        }
    }

    pub fn on_services_discovered(&self, status: GattStatus) {
        let result = if status.is_success() {
            Ok(())
        } else {
            Err(GattError::ServicesDiscovery { status })
        };
        self.complete(PendingOperation::DiscoverServices, status, result);
    }

    pub fn on_characteristics_discovered(&self, status: GattStatus) {
        let result = if status.is_success() {
            Ok(())
        } else {
            Err(GattError::CharacteristicsDiscovery { status })
        };
        self.complete(PendingOperation::DiscoverCharacteristics, status, result);
    }

    /// Completion of the descriptor write issued by `configure_notification`
    pub fn on_descriptor_write(&self, status: GattStatus) {
        let result = if status.is_success() {
            Ok(())
        } else {
            Err(GattError::CharacteristicConfiguring { status })
        };
        self.complete(PendingOperation::ConfigureNotification, status, result);
    }

    /// A notification arrived for `characteristic`
    pub fn on_characteristic_changed(&self, characteristic: T::Characteristic, value: Vec<u8>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        trace!(
            ?characteristic,
            value = %hex::encode(&value),
            "characteristic changed"
        );
        shared
            .notifications
            .push(Notification::new(characteristic, value), &shared.rendezvous.read);
    }

    fn complete(
        &self,
        operation: PendingOperation,
        status: GattStatus,
        result: Result<(), GattError>,
    ) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut state = shared.state.lock();
        if !state.is_current(self.attempt) {
            debug!(
                operation = operation.name(),
                %status,
                attempt = ?self.attempt,
                "completion from a superseded attempt; ignoring"
            );
            return;
        }
        if state.complete(operation, result) {
            debug!(operation = operation.name(), %status, "operation completed");
            shared.rendezvous.for_operation(operation).signal();
        } else {
            debug!(
                operation = operation.name(),
                %status,
                "completion with no pending operation; ignoring"
            );
        }
    }
}

// ----------------------------------------------------------------------------
// State Transitions Driven By The Transport
// ----------------------------------------------------------------------------

impl<T: GattTransport> Shared<T> {
    fn handle_connected(&self, attempt: Option<u64>, connection: T::Connection) {
        let mut state = self.state.lock();
        if !state.is_current(attempt) {
            warn!(?connection, ?attempt, "link from a superseded attempt; releasing");
            drop(state);
            self.transport.release_connection(connection);
            return;
        }
        match state.phase {
            SessionPhase::Connecting => {
                info!(?connection, "link established");
                state.mark_connected(connection);
                self.rendezvous.connect.signal();
            }
            SessionPhase::Idle => {
                // The connect call already gave up; the handle is still
                // authoritative.
                warn!(?connection, "link established after connect gave up");
                state.mark_connected(connection);
            }
            SessionPhase::Connected | SessionPhase::Disconnecting => {
                warn!(
                    ?connection,
                    phase = %state.phase,
                    "unexpected connected event; releasing link"
                );
                drop(state);
                self.transport.release_connection(connection);
            }
        }
    }

    fn handle_disconnected(&self, attempt: Option<u64>, status: GattStatus) {
        let mut state = self.state.lock();
        if !state.is_current(attempt) {
            debug!(%status, ?attempt, "disconnect of a superseded link; ignoring");
            return;
        }
        match state.phase {
            SessionPhase::Idle => {
                debug!(%status, "disconnected event with no link; ignoring");
                return;
            }
            SessionPhase::Connecting => {
                warn!(%status, "connection attempt failed");
                state.mark_idle();
                self.rendezvous.connect.signal();
                return;
            }
            SessionPhase::Connected | SessionPhase::Disconnecting => {}
        }

        let connection = state.mark_idle();
        let requested = state.disconnect_requested;
        debug_assert!(state.invariant_holds());

        for operation in PendingOperation::ALL {
            if state.complete(operation, Err(GattError::NotConnected)) {
                debug!(operation = operation.name(), "link lost while operation pending");
                self.rendezvous.for_operation(operation).signal();
            }
        }

        if requested {
            // The disconnecting caller releases the handle it took.
            info!(%status, "link closed on request");
            self.rendezvous.disconnect.signal();
            return;
        }

        warn!(%status, "link dropped unexpectedly");
        let observer = state.observer.clone();
        drop(state);

        if let Some(connection) = connection {
            self.transport.release_connection(connection);
        }
        if let Some(observer) = observer {
            observer.on_unsolicited_disconnect();
        }
    }
}
