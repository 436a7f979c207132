//! Blocking operations over an asynchronous GATT transport

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::{GattError, GattResult};
use crate::events::EventSink;
use crate::notification::{Notification, NotificationQueue};
use crate::protocol::{GattStatus, ENABLE_NOTIFICATION_VALUE};
use crate::rendezvous::RendezvousSet;
use crate::state::{ErrorSlots, PendingOperation, SessionPhase, SessionState};
use crate::transport::{GattTransport, SessionObserver};

// ----------------------------------------------------------------------------
// Shared Session Core
// ----------------------------------------------------------------------------

/// State reachable from both caller threads and the event sink
pub(crate) struct Shared<T: GattTransport> {
    pub transport: T,
    pub config: SessionConfig,
    pub state: Mutex<SessionState<T>>,
    pub rendezvous: RendezvousSet,
    pub notifications: NotificationQueue<T::Characteristic>,
}

// ----------------------------------------------------------------------------
// GATT Session
// ----------------------------------------------------------------------------

/// A single BLE link driven through blocking calls.
///
/// Operations that change the link (`connect`, `disconnect`, discovery and
/// notification setup) are serialized against each other for their whole
/// duration. `write`, `read`, `force_unblock` and `reset` may be called
/// concurrently with them.
pub struct GattSession<T: GattTransport> {
    shared: Arc<Shared<T>>,
    operation: Mutex<()>,
}

impl<T: GattTransport> GattSession<T> {
    /// Create a session with default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, SessionConfig::default())
    }

    pub fn with_config(transport: T, config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                state: Mutex::new(SessionState::new()),
                rendezvous: RendezvousSet::new(),
                notifications: NotificationQueue::new(),
            }),
            operation: Mutex::new(()),
        }
    }

    /// Connect to `device`, tearing down any existing link first.
    ///
    /// Blocks until the transport reports the link up or the connection
    /// timeout elapses.
    pub fn connect(&self, device: T::Device) -> GattResult<()> {
        let _operation = self.operation.lock();

        let connected = self.shared.state.lock().is_connected();
        if connected {
            debug!("connect with a live link; disconnecting first");
            self.disconnect_locked();
        }

        let stale = self.shared.rendezvous.connect.drain();
        if stale > 0 {
            debug!(stale, "discarded stale connect signals");
        }

        let attempt = self.shared.state.lock().start_connecting(device.clone());
        info!(?device, attempt, "connecting");
        let events = EventSink::for_attempt(Arc::downgrade(&self.shared), attempt);
        self.shared.transport.initiate_connect(&device, events);

        let timeout = self.shared.config.connection_timeout;
        let signaled = self.shared.rendezvous.connect.wait_timeout(timeout);

        let mut state = self.shared.state.lock();
        debug_assert!(state.invariant_holds());
        if state.is_connected() {
            info!(connection = ?state.connection, "connected");
            return Ok(());
        }
        if state.phase == SessionPhase::Connecting {
            state.mark_idle();
        }
        if signaled {
            warn!(?device, "connection failed");
        } else {
            warn!(?device, ?timeout, "connection timed out");
        }
        Err(GattError::ConnectionFailed)
    }

    /// Disconnect the current link and wait for the transport to confirm.
    ///
    /// Does nothing when no link is up.
    pub fn disconnect(&self) {
        let _operation = self.operation.lock();
        self.disconnect_locked();
    }

    fn disconnect_locked(&self) {
        let Some(connection) = self.shared.state.lock().start_disconnecting() else {
            debug!("disconnect with no link; nothing to do");
            return;
        };

        info!(?connection, "disconnecting");
        self.shared.transport.initiate_disconnect(&connection);

        let rendezvous = &self.shared.rendezvous.disconnect;
        match self.shared.config.disconnect_timeout {
            None => rendezvous.wait(),
            Some(timeout) => {
                if !rendezvous.wait_timeout(timeout) {
                    warn!(?timeout, "transport did not confirm disconnect; forcing idle");
                }
            }
        }

        {
            let mut state = self.shared.state.lock();
            state.disconnect_requested = false;
            if state.phase == SessionPhase::Disconnecting {
                state.mark_idle();
            }
        }
        self.shared.transport.release_connection(connection);
        info!("disconnected");
    }

    /// Discover the services of the connected device
    pub fn discover_services(&self) -> GattResult<()> {
        let transport = &self.shared.transport;
        self.await_completion(PendingOperation::DiscoverServices, |connection| {
            if transport.initiate_service_discovery(connection) {
                Ok(())
            } else {
                Err(GattError::Generic)
            }
        })
    }

    /// Discover the characteristics of `service`
    pub fn discover_characteristics(&self, service: Uuid) -> GattResult<()> {
        let transport = &self.shared.transport;
        self.await_completion(PendingOperation::DiscoverCharacteristics, |connection| {
            if transport.initiate_characteristic_discovery(connection, service) {
                Ok(())
            } else {
                Err(GattError::Generic)
            }
        })
    }

    /// Enable notifications for `characteristic`, locally and on the device.
    ///
    /// Returns once the transport reports the descriptor write complete.
    pub fn configure_notification(&self, characteristic: &T::Characteristic) -> GattResult<()> {
        let transport = &self.shared.transport;
        let descriptor_uuid = self.shared.config.notification_descriptor;
        let refused = GattError::CharacteristicConfiguring {
            status: GattStatus::FAILURE,
        };

        self.await_completion(PendingOperation::ConfigureNotification, |connection| {
            if !transport.enable_local_notifications(connection, characteristic) {
                warn!(?characteristic, "local notification enable refused");
                return Err(refused);
            }
            let descriptor = transport
                .locate_descriptor(characteristic, descriptor_uuid)
                .ok_or_else(|| {
                    warn!(?characteristic, %descriptor_uuid, "descriptor not found");
                    refused
                })?;
            if transport.write_descriptor(connection, descriptor, &ENABLE_NOTIFICATION_VALUE) {
                Ok(())
            } else {
                Err(GattError::Generic)
            }
        })
    }

    /// Arm `operation`, run the transport request, and wait for its completion
    fn await_completion<F>(&self, operation: PendingOperation, start: F) -> GattResult<()>
    where
        F: FnOnce(&T::Connection) -> GattResult<()>,
    {
        let _operation = self.operation.lock();
        let rendezvous = self.shared.rendezvous.for_operation(operation);
        rendezvous.drain();

        let connection = {
            let mut state = self.shared.state.lock();
            let Some(connection) = state.connection.clone() else {
                debug!(operation = operation.name(), "not connected");
                return Err(GattError::NotConnected);
            };
            state.begin(operation);
            connection
        };

        debug!(operation = operation.name(), ?connection, "starting");
        if let Err(err) = start(&connection) {
            self.shared.state.lock().finish(operation);
            warn!(operation = operation.name(), %err, "request not accepted");
            return Err(err);
        }

        rendezvous.wait();

        let result = self
            .shared
            .state
            .lock()
            .finish(operation)
            .unwrap_or(Err(GattError::Generic));
        match &result {
            Ok(()) => debug!(operation = operation.name(), "completed"),
            Err(err) => warn!(operation = operation.name(), %err, "failed"),
        }
        result
    }

    /// Queue a write of `data` to `characteristic`.
    ///
    /// Returns whether the transport accepted the request; delivery to the
    /// remote device is not confirmed.
    pub fn write(&self, data: &[u8], characteristic: &T::Characteristic) -> bool {
        let Some(connection) = self.current_connection_handle() else {
            debug!(?characteristic, "write with no link");
            return false;
        };
        let accepted = self
            .shared
            .transport
            .write_characteristic(&connection, characteristic, data);
        trace!(
            ?characteristic,
            payload = %hex::encode(data),
            accepted,
            "write"
        );
        accepted
    }

    /// Wait for at least one notification, then move every queued one into
    /// `out` in arrival order.
    ///
    /// Returns `false` without blocking again if woken with nothing queued,
    /// which happens after [`force_unblock`](Self::force_unblock).
    pub fn read(&self, out: &mut Vec<Notification<T::Characteristic>>) -> bool {
        self.shared.rendezvous.read.wait();
        self.collect_notifications(out)
    }

    /// Non-blocking variant of [`read`](Self::read)
    pub fn try_read(&self, out: &mut Vec<Notification<T::Characteristic>>) -> bool {
        if !self.shared.rendezvous.read.try_acquire() {
            return false;
        }
        self.collect_notifications(out)
    }

    fn collect_notifications(&self, out: &mut Vec<Notification<T::Characteristic>>) -> bool {
        let drained = self
            .shared
            .notifications
            .drain_into(out, &self.shared.rendezvous.read);
        if drained == 0 {
            debug!("read woken with no notifications queued");
            return false;
        }
        trace!(drained, "read notifications");
        true
    }

    /// Wake threads blocked in `connect`, `configure_notification` or `read`.
    ///
    /// Meant for abnormal teardown when the transport will deliver no further
    /// events. Session state is left untouched; a call with nobody waiting has
    /// no effect.
    pub fn force_unblock(&self) {
        let rendezvous = &self.shared.rendezvous;
        let woken = [&rendezvous.connect, &rendezvous.configure, &rendezvous.read]
            .iter()
            .filter(|r| r.interrupt())
            .count();
        info!(woken, "force unblock");
    }

    /// Discard pending signals, queued notifications and stale results so the
    /// next operation starts clean. The link itself is left as it is.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        if state.flags.any() {
            warn!(flags = ?state.flags, "reset while an operation is pending");
        }
        let drained = self.shared.rendezvous.drain_all();
        // Read permits are dropped again under the queue lock so a concurrent
        // push cannot leave a permit without its item.
        let discarded = self
            .shared
            .notifications
            .clear(&self.shared.rendezvous.read);
        state.slots = ErrorSlots::default();
        debug!(drained, discarded, "reset");
    }

    pub fn current_connection_handle(&self) -> Option<T::Connection> {
        self.shared.state.lock().connection.clone()
    }

    /// Device of the current or most recent connection attempt
    pub fn current_device(&self) -> Option<T::Device> {
        self.shared.state.lock().device.clone()
    }

    /// Notifications received but not yet returned by `read`
    pub fn pending_notifications(&self) -> usize {
        self.shared.notifications.len()
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.state.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected()
    }

    /// Register the observer told about unsolicited disconnects
    pub fn set_observer<O>(&self, observer: O)
    where
        O: SessionObserver + 'static,
    {
        self.shared.state.lock().observer = Some(Arc::new(observer));
    }

    pub fn clear_observer(&self) {
        self.shared.state.lock().observer = None;
    }

    /// A sink bound to this session, for drivers that register callbacks
    /// before the first connect. Unlike the sink passed to
    /// `initiate_connect`, its events always apply to the current link.
    pub fn event_sink(&self) -> EventSink<T> {
        EventSink::new(Arc::downgrade(&self.shared))
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    #[cfg(test)]
    pub(crate) fn invariant_holds(&self) -> bool {
        self.shared.state.lock().invariant_holds()
    }
}

impl<T: GattTransport> fmt::Debug for GattSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("GattSession")
            .field("phase", &state.phase)
            .field("device", &state.device)
            .field("connection", &state.connection)
            .finish()
    }
}

impl<T: GattTransport> Drop for GattSession<T> {
    fn drop(&mut self) {
        if self.shared.config.disconnect_on_drop && self.is_connected() {
            debug!("session dropped with a live link");
            self.disconnect();
        }
    }
}
