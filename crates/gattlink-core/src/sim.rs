//! In-process transport that answers requests from its own callback thread
//!
//! [`SimulatedTransport`] behaves like a platform BLE stack as seen through
//! [`GattTransport`]: requests return immediately and their outcomes arrive
//! later on a dedicated worker thread. [`SimBehavior`] scripts those outcomes,
//! and the `inject_*`/`drop_link` hooks produce unsolicited events.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::events::EventSink;
use crate::protocol::{GattStatus, CLIENT_CHARACTERISTIC_CONFIGURATION_UUID};
use crate::transport::{GattTransport, LinkEvent};

// ----------------------------------------------------------------------------
// Simulated GATT Objects
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDevice {
    pub address: String,
    pub name: String,
}

impl SimDevice {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConnection {
    pub id: u32,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

impl SimCharacteristic {
    /// A characteristic without descriptors
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            descriptors: Vec::new(),
        }
    }

    /// A characteristic carrying a client characteristic configuration
    /// descriptor
    pub fn notifying(uuid: Uuid) -> Self {
        Self {
            uuid,
            descriptors: vec![CLIENT_CHARACTERISTIC_CONFIGURATION_UUID],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDescriptor {
    pub characteristic: Uuid,
    pub uuid: Uuid,
}

// ----------------------------------------------------------------------------
// Scripted Behavior
// ----------------------------------------------------------------------------

/// How the simulated stack answers a connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    Refuse(GattStatus),
    /// Never report anything for the attempt
    Ignore,
}

/// Outcome script for requests made to a [`SimulatedTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct SimBehavior {
    pub connect: ConnectBehavior,
    /// Delay before each callback is delivered
    pub latency: Duration,
    pub accept_service_discovery: bool,
    pub service_discovery_status: GattStatus,
    /// Accept service discovery but never report its completion
    pub hold_service_discovery: bool,
    pub accept_characteristic_discovery: bool,
    pub characteristic_discovery_status: GattStatus,
    pub enable_notifications: bool,
    pub accept_descriptor_write: bool,
    pub descriptor_write_status: GattStatus,
    /// Accept descriptor writes but never report their completion
    pub hold_descriptor_write: bool,
    pub answer_disconnect: bool,
    pub accept_writes: bool,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            connect: ConnectBehavior::Accept,
            latency: Duration::from_millis(1),
            accept_service_discovery: true,
            service_discovery_status: GattStatus::SUCCESS,
            hold_service_discovery: false,
            accept_characteristic_discovery: true,
            characteristic_discovery_status: GattStatus::SUCCESS,
            enable_notifications: true,
            accept_descriptor_write: true,
            descriptor_write_status: GattStatus::SUCCESS,
            hold_descriptor_write: false,
            answer_disconnect: true,
            accept_writes: true,
        }
    }
}

impl SimBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect(mut self, connect: ConnectBehavior) -> Self {
        self.connect = connect;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_service_discovery(mut self, accept: bool, status: GattStatus) -> Self {
        self.accept_service_discovery = accept;
        self.service_discovery_status = status;
        self
    }

    pub fn with_held_service_discovery(mut self, hold: bool) -> Self {
        self.hold_service_discovery = hold;
        self
    }

    pub fn with_characteristic_discovery(mut self, accept: bool, status: GattStatus) -> Self {
        self.accept_characteristic_discovery = accept;
        self.characteristic_discovery_status = status;
        self
    }

    pub fn with_enable_notifications(mut self, enabled: bool) -> Self {
        self.enable_notifications = enabled;
        self
    }

    pub fn with_descriptor_write(mut self, accept: bool, status: GattStatus) -> Self {
        self.accept_descriptor_write = accept;
        self.descriptor_write_status = status;
        self
    }

    pub fn with_held_descriptor_write(mut self, hold: bool) -> Self {
        self.hold_descriptor_write = hold;
        self
    }

    pub fn with_answer_disconnect(mut self, answer: bool) -> Self {
        self.answer_disconnect = answer;
        self
    }

    pub fn with_accept_writes(mut self, accept: bool) -> Self {
        self.accept_writes = accept;
        self
    }
}

/// Request counts observed by a [`SimulatedTransport`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStats {
    pub connects: usize,
    pub disconnects: usize,
    pub service_discoveries: usize,
    pub characteristic_discoveries: usize,
    pub descriptor_writes: usize,
    pub characteristic_writes: usize,
    pub releases: usize,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    service_discoveries: AtomicUsize,
    characteristic_discoveries: AtomicUsize,
    descriptor_writes: AtomicUsize,
    characteristic_writes: AtomicUsize,
    releases: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> SimStats {
        SimStats {
            connects: self.connects.load(Ordering::SeqCst),
            disconnects: self.disconnects.load(Ordering::SeqCst),
            service_discoveries: self.service_discoveries.load(Ordering::SeqCst),
            characteristic_discoveries: self.characteristic_discoveries.load(Ordering::SeqCst),
            descriptor_writes: self.descriptor_writes.load(Ordering::SeqCst),
            characteristic_writes: self.characteristic_writes.load(Ordering::SeqCst),
            releases: self.releases.load(Ordering::SeqCst),
        }
    }
}

// ----------------------------------------------------------------------------
// Simulated Transport
// ----------------------------------------------------------------------------

enum Command {
    Connect {
        device: SimDevice,
        events: EventSink<SimulatedTransport>,
    },
    Disconnect,
    DropLink(GattStatus),
    ServicesDiscovered(GattStatus),
    CharacteristicsDiscovered(GattStatus),
    DescriptorWritten(GattStatus),
    Notify {
        characteristic: SimCharacteristic,
        value: Vec<u8>,
    },
}

struct SimInner {
    behavior: Mutex<SimBehavior>,
    events: Mutex<Option<EventSink<SimulatedTransport>>>,
    link: Mutex<Option<SimConnection>>,
    next_connection_id: AtomicU32,
    written: Mutex<Vec<(Uuid, Vec<u8>)>>,
    descriptor_values: Mutex<Vec<(SimDescriptor, Vec<u8>)>>,
    counters: Counters,
}

/// Cloneable handle to one simulated BLE stack.
///
/// Callbacks are delivered in request order from a worker thread that lives
/// until the last handle is dropped.
#[derive(Clone)]
pub struct SimulatedTransport {
    inner: Arc<SimInner>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::with_behavior(SimBehavior::default())
    }

    pub fn with_behavior(behavior: SimBehavior) -> Self {
        let inner = Arc::new(SimInner {
            behavior: Mutex::new(behavior),
            events: Mutex::new(None),
            link: Mutex::new(None),
            next_connection_id: AtomicU32::new(1),
            written: Mutex::new(Vec::new()),
            descriptor_values: Mutex::new(Vec::new()),
            counters: Counters::default(),
        });
        let (commands, receiver) = mpsc::unbounded_channel();

        let worker_inner = inner.clone();
        let spawned = thread::Builder::new()
            .name("gattlink-sim".to_string())
            .spawn(move || run_worker(worker_inner, receiver));
        if let Err(e) = spawned {
            warn!("Failed to start simulated transport worker: {}", e);
        }

        Self { inner, commands }
    }

    pub fn behavior(&self) -> SimBehavior {
        self.inner.behavior.lock().clone()
    }

    pub fn set_behavior(&self, behavior: SimBehavior) {
        *self.inner.behavior.lock() = behavior;
    }

    /// Adjust the current behavior in place
    pub fn update_behavior(&self, update: impl FnOnce(&mut SimBehavior)) {
        update(&mut self.inner.behavior.lock());
    }

    /// Whether the simulated link is currently up
    pub fn is_linked(&self) -> bool {
        self.inner.link.lock().is_some()
    }

    pub fn stats(&self) -> SimStats {
        self.inner.counters.snapshot()
    }

    /// Characteristic writes accepted so far, oldest first
    pub fn written(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.inner.written.lock().clone()
    }

    /// Descriptor writes accepted so far, oldest first
    pub fn descriptor_values(&self) -> Vec<(SimDescriptor, Vec<u8>)> {
        self.inner.descriptor_values.lock().clone()
    }

    /// Have the remote device notify a new value
    pub fn inject_notification(
        &self,
        characteristic: &SimCharacteristic,
        value: impl Into<Vec<u8>>,
    ) {
        self.send(Command::Notify {
            characteristic: characteristic.clone(),
            value: value.into(),
        });
    }

    /// Have the remote device drop the link
    pub fn drop_link(&self, status: GattStatus) {
        self.send(Command::DropLink(status));
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Simulated transport worker is gone; dropping command");
        }
    }

    fn link_matches(&self, connection: &SimConnection) -> bool {
        self.inner.link.lock().as_ref() == Some(connection)
    }
}

fn run_worker(inner: Arc<SimInner>, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.blocking_recv() {
        let latency = inner.behavior.lock().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        inner.dispatch(command);
    }
    debug!("Simulated transport worker exiting");
}

impl SimInner {
    fn dispatch(&self, command: Command) {
        if let Command::Connect { device, events } = command {
            self.connect(device, events.clone());
            *self.events.lock() = Some(events);
            return;
        }

        let Some(events) = self.events.lock().clone() else {
            debug!("No session registered; dropping simulated event");
            return;
        };

        match command {
            Command::Connect { .. } => {}
            Command::Disconnect => {
                if self.link.lock().take().is_some() {
                    events.on_connection_state_changed(LinkEvent::Disconnected {
                        status: GattStatus::SUCCESS,
                    });
                }
            }
            Command::DropLink(status) => {
                if self.link.lock().take().is_some() {
                    events.on_connection_state_changed(LinkEvent::Disconnected { status });
                }
            }
            Command::ServicesDiscovered(status) => events.on_services_discovered(status),
            Command::CharacteristicsDiscovered(status) => {
                events.on_characteristics_discovered(status)
            }
            Command::DescriptorWritten(status) => events.on_descriptor_write(status),
            Command::Notify {
                characteristic,
                value,
            } => events.on_characteristic_changed(characteristic, value),
        }
    }

    fn connect(&self, device: SimDevice, events: EventSink<SimulatedTransport>) {
        let behavior = self.behavior.lock().connect;
        match behavior {
            ConnectBehavior::Accept => {
                let connection = SimConnection {
                    id: self.next_connection_id.fetch_add(1, Ordering::SeqCst),
                    address: device.address,
                };
                *self.link.lock() = Some(connection.clone());
                events.on_connection_state_changed(LinkEvent::Connected(connection));
            }
            ConnectBehavior::Refuse(status) => {
                events.on_connection_state_changed(LinkEvent::Disconnected { status });
            }
            ConnectBehavior::Ignore => {
                trace!(address = %device.address, "Ignoring simulated connect");
            }
        }
    }
}

impl GattTransport for SimulatedTransport {
    type Device = SimDevice;
    type Connection = SimConnection;
    type Characteristic = SimCharacteristic;
    type Descriptor = SimDescriptor;

    fn initiate_connect(&self, device: &SimDevice, events: EventSink<Self>) {
        self.inner.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.send(Command::Connect {
            device: device.clone(),
            events,
        });
    }

    fn initiate_disconnect(&self, _connection: &SimConnection) {
        self.inner.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.inner.behavior.lock().answer_disconnect {
            self.send(Command::Disconnect);
        }
    }

    fn initiate_service_discovery(&self, connection: &SimConnection) -> bool {
        self.inner
            .counters
            .service_discoveries
            .fetch_add(1, Ordering::SeqCst);
        let (accept, status, hold) = {
            let behavior = self.inner.behavior.lock();
            (
                behavior.accept_service_discovery,
                behavior.service_discovery_status,
                behavior.hold_service_discovery,
            )
        };
        if !accept || !self.link_matches(connection) {
            return false;
        }
        if !hold {
            self.send(Command::ServicesDiscovered(status));
        }
        true
    }

    fn initiate_characteristic_discovery(&self, connection: &SimConnection, service: Uuid) -> bool {
        self.inner
            .counters
            .characteristic_discoveries
            .fetch_add(1, Ordering::SeqCst);
        let (accept, status) = {
            let behavior = self.inner.behavior.lock();
            (
                behavior.accept_characteristic_discovery,
                behavior.characteristic_discovery_status,
            )
        };
        if !accept || !self.link_matches(connection) {
            return false;
        }
        trace!(%service, "Discovering simulated characteristics");
        self.send(Command::CharacteristicsDiscovered(status));
        true
    }

    fn enable_local_notifications(
        &self,
        connection: &SimConnection,
        _characteristic: &SimCharacteristic,
    ) -> bool {
        self.inner.behavior.lock().enable_notifications && self.link_matches(connection)
    }

    fn locate_descriptor(
        &self,
        characteristic: &SimCharacteristic,
        uuid: Uuid,
    ) -> Option<SimDescriptor> {
        characteristic
            .descriptors
            .contains(&uuid)
            .then(|| SimDescriptor {
                characteristic: characteristic.uuid,
                uuid,
            })
    }

    fn write_descriptor(
        &self,
        connection: &SimConnection,
        descriptor: SimDescriptor,
        value: &[u8],
    ) -> bool {
        self.inner
            .counters
            .descriptor_writes
            .fetch_add(1, Ordering::SeqCst);
        let (accept, status, hold) = {
            let behavior = self.inner.behavior.lock();
            (
                behavior.accept_descriptor_write,
                behavior.descriptor_write_status,
                behavior.hold_descriptor_write,
            )
        };
        if !accept || !self.link_matches(connection) {
            return false;
        }
        self.inner
            .descriptor_values
            .lock()
            .push((descriptor, value.to_vec()));
        if !hold {
            self.send(Command::DescriptorWritten(status));
        }
        true
    }

    fn write_characteristic(
        &self,
        connection: &SimConnection,
        characteristic: &SimCharacteristic,
        value: &[u8],
    ) -> bool {
        if !self.inner.behavior.lock().accept_writes || !self.link_matches(connection) {
            return false;
        }
        self.inner
            .counters
            .characteristic_writes
            .fetch_add(1, Ordering::SeqCst);
        self.inner
            .written
            .lock()
            .push((characteristic.uuid, value.to_vec()));
        true
    }

    fn release_connection(&self, connection: SimConnection) {
        trace!(id = connection.id, "Releasing simulated connection");
        self.inner.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}
