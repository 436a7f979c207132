//! Blocking facade over an asynchronous BLE GATT transport
//!
//! Platform BLE stacks report every outcome (link up, link down, discovery
//! finished, descriptor written, value notified) through callbacks that arrive
//! later on a thread of their choosing. This crate turns those callbacks back
//! into plain blocking calls on a single managed link.
//!
//! ## Architecture
//!
//! - [`transport`] - the driver interface ([`GattTransport`]) and the
//!   [`SessionObserver`] told about unsolicited link loss
//! - [`events`] - the [`EventSink`] a driver calls to report completions
//! - [`session`] - [`GattSession`], the blocking operation surface
//! - [`state`] - the link state machine
//! - [`rendezvous`] - counting wait/signal points, one per operation class
//! - [`notification`] - the queue drained by [`GattSession::read`]
//! - [`config`] - session configuration
//! - [`error`] - error types
//! - [`sim`] - an in-process transport with scripted behavior
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gattlink_core::sim::{SimCharacteristic, SimDevice, SimulatedTransport};
//! use gattlink_core::{short_uuid, GattSession};
//!
//! # fn example() -> Result<(), gattlink_core::GattError> {
//! let session = GattSession::new(SimulatedTransport::new());
//! session.connect(SimDevice::new("00:11:22:33:44:55", "Sensor"))?;
//! session.discover_services()?;
//!
//! let measurement = SimCharacteristic::notifying(short_uuid(0x2A37));
//! session.configure_notification(&measurement)?;
//!
//! let mut batch = Vec::new();
//! if session.read(&mut batch) {
//!     for notification in &batch {
//!         println!("{:?}", notification.value);
//!     }
//! }
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod notification;
pub mod protocol;
pub mod rendezvous;
pub mod session;
pub mod sim;
pub mod state;
pub mod transport;

// Public API exports
pub use config::SessionConfig;
pub use error::{GattError, GattResult};
pub use events::EventSink;
pub use notification::Notification;
pub use protocol::{
    short_uuid, GattStatus, CLIENT_CHARACTERISTIC_CONFIGURATION_UUID,
    DEFAULT_CONNECTION_TIMEOUT, ENABLE_NOTIFICATION_VALUE,
};
pub use rendezvous::Rendezvous;
pub use session::GattSession;
pub use state::SessionPhase;
pub use transport::{GattTransport, LinkEvent, SessionObserver};
