//! Interfaces presented by the collaborators of a session

use std::fmt;

use uuid::Uuid;

use crate::events::EventSink;
use crate::protocol::GattStatus;

// ----------------------------------------------------------------------------
// Transport Driver
// ----------------------------------------------------------------------------

/// An asynchronous BLE GATT driver.
///
/// Every `initiate_*` request completes later by calling the matching method
/// on the [`EventSink`] handed to [`initiate_connect`](Self::initiate_connect),
/// from whatever thread the driver uses. Methods returning `bool` report
/// whether the request was accepted, not whether it succeeded.
///
/// The session never holds its state lock while calling into the driver, so a
/// driver may deliver events synchronously from inside these methods.
pub trait GattTransport: Send + Sync + Sized + 'static {
    /// A remote device that can be connected to
    type Device: Clone + Send + fmt::Debug + 'static;
    /// Handle of an established link
    type Connection: Clone + Send + Sync + fmt::Debug + 'static;
    /// A characteristic of the remote GATT database
    type Characteristic: Clone + Send + fmt::Debug + 'static;
    /// A descriptor attached to a characteristic
    type Descriptor: Send + 'static;

    /// Start connecting. Must eventually report exactly one
    /// [`LinkEvent`] for this attempt.
    fn initiate_connect(&self, device: &Self::Device, events: EventSink<Self>);

    /// Start tearing the link down. Must eventually report
    /// [`LinkEvent::Disconnected`].
    fn initiate_disconnect(&self, connection: &Self::Connection);

    fn initiate_service_discovery(&self, connection: &Self::Connection) -> bool;

    /// Discover the characteristics of one service. Drivers that discover
    /// characteristics together with services keep the default, which
    /// refuses the request.
    fn initiate_characteristic_discovery(
        &self,
        _connection: &Self::Connection,
        _service: Uuid,
    ) -> bool {
        false
    }

    /// Turn on local delivery of notifications for `characteristic`
    fn enable_local_notifications(
        &self,
        connection: &Self::Connection,
        characteristic: &Self::Characteristic,
    ) -> bool;

    fn locate_descriptor(
        &self,
        characteristic: &Self::Characteristic,
        uuid: Uuid,
    ) -> Option<Self::Descriptor>;

    fn write_descriptor(
        &self,
        connection: &Self::Connection,
        descriptor: Self::Descriptor,
        value: &[u8],
    ) -> bool;

    fn write_characteristic(
        &self,
        connection: &Self::Connection,
        characteristic: &Self::Characteristic,
        value: &[u8],
    ) -> bool;

    /// Free driver resources held for a link that has gone down
    fn release_connection(&self, _connection: Self::Connection) {}
}

/// Connection state change reported by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent<C> {
    Connected(C),
    Disconnected { status: GattStatus },
}

// ----------------------------------------------------------------------------
// Session Observer
// ----------------------------------------------------------------------------

/// Told when the link drops without a local disconnect request
pub trait SessionObserver: Send + Sync {
    fn on_unsolicited_disconnect(&self);
}

impl<F> SessionObserver for F
where
    F: Fn() + Send + Sync,
{
    fn on_unsolicited_disconnect(&self) {
        self()
    }
}
