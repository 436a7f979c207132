//! Session Integration Tests
//!
//! Drives `GattSession` against `SimulatedTransport`, whose callbacks arrive
//! on a separate worker thread the way a platform BLE stack delivers them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gattlink_core::sim::{
    ConnectBehavior, SimBehavior, SimCharacteristic, SimDevice, SimulatedTransport,
};
use gattlink_core::{
    short_uuid, GattError, GattSession, GattStatus, Notification, SessionConfig, SessionPhase,
    ENABLE_NOTIFICATION_VALUE,
};

// ----------------------------------------------------------------------------
// Test Helpers
// ----------------------------------------------------------------------------

const HEART_RATE_SERVICE: u16 = 0x180D;
const HEART_RATE_MEASUREMENT: u16 = 0x2A37;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("gattlink_core=debug")
        .with_test_writer()
        .try_init();
}

fn device() -> SimDevice {
    SimDevice::new("00:11:22:33:44:55", "Heart Rate Sensor")
}

fn measurement() -> SimCharacteristic {
    SimCharacteristic::notifying(short_uuid(HEART_RATE_MEASUREMENT))
}

fn session_with(behavior: SimBehavior, config: SessionConfig) -> GattSession<SimulatedTransport> {
    init_logging();
    GattSession::with_config(SimulatedTransport::with_behavior(behavior), config)
}

fn session() -> GattSession<SimulatedTransport> {
    session_with(SimBehavior::default(), SessionConfig::default())
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

fn counting_observer(session: &GattSession<SimulatedTransport>) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    session.set_observer(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

// ----------------------------------------------------------------------------
// Connection Tests
// ----------------------------------------------------------------------------

#[test]
fn test_connect_discover_configure_disconnect() {
    let session = session();

    session.connect(device()).unwrap();
    assert!(session.is_connected());
    assert_eq!(session.current_device(), Some(device()));
    let connection = session.current_connection_handle().unwrap();
    assert_eq!(connection.address, "00:11:22:33:44:55");

    session.discover_services().unwrap();
    session
        .discover_characteristics(short_uuid(HEART_RATE_SERVICE))
        .unwrap();
    session.configure_notification(&measurement()).unwrap();

    let descriptors = session.transport().descriptor_values();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].1, ENABLE_NOTIFICATION_VALUE.to_vec());

    session.disconnect();
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(session.current_connection_handle(), None);
    assert!(!session.transport().is_linked());
    assert_eq!(session.transport().stats().releases, 1);
}

#[test]
fn test_connect_timeout_returns_to_idle() {
    let config = SessionConfig::new().with_connection_timeout(Duration::from_millis(50));
    let session = session_with(
        SimBehavior::new().with_connect(ConnectBehavior::Ignore),
        config,
    );

    let start = Instant::now();
    assert_eq!(session.connect(device()), Err(GattError::ConnectionFailed));
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(session.current_connection_handle(), None);
}

#[test]
fn test_refused_connect_fails_fast() {
    let config = SessionConfig::new().with_connection_timeout(Duration::from_secs(10));
    let session = session_with(
        SimBehavior::new().with_connect(ConnectBehavior::Refuse(GattStatus::FAILURE)),
        config,
    );

    let start = Instant::now();
    assert_eq!(session.connect(device()), Err(GattError::ConnectionFailed));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[test]
fn test_link_established_after_timeout_is_kept() {
    let config = SessionConfig::new().with_connection_timeout(Duration::from_millis(20));
    let session = session_with(
        SimBehavior::new().with_latency(Duration::from_millis(150)),
        config,
    );

    assert_eq!(session.connect(device()), Err(GattError::ConnectionFailed));
    wait_until("late connection", || session.is_connected());
    assert!(session.current_connection_handle().is_some());
}

#[test]
fn test_connect_while_connected_replaces_link() {
    let session = session();
    session.connect(device()).unwrap();
    let first = session.current_connection_handle().unwrap();

    let other = SimDevice::new("66:77:88:99:AA:BB", "Thermometer");
    session.connect(other.clone()).unwrap();
    let second = session.current_connection_handle().unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(second.address, other.address);
    let stats = session.transport().stats();
    assert_eq!(stats.connects, 2);
    assert_eq!(stats.disconnects, 1);
}

#[test]
fn test_disconnect_when_idle_is_noop() {
    let session = session();
    session.disconnect();
    assert_eq!(session.transport().stats().disconnects, 0);
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[test]
fn test_disconnect_timeout_forces_idle() {
    let config = SessionConfig::new().with_disconnect_timeout(Duration::from_millis(50));
    let session = session_with(SimBehavior::new().with_answer_disconnect(false), config);
    let drops = counting_observer(&session);

    session.connect(device()).unwrap();
    session.disconnect();

    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(session.current_connection_handle(), None);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reconnect_ignores_late_disconnect_of_abandoned_link() {
    let config = SessionConfig::new().with_disconnect_timeout(Duration::from_millis(20));
    let session = session_with(
        SimBehavior::new().with_latency(Duration::from_millis(60)),
        config,
    );
    let drops = counting_observer(&session);

    session.connect(device()).unwrap();
    let first = session.current_connection_handle().unwrap();
    session.disconnect();
    assert_eq!(session.phase(), SessionPhase::Idle);

    // The transport reports the old link down while this attempt is running
    session.connect(device()).unwrap();
    let second = session.current_connection_handle().unwrap();
    assert_ne!(first.id, second.id);

    thread::sleep(Duration::from_millis(100));
    assert!(session.is_connected());
    assert_eq!(session.current_connection_handle(), Some(second));
    assert_eq!(drops.load(Ordering::SeqCst), 0);
}

#[test]
fn test_drop_disconnects_live_link() {
    let transport = SimulatedTransport::new();
    {
        let session = GattSession::new(transport.clone());
        session.connect(device()).unwrap();
    }
    assert_eq!(transport.stats().disconnects, 1);
    assert!(!transport.is_linked());
}

// ----------------------------------------------------------------------------
// Discovery And Configuration Tests
// ----------------------------------------------------------------------------

#[test]
fn test_discovery_requires_link() {
    let session = session();
    assert_eq!(session.discover_services(), Err(GattError::NotConnected));
    assert_eq!(
        session.configure_notification(&measurement()),
        Err(GattError::NotConnected)
    );
    assert_eq!(session.transport().stats().service_discoveries, 0);
    assert_eq!(session.transport().stats().descriptor_writes, 0);
}

#[test]
fn test_discovery_failure_status() {
    let session = session_with(
        SimBehavior::new().with_service_discovery(true, GattStatus::FAILURE),
        SessionConfig::default(),
    );
    session.connect(device()).unwrap();

    assert_eq!(
        session.discover_services(),
        Err(GattError::ServicesDiscovery {
            status: GattStatus::FAILURE
        })
    );

    session
        .transport()
        .update_behavior(|b| b.accept_service_discovery = false);
    assert_eq!(session.discover_services(), Err(GattError::Generic));

    session
        .transport()
        .update_behavior(|b| b.service_discovery_status = GattStatus::SUCCESS);
    session.transport().update_behavior(|b| b.accept_service_discovery = true);
    assert_eq!(session.discover_services(), Ok(()));
}

#[test]
fn test_configure_without_descriptor() {
    let session = session();
    session.connect(device()).unwrap();

    let plain = SimCharacteristic::new(short_uuid(HEART_RATE_MEASUREMENT));
    assert_eq!(
        session.configure_notification(&plain),
        Err(GattError::CharacteristicConfiguring {
            status: GattStatus::FAILURE
        })
    );
    assert_eq!(session.transport().stats().descriptor_writes, 0);
}

#[test]
fn test_configure_rejected_status() {
    let session = session_with(
        SimBehavior::new().with_descriptor_write(true, GattStatus::WRITE_NOT_PERMITTED),
        SessionConfig::default(),
    );
    session.connect(device()).unwrap();

    let err = session.configure_notification(&measurement()).unwrap_err();
    assert_eq!(
        err,
        GattError::CharacteristicConfiguring {
            status: GattStatus::WRITE_NOT_PERMITTED
        }
    );
    assert!(!err.is_link_loss());
}

#[test]
fn test_link_loss_during_configure() {
    let session = Arc::new(session_with(
        SimBehavior::new().with_held_descriptor_write(true),
        SessionConfig::default(),
    ));
    let drops = counting_observer(&session);
    session.connect(device()).unwrap();

    let configuring = {
        let session = session.clone();
        thread::spawn(move || session.configure_notification(&measurement()))
    };

    wait_until("descriptor write", || {
        session.transport().stats().descriptor_writes == 1
    });
    session.transport().drop_link(GattStatus::FAILURE);

    assert_eq!(configuring.join().unwrap(), Err(GattError::NotConnected));
    assert_eq!(session.phase(), SessionPhase::Idle);
    wait_until("observer", || drops.load(Ordering::SeqCst) == 1);
}

#[test]
fn test_link_loss_during_service_discovery() {
    let session = Arc::new(session_with(
        SimBehavior::new().with_held_service_discovery(true),
        SessionConfig::default(),
    ));
    let drops = counting_observer(&session);
    session.connect(device()).unwrap();

    let discovering = {
        let session = session.clone();
        thread::spawn(move || session.discover_services())
    };

    wait_until("service discovery request", || {
        session.transport().stats().service_discoveries == 1
    });
    session.transport().drop_link(GattStatus::FAILURE);

    assert_eq!(discovering.join().unwrap(), Err(GattError::NotConnected));
    assert_eq!(session.phase(), SessionPhase::Idle);
    wait_until("observer", || drops.load(Ordering::SeqCst) == 1);
}

// ----------------------------------------------------------------------------
// Data Path Tests
// ----------------------------------------------------------------------------

#[test]
fn test_write_accepted_and_rejected() {
    let session = session();
    let characteristic = SimCharacteristic::new(short_uuid(0x2A39));
    assert!(!session.write(&[0x01], &characteristic));

    session.connect(device()).unwrap();
    assert!(session.write(&[0x01, 0x02], &characteristic));

    session
        .transport()
        .update_behavior(|b| b.accept_writes = false);
    assert!(!session.write(&[0x03], &characteristic));

    assert_eq!(
        session.transport().written(),
        vec![(short_uuid(0x2A39), vec![0x01, 0x02])]
    );
}

#[test]
fn test_read_returns_batch_in_order() {
    let session = session();
    session.connect(device()).unwrap();
    session.configure_notification(&measurement()).unwrap();

    session.transport().inject_notification(&measurement(), vec![0x06, 0x48]);
    session.transport().inject_notification(&measurement(), vec![0x06, 0x49]);
    wait_until("two notifications", || session.pending_notifications() == 2);

    let mut batch = Vec::new();
    assert!(session.read(&mut batch));
    assert_eq!(
        batch,
        vec![
            Notification::new(measurement(), vec![0x06, 0x48]),
            Notification::new(measurement(), vec![0x06, 0x49]),
        ]
    );

    assert!(!session.try_read(&mut batch));
    assert_eq!(batch.len(), 2);
}

#[test]
fn test_blocked_read_wakes_on_notification() {
    let session = Arc::new(session());
    session.connect(device()).unwrap();

    let reader = {
        let session = session.clone();
        thread::spawn(move || {
            let mut batch = Vec::new();
            let woke = session.read(&mut batch);
            (woke, batch)
        })
    };

    thread::sleep(Duration::from_millis(20));
    session.transport().inject_notification(&measurement(), vec![0x2A]);

    let (woke, batch) = reader.join().unwrap();
    assert!(woke);
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].value, vec![0x2A]);
}

// ----------------------------------------------------------------------------
// Recovery Tests
// ----------------------------------------------------------------------------

#[test]
fn test_force_unblock_wakes_blocked_read() {
    let session = Arc::new(session());
    session.force_unblock();

    let reader = {
        let session = session.clone();
        thread::spawn(move || {
            let mut batch = Vec::new();
            session.read(&mut batch)
        })
    };

    // The reader may not be waiting yet; unblocking with nobody waiting is a
    // no-op, so keep trying until it returns.
    while !reader.is_finished() {
        session.force_unblock();
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!reader.join().unwrap());

    let mut batch = Vec::new();
    assert!(!session.try_read(&mut batch));
}

#[test]
fn test_force_unblock_aborts_connect() {
    let config = SessionConfig::new().with_connection_timeout(Duration::from_secs(30));
    let session = Arc::new(session_with(
        SimBehavior::new().with_connect(ConnectBehavior::Ignore),
        config,
    ));

    let connecting = {
        let session = session.clone();
        thread::spawn(move || session.connect(device()))
    };

    while !connecting.is_finished() {
        session.force_unblock();
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(connecting.join().unwrap(), Err(GattError::ConnectionFailed));
    assert_eq!(session.phase(), SessionPhase::Idle);
}

#[test]
fn test_force_unblock_aborts_configure() {
    let session = Arc::new(session_with(
        SimBehavior::new().with_held_descriptor_write(true),
        SessionConfig::default(),
    ));
    session.connect(device()).unwrap();

    let configuring = {
        let session = session.clone();
        thread::spawn(move || session.configure_notification(&measurement()))
    };

    wait_until("descriptor write", || {
        session.transport().stats().descriptor_writes == 1
    });
    while !configuring.is_finished() {
        session.force_unblock();
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(configuring.join().unwrap(), Err(GattError::Generic));
    assert!(session.is_connected());
}

#[test]
fn test_reset_behaves_like_fresh_session() {
    let session = session();
    session.connect(device()).unwrap();
    session.transport().inject_notification(&measurement(), vec![0x01]);
    wait_until("notification", || session.pending_notifications() == 1);

    session.reset();
    assert_eq!(session.pending_notifications(), 0);
    let mut batch = Vec::new();
    assert!(!session.try_read(&mut batch));

    session.discover_services().unwrap();
    session.configure_notification(&measurement()).unwrap();
    session.transport().inject_notification(&measurement(), vec![0x02]);
    assert!(session.read(&mut batch));
    assert_eq!(batch, vec![Notification::new(measurement(), vec![0x02])]);
}

#[test]
fn test_unsolicited_and_requested_disconnects() {
    let session = session();
    let drops = counting_observer(&session);

    session.connect(device()).unwrap();
    session.transport().drop_link(GattStatus::FAILURE);
    wait_until("observer", || drops.load(Ordering::SeqCst) == 1);
    assert!(!session.is_connected());
    assert_eq!(session.discover_services(), Err(GattError::NotConnected));

    session.connect(device()).unwrap();
    session.disconnect();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
