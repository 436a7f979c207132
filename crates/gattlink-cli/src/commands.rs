//! Command handlers for the gattlink CLI

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use gattlink_core::sim::{
    ConnectBehavior, SimBehavior, SimCharacteristic, SimDevice, SimulatedTransport,
};
use gattlink_core::{short_uuid, GattError, GattSession, GattStatus, Notification};

use crate::cli::Commands;
use crate::config::CliAppConfig;
use crate::error::{CliError, Result};

/// How long the demo waits for the session to notice a dropped link
const LINK_LOSS_WAIT: Duration = Duration::from_secs(2);

/// Outcome of a demo run
#[derive(Debug, Clone, PartialEq)]
pub struct DemoReport {
    pub received: Vec<Notification<SimCharacteristic>>,
    pub link_lost: bool,
    pub unsolicited_disconnects: usize,
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub fn execute(command: Commands, config: &CliAppConfig) -> Result<()> {
        match command {
            Commands::Demo {
                notifications,
                drop_link,
                payload,
            } => {
                let payload = hex::decode(payload.trim_start_matches("0x"))?;
                let report = Self::run_demo(config, notifications, drop_link, &payload)?;
                for notification in &report.received {
                    println!(
                        "{}  {}",
                        notification.characteristic.uuid,
                        hex::encode(&notification.value)
                    );
                }
                if report.link_lost {
                    println!(
                        "link lost ({} unsolicited disconnect reported)",
                        report.unsolicited_disconnects
                    );
                }
                Ok(())
            }
            Commands::Timeout => Self::handle_timeout_command(config),
            Commands::ExampleConfig => {
                println!("{}", CliAppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Connect, discover, subscribe, exchange data and tear the link down
    pub fn run_demo(
        config: &CliAppConfig,
        notifications: u8,
        drop_link: bool,
        payload: &[u8],
    ) -> Result<DemoReport> {
        let peripheral = &config.peripheral;
        let transport = SimulatedTransport::with_behavior(
            SimBehavior::new().with_latency(peripheral.latency()),
        );
        let session = GattSession::with_config(transport.clone(), config.session.clone());

        let drops = Arc::new(AtomicUsize::new(0));
        let counter = drops.clone();
        session.set_observer(move || {
            warn!("Peripheral dropped the link");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let device = SimDevice::new(peripheral.address.clone(), peripheral.name.clone());
        info!("Connecting to {} ({})", device.name, device.address);
        session.connect(device)?;

        session.discover_services()?;
        session.discover_characteristics(short_uuid(peripheral.service))?;

        let measurement = SimCharacteristic::notifying(short_uuid(peripheral.measurement));
        session.configure_notification(&measurement)?;
        info!("Notifications enabled for {}", measurement.uuid);

        let control = SimCharacteristic::new(short_uuid(peripheral.control));
        if !session.write(payload, &control) {
            return Err(CliError::WriteRejected(control.uuid));
        }

        for i in 0..notifications {
            transport.inject_notification(&measurement, vec![0x06, 60u8.wrapping_add(i)]);
        }

        let mut received = Vec::new();
        while received.len() < usize::from(notifications) {
            if !session.read(&mut received) {
                warn!("Read woken without notifications");
                break;
            }
        }
        info!("Received {} notifications", received.len());

        let link_lost = if drop_link {
            transport.drop_link(GattStatus::FAILURE);
            let deadline = Instant::now() + LINK_LOSS_WAIT;
            while drops.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            match session.discover_services() {
                Err(GattError::NotConnected) => true,
                other => {
                    warn!("Expected link loss, discovery returned {:?}", other);
                    false
                }
            }
        } else {
            session.disconnect();
            false
        };

        let stats = transport.stats();
        info!(
            "Session finished: {} connects, {} disconnects, {} writes",
            stats.connects, stats.disconnects, stats.characteristic_writes
        );

        Ok(DemoReport {
            received,
            link_lost,
            unsolicited_disconnects: drops.load(Ordering::SeqCst),
        })
    }

    /// Attempt a connection the peripheral never answers
    fn handle_timeout_command(config: &CliAppConfig) -> Result<()> {
        let transport = SimulatedTransport::with_behavior(
            SimBehavior::new().with_connect(ConnectBehavior::Ignore),
        );
        let session = GattSession::with_config(transport, config.session.clone());
        let device = SimDevice::new(
            config.peripheral.address.clone(),
            config.peripheral.name.clone(),
        );

        let start = Instant::now();
        match session.connect(device) {
            Err(GattError::ConnectionFailed) => {
                println!(
                    "connection failed after {:?} (timeout {:?})",
                    start.elapsed(),
                    config.session.connection_timeout
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
            Ok(()) => {
                warn!("Peripheral unexpectedly accepted the connection");
                Ok(())
            }
        }
    }
}
