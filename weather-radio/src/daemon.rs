//! Daemon lifecycle for the receiver.
//!
//! Brings the board and chip up, starts the dispatcher and the control-line
//! reader, then waits for SIGINT or SIGTERM and powers the chip down.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::board::{InterruptEvent, RadioBoard};
use crate::config::RadioConfig;
use crate::dispatcher::{ControlMessage, Dispatcher};
use crate::error::Result;
use crate::hw_trait::{GpioPin, SmbusDevice};
use crate::si4707::protocol::{Revision, WbChannel};
use crate::si4707::{sequencer, ChipSession};
use crate::telemetry::{self, LogBus, Publisher, Topics};
use crate::tracing::prelude::*;
use crate::transport::sim::{SimPin, SimulatedChip};

/// Control messages buffered between the stdin reader and the dispatcher.
const CONTROL_QUEUE: usize = 32;

/// Open the simulated chip and its board lines.
fn open_simulated(config: &RadioConfig) -> (ChipSession, RadioBoard) {
    let chip = SimulatedChip::new(config.bus.address);
    let board = RadioBoard::new(
        Box::new(SimPin::new(config.pins.reset)),
        config
            .pins
            .relays
            .iter()
            .map(|&n| Box::new(SimPin::new(n)) as Box<dyn GpioPin>)
            .collect(),
        Box::new(chip.interrupt_pin()),
    );
    let (session, _worker) = ChipSession::spawn(SmbusDevice::new(chip, config.bus.address));
    (session, board)
}

#[cfg(feature = "rpi")]
fn open_hardware(config: &RadioConfig) -> Result<(ChipSession, RadioBoard)> {
    use crate::transport::rpi::{gpio_error, RpiI2c, RpiInterruptPin, RpiPin};
    use rppal::gpio::Gpio;

    let gpio = Gpio::new().map_err(gpio_error)?;
    let mut relays: Vec<Box<dyn GpioPin>> = Vec::with_capacity(config.pins.relays.len());
    for &n in &config.pins.relays {
        relays.push(Box::new(RpiPin::output(&gpio, n)?));
    }
    let board = RadioBoard::new(
        Box::new(RpiPin::output(&gpio, config.pins.reset)?),
        relays,
        Box::new(RpiInterruptPin::new(&gpio, config.pins.interrupt)?),
    );

    let i2c = RpiI2c::open(config.bus.bus)?;
    let (session, _worker) =
        ChipSession::spawn_on_thread(SmbusDevice::new(i2c, config.bus.address))?;
    Ok((session, board))
}

#[cfg(not(feature = "rpi"))]
fn open_hardware(_config: &RadioConfig) -> Result<(ChipSession, RadioBoard)> {
    Err(crate::config::ConfigError::NoHardwareBackend.into())
}

/// Reset the board, start watching its interrupt line, and bring the chip
/// up on `channel`.
///
/// The line is watched before bring-up so the tune-complete edge is queued
/// for the dispatcher instead of lost.
pub async fn start_receiver(
    session: &ChipSession,
    board: &mut RadioBoard,
    channel: WbChannel,
    patch: bool,
) -> Result<(Revision, mpsc::UnboundedReceiver<InterruptEvent>)> {
    board.momentary_reset().await?;
    board.park_relays().await?;

    let (interrupt_tx, interrupt_rx) = mpsc::unbounded_channel();
    board.watch_interrupts(interrupt_tx)?;

    let revision = sequencer::bring_up(session, channel, patch).await?;
    Ok((revision, interrupt_rx))
}

/// Feed `topic payload` lines from stdin to the dispatcher.
async fn read_control_lines(tx: mpsc::Sender<ControlMessage>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let Some((topic, payload)) = telemetry::parse_line(&line) else {
                    continue;
                };
                if tx.send(ControlMessage::new(topic, payload)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("Control input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Reading control input failed");
                break;
            }
        }
    }
}

/// The main daemon.
pub struct Daemon {
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Daemon {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Run the daemon until shutdown is requested.
    pub async fn run(self) -> anyhow::Result<()> {
        let config = RadioConfig::from_env()?;
        info!(
            serial = %config.serial,
            channel = %config.channel,
            simulate = config.simulate,
            patch = config.patch,
            "Starting receiver"
        );

        let (session, mut board) = if config.simulate {
            info!("Using the simulated chip (WXRADIO_SIMULATE set)");
            open_simulated(&config)
        } else {
            open_hardware(&config).context("opening receiver hardware")?
        };

        let (revision, interrupt_rx) =
            start_receiver(&session, &mut board, config.channel, config.patch)
                .await
                .context("bringing up receiver")?;
        debug!(%revision, "Receiver ready");

        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        self.tracker
            .spawn(read_control_lines(control_tx, self.shutdown.clone()));

        let publisher = Publisher::new(Arc::new(LogBus), Topics::new(config.serial.clone()));
        let dispatcher = Dispatcher::new(session.clone(), publisher, config.poll_interval);
        self.tracker
            .spawn(dispatcher.run(interrupt_rx, control_rx, self.shutdown.clone()));

        self.tracker.close();

        info!("Started.");
        info!("For debugging, set RUST_LOG=weather_radio=debug or trace.");

        let mut sigint = unix::signal(SignalKind::interrupt())?;
        let mut sigterm = unix::signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT.");
            },
            _ = sigterm.recv() => {
                info!("Received SIGTERM.");
            },
        }

        self.shutdown.cancel();
        self.tracker.wait().await;

        if let Err(e) = board.release().await {
            warn!(error = %e, "Releasing board lines failed");
        }
        if let Err(e) = sequencer::power_off(&session).await {
            warn!(error = %e, "Powering down receiver failed");
        }
        info!("Exiting.");

        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::Error;
    use crate::si4707::protocol::opcode;
    use crate::si4707::RadioError;
    use crate::telemetry::tests::RecordingBus;

    fn sim_board(chip: &SimulatedChip) -> RadioBoard {
        RadioBoard::new(
            Box::new(SimPin::new(17)),
            vec![Box::new(SimPin::new(13)) as Box<dyn GpioPin>],
            Box::new(chip.interrupt_pin()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_tune_complete_reaches_dispatcher_after_start() {
        let chip = SimulatedChip::new(0x11);
        let (session, _worker) = ChipSession::spawn(SmbusDevice::new(chip.clone(), 0x11));
        let mut board = sim_board(&chip);

        let (_, interrupt_rx) = start_receiver(&session, &mut board, WbChannel::default(), false)
            .await
            .unwrap();

        let bus = Arc::new(RecordingBus::default());
        let publisher = Publisher::new(bus.clone(), Topics::new("test"));
        let (_control_tx, control_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(session, publisher, Duration::from_secs(60));
        tokio::spawn(dispatcher.run(interrupt_rx, control_rx, shutdown.clone()));
        tokio::time::sleep(Duration::from_secs(2)).await;
        shutdown.cancel();

        assert!(chip.writes().contains(&vec![opcode::WB_TUNE_STATUS, 0x01]));
        assert_eq!(chip.pending_interrupts(), 0);
        let frequencies: Vec<_> = bus
            .take()
            .into_iter()
            .filter(|(topic, _)| topic.ends_with("/frequency"))
            .collect();
        assert_eq!(frequencies.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failures_keep_their_layer() {
        let chip = SimulatedChip::new(0x11);
        chip.fail_next(opcode::POWER_UP, 1);
        let (session, _worker) = ChipSession::spawn(SmbusDevice::new(chip.clone(), 0x11));
        let mut board = sim_board(&chip);

        let err = start_receiver(&session, &mut board, WbChannel::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Radio(RadioError::Transport(_))));
    }

    #[cfg(not(feature = "rpi"))]
    #[test]
    fn test_hardware_needs_rpi_backend() {
        use crate::config::{BusConfig, ConfigError, PinConfig};

        let config = RadioConfig {
            simulate: false,
            bus: BusConfig::default(),
            pins: PinConfig::default(),
            channel: WbChannel::default(),
            patch: true,
            poll_interval: Duration::from_secs(60),
            serial: "test".into(),
        };
        let err = open_hardware(&config).err().unwrap();
        assert!(matches!(err, Error::Config(ConfigError::NoHardwareBackend)));
    }
}
