//! The control plane.
//!
//! A single task reacts to interrupt-line edges, periodic poll ticks and
//! control messages. It never waits on the bus itself: each chip operation
//! is queued on the [`ChipSession`] right away (so bus order is the order
//! events were handled in) and the wait for its result runs as a separate
//! task whose [`Outcome`] comes back into this loop. State that spans
//! events, the SAME inactivity timer, lives only here.
//!
//! Interrupt handling: read the interrupt status without acknowledging,
//! then for each set bit fetch that category's status with INTACK, which
//! clears only that bit. A tune-complete or signal-quality interrupt also
//! flushes the SAME buffer, once per interrupt.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::board::InterruptEvent;
use crate::si4707::same::{self, InactivityTimer, SameReport};
use crate::si4707::{Ack, ChipSession, InterruptStatus, Result};
use crate::telemetry::{Control, Publisher, Telemetry, VolumeChange};
use crate::tracing::prelude::*;

/// First tick of each periodic poll, staggered so they don't bunch up.
const MUTE_POLL_START: Duration = Duration::from_secs(5);
const VOLUME_POLL_START: Duration = Duration::from_secs(10);
const RSQ_POLL_START: Duration = Duration::from_secs(15);
const TUNE_POLL_START: Duration = Duration::from_secs(45);

/// A message from the control bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl ControlMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Result of a finished chip operation, handed back to the loop.
#[derive(Debug)]
enum Outcome {
    /// Nothing further to do.
    Done,
    Interrupt(InterruptStatus),
    Same(SameReport),
}

type Completion = (&'static str, Result<Outcome>);

pub struct Dispatcher {
    session: ChipSession,
    publisher: Publisher,
    poll_interval: Duration,
    inflight: JoinSet<Completion>,
    same_timer: InactivityTimer,
}

fn poll_timer(start: Duration, period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + start, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

impl Dispatcher {
    pub fn new(session: ChipSession, publisher: Publisher, poll_interval: Duration) -> Self {
        Self {
            session,
            publisher,
            poll_interval,
            inflight: JoinSet::new(),
            same_timer: InactivityTimer::new(),
        }
    }

    /// Run until `shutdown` fires. Operations still in flight are dropped;
    /// their bus transactions complete on the session worker regardless.
    pub async fn run(
        mut self,
        mut interrupts: mpsc::UnboundedReceiver<InterruptEvent>,
        mut controls: mpsc::Receiver<ControlMessage>,
        shutdown: CancellationToken,
    ) {
        let mut mute_poll = poll_timer(MUTE_POLL_START, self.poll_interval);
        let mut volume_poll = poll_timer(VOLUME_POLL_START, self.poll_interval);
        let mut rsq_poll = poll_timer(RSQ_POLL_START, self.poll_interval);
        let mut tune_poll = poll_timer(TUNE_POLL_START, self.poll_interval);

        info!("Dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Dispatcher shutting down");
                    break;
                }

                Some(InterruptEvent) = interrupts.recv() => {
                    trace!("Interrupt line asserted");
                    let status = self.session.interrupt_status();
                    self.track("interrupt-status", async move {
                        Ok(Outcome::Interrupt(status.await?))
                    });
                }

                Some(message) = controls.recv() => self.on_control(message),

                _ = mute_poll.tick() => self.report_mute(),
                _ = volume_poll.tick() => self.report_volume(),
                _ = rsq_poll.tick() => self.report_rsq(Ack::Check),
                _ = tune_poll.tick() => self.report_tune(Ack::Check),

                _ = self.same_timer.expired() => {
                    debug!("SAME inactivity, flushing");
                    self.flush_same();
                }

                Some(joined) = self.inflight.join_next() => match joined {
                    Ok((_, Ok(outcome))) => self.on_outcome(outcome),
                    Ok((what, Err(e))) => warn!(operation = what, error = %e, "Chip operation failed"),
                    Err(e) => error!(error = %e, "Chip operation task panicked"),
                },
            }
        }
    }

    fn track<F>(&mut self, what: &'static str, fut: F)
    where
        F: Future<Output = Result<Outcome>> + Send + 'static,
    {
        self.inflight.spawn(async move { (what, fut.await) });
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Done => {}
            Outcome::Interrupt(status) => self.on_interrupt(status),
            Outcome::Same(report) => {
                if report.end_of_message() {
                    debug!("SAME end of message");
                    self.flush_same();
                } else {
                    self.same_timer.touch();
                }
            }
        }
    }

    fn on_interrupt(&mut self, status: InterruptStatus) {
        debug!(%status, "Interrupt status");

        if status.tune_complete() {
            self.report_tune(Ack::IntAck);
        }
        if status.signal_quality() {
            self.report_rsq(Ack::IntAck);
        }
        if status.tune_complete() || status.signal_quality() {
            self.flush_same();
        }
        if status.same() {
            self.report_same();
        }
        if status.alert_tone() {
            self.report_alert_tone();
        }
        if status.error() {
            warn!(%status, "Receiver reported a command error");
        }
    }

    fn on_control(&mut self, message: ControlMessage) {
        let topics = self.publisher.topics();
        let Some(control) = Control::parse(topics, &message.topic, &message.payload) else {
            debug!(topic = %message.topic, "Ignoring message on unknown topic");
            return;
        };
        debug!(?control, "Control message");

        match control {
            Control::Mute(Some(muted)) => {
                let set = self.session.set_muted(muted);
                self.track("set-mute", async move {
                    set.await?;
                    Ok(Outcome::Done)
                });
                self.report_mute();
            }
            Control::Mute(None) => self.report_mute(),
            Control::Volume(Some(VolumeChange::Set(volume))) => {
                let set = self.session.set_volume(volume);
                self.track("set-volume", async move {
                    set.await?;
                    Ok(Outcome::Done)
                });
                self.report_volume();
            }
            Control::Volume(Some(step @ (VolumeChange::Increase | VolumeChange::Decrease))) => {
                let delta = if step == VolumeChange::Increase { 1 } else { -1 };
                let session = self.session.clone();
                let publisher = self.publisher.clone();
                self.track("step-volume", async move {
                    session.adjust_volume(delta).await?;
                    let volume = session.volume().await?;
                    publisher.publish(&Telemetry::Volume(volume)).await;
                    Ok(Outcome::Done)
                });
            }
            Control::Volume(None) => self.report_volume(),
        }
    }

    fn report_tune(&mut self, ack: Ack) {
        let fetch = self.session.tune_status(ack);
        let publisher = self.publisher.clone();
        self.track("tune-status", async move {
            let status = fetch.await?;
            debug!(?status, "Tune status");
            publisher.publish(&Telemetry::Tune(status)).await;
            Ok(Outcome::Done)
        });
    }

    fn report_rsq(&mut self, ack: Ack) {
        let fetch = self.session.rsq_status(ack);
        let publisher = self.publisher.clone();
        self.track("rsq-status", async move {
            let status = fetch.await?;
            debug!(?status, "RSQ status");
            publisher.publish(&Telemetry::SignalQuality(status)).await;
            Ok(Outcome::Done)
        });
    }

    fn report_alert_tone(&mut self) {
        let fetch = self.session.asq_status(Ack::IntAck);
        let publisher = self.publisher.clone();
        self.track("asq-status", async move {
            let status = fetch.await?;
            debug!(?status, "ASQ status");
            publisher.publish(&Telemetry::AlertTone(status.alert)).await;
            Ok(Outcome::Done)
        });
    }

    fn report_same(&mut self) {
        let fetch = same::read_message(&self.session, Ack::IntAck);
        let publisher = self.publisher.clone();
        self.track("same-status", async move {
            let report = fetch.await?;
            if report.preamble_detected() {
                debug!("SAME preamble detected");
            }
            if report.start_of_message() {
                debug!("SAME start of message detected");
            }
            if let Some(message) = &report.message {
                let header = message.header().ok();
                let reliable = message.reliable();
                match &header {
                    Some(header) => info!(event = %header.event, originator = %header.originator, reliable, "SAME alert"),
                    None => warn!(text = %message.text(), reliable, "Unparseable SAME header"),
                }
                publisher
                    .publish(&Telemetry::Same {
                        text: message.text(),
                        reliable,
                        header,
                    })
                    .await;
            }
            Ok(Outcome::Same(report))
        });
    }

    fn report_mute(&mut self) {
        let fetch = self.session.muted();
        let publisher = self.publisher.clone();
        self.track("mute-status", async move {
            match fetch.await? {
                Some(muted) => publisher.publish(&Telemetry::Mute(muted)).await,
                None => debug!("Partial mute, not reported"),
            }
            Ok(Outcome::Done)
        });
    }

    fn report_volume(&mut self) {
        let fetch = self.session.volume();
        let publisher = self.publisher.clone();
        self.track("volume-status", async move {
            publisher.publish(&Telemetry::Volume(fetch.await?)).await;
            Ok(Outcome::Done)
        });
    }

    fn flush_same(&mut self) {
        self.same_timer.clear();
        let flush = self.session.same_flush();
        self.track("same-flush", async move {
            flush.await?;
            Ok(Outcome::Done)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::board::RadioBoard;
    use crate::hw_trait::SmbusDevice;
    use crate::si4707::protocol::{int_status, opcode};
    use crate::si4707::sequencer;
    use crate::telemetry::tests::RecordingBus;
    use crate::telemetry::Topics;
    use crate::transport::sim::{SimPin, SimulatedChip};

    const HEADER: &[u8] = b"ZCZC-WXR-TOR-019153-019169+0030-1051700-KDMX/NWS-";

    struct Harness {
        chip: SimulatedChip,
        bus: Arc<RecordingBus>,
        controls: mpsc::Sender<ControlMessage>,
        shutdown: CancellationToken,
        _board: RadioBoard,
    }

    async fn start() -> Harness {
        let chip = SimulatedChip::new(0x11);
        let (session, _worker) = ChipSession::spawn(SmbusDevice::new(chip.clone(), 0x11));
        sequencer::power_on(&session).await.unwrap();
        assert_eq!(session.power_state(), crate::si4707::PowerState::On);

        let mut board = RadioBoard::new(
            Box::new(SimPin::new(17)),
            Vec::new(),
            Box::new(chip.interrupt_pin()),
        );
        let (irq_tx, irq_rx) = mpsc::unbounded_channel();
        board.watch_interrupts(irq_tx).unwrap();

        let bus = Arc::new(RecordingBus::default());
        let publisher = Publisher::new(bus.clone(), Topics::new("test"));
        let (ctl_tx, ctl_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher::new(session, publisher, Duration::from_secs(60));
        tokio::spawn(dispatcher.run(irq_rx, ctl_rx, shutdown.clone()));
        chip.clear_events();

        Harness {
            chip,
            bus,
            controls: ctl_tx,
            shutdown,
            _board: board,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    fn published(bus: &RecordingBus, key: &str) -> Vec<String> {
        let suffix = format!("/{key}");
        bus.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _)| topic.ends_with(&suffix))
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_tune_and_rsq_interrupt() {
        let h = start().await;

        h.chip.raise(int_status::STCINT | int_status::RSQINT);
        settle().await;

        assert_eq!(
            h.chip.writes(),
            vec![
                vec![opcode::GET_INT_STATUS, 0x00],
                vec![opcode::WB_TUNE_STATUS, 0x01],
                vec![opcode::WB_RSQ_STATUS, 0x01],
                vec![opcode::WB_SAME_STATUS, 0x03, 0x00],
            ]
        );
        assert_eq!(h.chip.pending_interrupts(), 0);
        assert_eq!(published(&h.bus, "frequency"), vec!["162550000"]);
        assert_eq!(published(&h.bus, "frequency_offset"), vec!["0"]);
        assert_eq!(published(&h.bus, "rssi").len(), 2);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_alert_published_then_flushed_on_end_of_message() {
        let h = start().await;

        h.chip.receive_same(HEADER, 3);
        settle().await;
        let messages = published(&h.bus, "same_message");
        assert_eq!(messages, vec![String::from_utf8(HEADER.to_vec()).unwrap()]);
        assert_eq!(published(&h.bus, "same_reliable"), vec!["true"]);
        assert_eq!(published(&h.bus, "same_event"), vec!["TOR"]);
        assert!(!h.chip.writes().contains(&vec![opcode::WB_SAME_STATUS, 0x03, 0x00]));

        h.chip.end_of_message();
        settle().await;
        assert!(h.chip.writes().contains(&vec![opcode::WB_SAME_STATUS, 0x03, 0x00]));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_buffer_flushed_after_inactivity() {
        let h = start().await;

        h.chip.receive_same(HEADER, 3);
        settle().await;
        let flush = vec![opcode::WB_SAME_STATUS, 0x03, 0x00];
        assert!(!h.chip.writes().contains(&flush));

        tokio::time::sleep(same::SAME_INACTIVITY).await;
        let flushes = h.chip.writes().iter().filter(|f| **f == flush).count();
        assert_eq!(flushes, 1);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_tone_published() {
        let h = start().await;

        h.chip.alert_tone(true);
        settle().await;
        assert_eq!(published(&h.bus, "alert_tone"), vec!["ON"]);
        assert!(h.chip.writes().contains(&vec![opcode::WB_ASQ_STATUS, 0x01, 0x00]));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_and_mute_controls() {
        let h = start().await;

        h.controls
            .send(ControlMessage::new("weather_radio/test/volume_control", "40"))
            .await
            .unwrap();
        settle().await;
        h.controls
            .send(ControlMessage::new("weather_radio/test/volume_control", "INCREASE"))
            .await
            .unwrap();
        settle().await;
        h.controls
            .send(ControlMessage::new("weather_radio/test/volume_control", "99"))
            .await
            .unwrap();
        settle().await;
        h.controls
            .send(ControlMessage::new("weather_radio/test/mute_control", "ON"))
            .await
            .unwrap();
        settle().await;

        assert_eq!(published(&h.bus, "volume_status"), vec!["40", "41", "63"]);
        assert_eq!(published(&h.bus, "mute_status"), vec!["ON"]);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_polls_are_staggered() {
        let h = start().await;

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(published(&h.bus, "mute_status"), vec!["OFF"]);
        assert_eq!(published(&h.bus, "volume_status"), vec!["0"]);
        assert!(published(&h.bus, "frequency_offset").is_empty());

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(published(&h.bus, "frequency_offset").len(), 1);
        assert_eq!(published(&h.bus, "frequency").len(), 1);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_does_not_stop_dispatch() {
        let h = start().await;

        h.chip.fail_next(opcode::WB_TUNE_STATUS, 1);
        h.chip.raise(int_status::STCINT | int_status::RSQINT);
        settle().await;
        assert!(published(&h.bus, "frequency").is_empty());
        assert_eq!(published(&h.bus, "frequency_offset").len(), 1);

        h.chip.raise(int_status::STCINT);
        settle().await;
        assert_eq!(published(&h.bus, "frequency").len(), 1);
        h.shutdown.cancel();
    }
}
