//! Serialized access to the chip.
//!
//! The Si4707 accepts one command at a time and must be left alone for a
//! settle delay after most of them, so the bus is owned by a single worker
//! that runs queued [`Transaction`]s one after another. Callers hold a
//! cloneable [`ChipSession`] handle; every operation on it is enqueued the
//! moment it is called (so queue order is call order, FIFO) and returns a
//! future that resolves once the worker has run it.
//!
//! A transaction is a short script of writes, settle delays and response
//! reads that must not be interleaved with anyone else's traffic, e.g. a
//! status command followed by its response. A transaction whose follow-up
//! depends on its own output (the SAME header read, then the chunk reads it
//! sizes) runs as one chained job, so nothing else is queued in between.
//! A failure is delivered only to the requester whose transaction failed;
//! the worker moves on to the next one.
//!
//! The worker is also the only place that knows the power state. Power
//! transitions are whole transactions tagged with their target state, so an
//! already-reached state turns them into no-ops, and data operations issued
//! while the chip is off fail with [`RadioError::NotPowered`] without
//! touching the bus.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use super::error::{RadioError, Result};
use super::protocol::{
    self, property, Ack, AsqStatus, Command, InterruptStatus, Request, Revision, RsqStatus,
    TuneStatus, WbChannel,
};
use crate::hw_trait::{Endian, HwError, Smbus};
use crate::tracing::prelude::*;

/// Register the chip's response buffer is read from.
const RESPONSE_REGISTER: u8 = 0x00;

/// Highest RX_VOLUME value.
pub const MAX_VOLUME: u16 = 0x003F;

/// RX_HARD_MUTE value muting both channels.
const HARD_MUTE_BOTH: u16 = 0x0003;

/// Chip power state as tracked by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Off,
    On,
}

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Write(Request),
    /// Read `len` bytes of response; appended to the transaction output.
    Read(usize),
    Settle(Duration),
}

/// An uninterruptible sequence of bus steps.
#[derive(Debug, Clone)]
pub struct Transaction {
    label: &'static str,
    steps: Vec<Step>,
}

impl Transaction {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            steps: Vec::new(),
        }
    }

    /// A single command: write, settle, and read its response if it has one.
    pub fn command(command: &Command) -> Self {
        let mut txn = Self::new(command.name());
        txn.push_command(command);
        txn
    }

    pub fn push_command(&mut self, command: &Command) {
        self.steps.push(Step::Write(command.request()));
        let settle = command.settle();
        if !settle.is_zero() {
            self.steps.push(Step::Settle(settle));
        }
        let len = command.response_len();
        if len > 0 {
            self.steps.push(Step::Read(len));
        }
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// Builds the follow-up of a chained job from the first transaction's
/// output; `None` ends the chain.
pub type FollowUp = Box<dyn FnOnce(&[u8]) -> Result<Option<Transaction>> + Send>;

/// Queued work, consumed exactly once by the worker.
enum Job {
    /// A data transaction; requires the chip to be on.
    Run {
        txn: Transaction,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    /// A data transaction and its dependent follow-up, run back to back.
    Chain {
        txn: Transaction,
        then: FollowUp,
        reply: oneshot::Sender<Result<(Vec<u8>, Vec<u8>)>>,
    },
    /// A power transition; skipped when `target` is already reached.
    Power {
        target: PowerState,
        txn: Transaction,
        reply: oneshot::Sender<Result<bool>>,
    },
}

/// Handle to the chip session.
///
/// Cheap to clone. When every handle is dropped the worker exits.
#[derive(Clone)]
pub struct ChipSession {
    jobs: mpsc::UnboundedSender<Job>,
    power: watch::Receiver<PowerState>,
}

/// The single owner of the bus.
pub struct SessionWorker<B> {
    bus: B,
    jobs: mpsc::UnboundedReceiver<Job>,
    power: PowerState,
    power_tx: watch::Sender<PowerState>,
}

impl ChipSession {
    /// Create a session over `bus` without starting its worker.
    pub fn new<B: Smbus>(bus: B) -> (Self, SessionWorker<B>) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (power_tx, power_rx) = watch::channel(PowerState::Off);
        (
            Self {
                jobs: jobs_tx,
                power: power_rx,
            },
            SessionWorker {
                bus,
                jobs: jobs_rx,
                power: PowerState::Off,
                power_tx,
            },
        )
    }

    /// Start the worker as a task on the current runtime.
    pub fn spawn<B: Smbus + 'static>(bus: B) -> (Self, tokio::task::JoinHandle<()>) {
        let (session, worker) = Self::new(bus);
        (session, tokio::spawn(worker.run()))
    }

    /// Start the worker on a dedicated OS thread with its own runtime.
    ///
    /// For transports whose calls block the calling thread (Linux i2c-dev
    /// ioctls), so bus time never stalls the control-plane runtime.
    pub fn spawn_on_thread<B: Smbus + 'static>(
        bus: B,
    ) -> std::io::Result<(Self, std::thread::JoinHandle<()>)> {
        let (session, worker) = Self::new(bus);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let handle = std::thread::Builder::new()
            .name("si4707-bus".into())
            .spawn(move || runtime.block_on(worker.run()))?;
        Ok((session, handle))
    }

    /// Power state as last recorded by the worker.
    pub fn power_state(&self) -> PowerState {
        *self.power.borrow()
    }

    /// Watch power transitions.
    pub fn power_updates(&self) -> watch::Receiver<PowerState> {
        self.power.clone()
    }

    /// Queue `txn`; the returned future yields the concatenated response
    /// bytes of its reads.
    pub fn submit(&self, txn: Transaction) -> impl Future<Output = Result<Vec<u8>>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let queued = self.jobs.send(Job::Run { txn, reply }).is_ok();
        async move {
            if !queued {
                return Err(RadioError::SessionClosed);
            }
            rx.await.map_err(|_| RadioError::SessionClosed)?
        }
    }

    /// Queue `txn` followed by whatever `then` builds from its output, with
    /// no other job between the two. Yields both outputs; the second is
    /// empty when `then` returns `None`.
    pub fn submit_then<F>(
        &self,
        txn: Transaction,
        then: F,
    ) -> impl Future<Output = Result<(Vec<u8>, Vec<u8>)>> + Send + 'static
    where
        F: FnOnce(&[u8]) -> Result<Option<Transaction>> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let then: FollowUp = Box::new(then);
        let queued = self.jobs.send(Job::Chain { txn, then, reply }).is_ok();
        async move {
            if !queued {
                return Err(RadioError::SessionClosed);
            }
            rx.await.map_err(|_| RadioError::SessionClosed)?
        }
    }

    /// Queue a power transition to `target`. Yields false when the chip
    /// was already in that state and nothing was sent.
    pub fn transition(
        &self,
        target: PowerState,
        txn: Transaction,
    ) -> impl Future<Output = Result<bool>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let queued = self.jobs.send(Job::Power { target, txn, reply }).is_ok();
        async move {
            if !queued {
                return Err(RadioError::SessionClosed);
            }
            rx.await.map_err(|_| RadioError::SessionClosed)?
        }
    }

    /// Queue a single command.
    pub fn command(&self, command: Command) -> impl Future<Output = Result<Vec<u8>>> + Send + 'static {
        self.submit(Transaction::command(&command))
    }

    pub fn revision(&self) -> impl Future<Output = Result<Revision>> + Send + 'static {
        let pending = self.command(Command::GetRevision);
        async move { Ok(Revision::decode(&pending.await?)?) }
    }

    pub fn interrupt_status(&self) -> impl Future<Output = Result<InterruptStatus>> + Send + 'static {
        let pending = self.command(Command::GetIntStatus);
        async move { Ok(InterruptStatus::decode(&pending.await?)?) }
    }

    pub fn set_property(&self, property: u16, value: u16) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = self.command(Command::SetProperty { property, value });
        async move { pending.await.map(drop) }
    }

    pub fn get_property(&self, property: u16) -> impl Future<Output = Result<u16>> + Send + 'static {
        let pending = self.command(Command::GetProperty { property });
        async move { Ok(protocol::decode_property(&pending.await?)?) }
    }

    pub fn tune(&self, channel: WbChannel) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = self.command(Command::TuneFreq { channel });
        async move { pending.await.map(drop) }
    }

    pub fn tune_status(&self, ack: Ack) -> impl Future<Output = Result<TuneStatus>> + Send + 'static {
        let pending = self.command(Command::TuneStatus { ack });
        async move { Ok(TuneStatus::decode(&pending.await?)?) }
    }

    pub fn rsq_status(&self, ack: Ack) -> impl Future<Output = Result<RsqStatus>> + Send + 'static {
        let pending = self.command(Command::RsqStatus { ack });
        async move { Ok(RsqStatus::decode(&pending.await?)?) }
    }

    pub fn asq_status(&self, ack: Ack) -> impl Future<Output = Result<AsqStatus>> + Send + 'static {
        let pending = self.command(Command::AsqStatus { ack });
        async move { Ok(AsqStatus::decode(&pending.await?)?) }
    }

    /// Clear the SAME buffer and acknowledge its interrupt.
    pub fn same_flush(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = self.command(Command::SameFlush);
        async move { pending.await.map(drop) }
    }

    /// True when the AGC is disabled.
    pub fn agc_disabled(&self) -> impl Future<Output = Result<bool>> + Send + 'static {
        let pending = self.command(Command::AgcStatus);
        async move { Ok(protocol::decode_agc(&pending.await?)? != 0) }
    }

    pub fn set_agc_disabled(&self, disable: bool) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = self.command(Command::AgcOverride { disable });
        async move { pending.await.map(drop) }
    }

    pub fn volume(&self) -> impl Future<Output = Result<u16>> + Send + 'static {
        self.get_property(property::RX_VOLUME)
    }

    /// Set the output volume, clamped to 0..=63.
    pub fn set_volume(&self, volume: i32) -> impl Future<Output = Result<()>> + Send + 'static {
        let clamped = volume.clamp(0, MAX_VOLUME as i32) as u16;
        self.set_property(property::RX_VOLUME, clamped)
    }

    /// Step the volume by `delta`: read it, then write the clamped sum.
    pub async fn adjust_volume(&self, delta: i32) -> Result<()> {
        let current = self.volume().await?;
        self.set_volume(current as i32 + delta).await
    }

    /// Hard mute query: `Some(true)` muted, `Some(false)` unmuted, `None` for
    /// a partial (single channel) mute.
    pub fn muted(&self) -> impl Future<Output = Result<Option<bool>>> + Send + 'static {
        let pending = self.get_property(property::RX_HARD_MUTE);
        async move {
            Ok(match pending.await? {
                HARD_MUTE_BOTH => Some(true),
                0 => Some(false),
                _ => None,
            })
        }
    }

    pub fn set_muted(&self, muted: bool) -> impl Future<Output = Result<()>> + Send + 'static {
        let value = if muted { HARD_MUTE_BOTH } else { 0 };
        self.set_property(property::RX_HARD_MUTE, value)
    }
}

impl<B: Smbus> SessionWorker<B> {
    /// Run queued jobs until every session handle is gone.
    pub async fn run(mut self) {
        debug!("Chip session worker started");
        while let Some(job) = self.jobs.recv().await {
            match job {
                Job::Run { txn, reply } => {
                    let result = if self.power == PowerState::On {
                        self.execute(&txn).await
                    } else {
                        debug!(txn = txn.label(), "Rejected, chip is off");
                        Err(RadioError::NotPowered)
                    };
                    if result.is_err() {
                        debug!(txn = txn.label(), "Transaction failed");
                    }
                    // A requester that stopped waiting is not an error.
                    let _ = reply.send(result);
                }
                Job::Chain { txn, then, reply } => {
                    let result = if self.power == PowerState::On {
                        self.execute_chain(&txn, then).await
                    } else {
                        debug!(txn = txn.label(), "Rejected, chip is off");
                        Err(RadioError::NotPowered)
                    };
                    if result.is_err() {
                        debug!(txn = txn.label(), "Chained transaction failed");
                    }
                    let _ = reply.send(result);
                }
                Job::Power { target, txn, reply } => {
                    let result = if self.power == target {
                        trace!(?target, "Power state already reached");
                        Ok(false)
                    } else {
                        self.execute(&txn).await.map(|_| {
                            self.power = target;
                            self.power_tx.send_replace(target);
                            info!(?target, "Chip power state changed");
                            true
                        })
                    };
                    let _ = reply.send(result);
                }
            }
        }
        debug!("Chip session worker stopped");
    }

    async fn execute(&mut self, txn: &Transaction) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        for step in txn.steps() {
            match step {
                Step::Write(request) => {
                    trace!(txn = txn.label(), ?request, "tx");
                    self.write(request).await.inspect_err(|e| {
                        warn!(txn = txn.label(), error = %e, "Bus write failed");
                    })?;
                }
                Step::Read(len) => {
                    let bytes = self
                        .bus
                        .read_block(RESPONSE_REGISTER, *len)
                        .await
                        .inspect_err(|e| warn!(txn = txn.label(), error = %e, "Bus read failed"))?;
                    trace!(txn = txn.label(), rx = ?bytes, "rx");
                    output.extend_from_slice(&bytes);
                }
                Step::Settle(delay) => tokio::time::sleep(*delay).await,
            }
        }
        Ok(output)
    }

    async fn execute_chain(
        &mut self,
        txn: &Transaction,
        then: FollowUp,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let first = self.execute(txn).await?;
        let second = match then(&first)? {
            Some(next) => self.execute(&next).await?,
            None => Vec::new(),
        };
        Ok((first, second))
    }

    async fn write(&mut self, request: &Request) -> std::result::Result<(), HwError> {
        match request {
            Request::Byte { reg, value } => self.bus.write_register_byte(*reg, *value).await,
            Request::Word { reg, word } => {
                self.bus.write_register_word(*reg, *word, Endian::Little).await
            }
            Request::Block { reg, data } => self.bus.write_block(*reg, data).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::SmbusDevice;
    use crate::si4707::protocol::{delay, opcode, PowerUpMode};
    use crate::transport::sim::{BusEvent, SimulatedChip};

    fn sim_session() -> (SimulatedChip, ChipSession) {
        let chip = SimulatedChip::new(0x11);
        let (session, _worker) = ChipSession::spawn(SmbusDevice::new(chip.clone(), 0x11));
        (chip, session)
    }

    async fn power_on(session: &ChipSession) {
        let txn = Transaction::command(&Command::PowerUp { mode: PowerUpMode::Normal });
        assert!(session.transition(PowerState::On, txn).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_run_in_order_without_overlap() {
        let (chip, session) = sim_session();
        power_on(&session).await;
        chip.clear_events();

        let ops = [
            Command::TuneStatus { ack: Ack::Check },
            Command::RsqStatus { ack: Ack::Check },
            Command::GetIntStatus,
            Command::AgcStatus,
            Command::GetProperty { property: property::RX_VOLUME },
            Command::GetRevision,
        ];
        let pending: Vec<_> = ops.iter().cloned().map(|c| session.command(c)).collect();
        let results = futures::future::join_all(pending).await;
        assert!(results.iter().all(|r| r.is_ok()));

        // Each transaction is exactly a write followed by its own read.
        let events = chip.events();
        assert_eq!(events.len(), ops.len() * 2);
        for (pair, op) in events.chunks(2).zip(ops.iter()) {
            assert_eq!(pair[0].opcode(), Some(op.request().opcode()));
            assert_eq!(pair[1], BusEvent::Read { at: pair[1].at(), len: op.response_len() });
            assert!(pair[1].at() - pair[0].at() >= delay::COMMAND);
        }
        for window in events.windows(2) {
            assert!(window[0].at() <= window[1].at());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_only_its_requester() {
        let (chip, session) = sim_session();
        power_on(&session).await;
        chip.fail_next(opcode::WB_RSQ_STATUS, 1);

        let first = session.tune_status(Ack::Check);
        let second = session.rsq_status(Ack::Check);
        let third = session.revision();

        assert!(first.await.is_ok());
        assert!(matches!(second.await, Err(RadioError::Transport(_))));
        assert!(third.await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_operations_need_power() {
        let (chip, session) = sim_session();
        assert_eq!(session.power_state(), PowerState::Off);

        let err = session.tune_status(Ack::Check).await.unwrap_err();
        assert!(matches!(err, RadioError::NotPowered));
        assert!(chip.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_to_current_state_is_noop() {
        let (chip, session) = sim_session();
        power_on(&session).await;
        assert_eq!(session.power_state(), PowerState::On);

        let txn = Transaction::command(&Command::PowerUp { mode: PowerUpMode::Normal });
        assert!(!session.transition(PowerState::On, txn).await.unwrap());

        let power_ups = chip
            .writes()
            .iter()
            .filter(|f| f[0] == opcode::POWER_UP)
            .count();
        assert_eq!(power_ups, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_power_up_leaves_chip_off() {
        let (chip, session) = sim_session();
        chip.fail_next(opcode::POWER_UP, 1);

        let txn = Transaction::command(&Command::PowerUp { mode: PowerUpMode::Normal });
        assert!(session.transition(PowerState::On, txn).await.is_err());
        assert_eq!(session.power_state(), PowerState::Off);

        // Queue keeps working after the failure.
        power_on(&session).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_is_clamped_and_stepped() {
        let (chip, session) = sim_session();
        power_on(&session).await;

        session.set_volume(200).await.unwrap();
        assert_eq!(chip.property(property::RX_VOLUME), Some(63));
        session.adjust_volume(1).await.unwrap();
        assert_eq!(session.volume().await.unwrap(), 63);

        session.set_volume(-5).await.unwrap();
        assert_eq!(session.volume().await.unwrap(), 0);
        session.adjust_volume(-1).await.unwrap();
        assert_eq!(session.volume().await.unwrap(), 0);
        session.adjust_volume(1).await.unwrap();
        assert_eq!(session.volume().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_states() {
        let (chip, session) = sim_session();
        power_on(&session).await;

        session.set_muted(true).await.unwrap();
        assert_eq!(session.muted().await.unwrap(), Some(true));
        session.set_muted(false).await.unwrap();
        assert_eq!(session.muted().await.unwrap(), Some(false));
        chip.set_property(property::RX_HARD_MUTE, 0x0001);
        assert_eq!(session.muted().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chained_follow_up_runs_before_later_jobs() {
        let (chip, session) = sim_session();
        power_on(&session).await;
        chip.clear_events();

        let chained = session.submit_then(Transaction::command(&Command::GetIntStatus), |raw| {
            assert_eq!(raw.len(), 1);
            Ok(Some(Transaction::command(&Command::TuneStatus { ack: Ack::Check })))
        });
        let later = session.revision();

        let (first, second) = chained.await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), Command::TuneStatus { ack: Ack::Check }.response_len());
        later.await.unwrap();

        let opcodes: Vec<u8> = chip.writes().iter().map(|f| f[0]).collect();
        assert_eq!(
            opcodes,
            vec![opcode::GET_INT_STATUS, opcode::WB_TUNE_STATUS, opcode::GET_REV]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_without_follow_up_and_while_off() {
        let (chip, session) = sim_session();
        let off = session.submit_then(Transaction::command(&Command::GetIntStatus), |_| Ok(None));
        assert!(matches!(off.await, Err(RadioError::NotPowered)));
        assert!(chip.events().is_empty());

        power_on(&session).await;
        let (_, second) = session
            .submit_then(Transaction::command(&Command::GetIntStatus), |_| Ok(None))
            .await
            .unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_reports_closed() {
        let chip = SimulatedChip::new(0x11);
        let (session, worker) = ChipSession::new(SmbusDevice::new(chip, 0x11));
        drop(worker);
        let err = session.revision().await.unwrap_err();
        assert!(matches!(err, RadioError::SessionClosed));
    }
}
