//! Simulated Si4707 behind a raw I2C interface.
//!
//! The model answers every command the driver issues with plausible
//! responses (property store, tuned channel, interrupt bits, a SAME
//! buffer) so the daemon can run without hardware. It also records every
//! bus transfer with its virtual timestamp and can be scripted with canned
//! responses or injected failures, which is how the driver is tested.
//!
//! [`SimulatedChip`] is a cheap handle: clones share the same chip, so one
//! clone can be handed to the bus worker while another stays with the test
//! or the daemon to inspect traffic and raise interrupts.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::hw_trait::gpio::EdgeCallback;
use crate::hw_trait::{
    Edge, GpioPin, HwError, I2c, I2cError, InterruptPin, PinMode, PinValue, Result,
};
use crate::si4707::protocol::{asq, int_status, opcode, power_up, same};
use crate::tracing::prelude::*;

/// One transfer seen on the simulated bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// A command frame: opcode followed by its arguments.
    Write { at: Instant, frame: Vec<u8> },
    /// A response read of `len` bytes.
    Read { at: Instant, len: usize },
}

impl BusEvent {
    pub fn at(&self) -> Instant {
        match self {
            BusEvent::Write { at, .. } | BusEvent::Read { at, .. } => *at,
        }
    }

    /// Opcode of a command frame.
    pub fn opcode(&self) -> Option<u8> {
        match self {
            BusEvent::Write { frame, .. } => frame.first().copied(),
            BusEvent::Read { .. } => None,
        }
    }

    pub fn frame(&self) -> Option<&[u8]> {
        match self {
            BusEvent::Write { frame, .. } => Some(frame),
            BusEvent::Read { .. } => None,
        }
    }
}

/// Status-response byte 0: clear-to-send plus pending interrupts.
const CTS: u8 = int_status::CTSINT;

const SAME_CLRBUF: u8 = 0x02;
const SAME_INTACK: u8 = 0x01;

/// Raw values the model reports for signal metrics.
const DEFAULT_RSSI_RAW: u8 = 107 + 28;
const DEFAULT_SNR: u8 = 18;
const DEFAULT_CHANNEL: u16 = 0xFDFC;

/// Bus events kept; older ones are dropped first.
pub const EVENT_LOG_LIMIT: usize = 1024;

struct ChipModel {
    address: u8,
    powered: bool,
    patch_mode: bool,
    patch_commands: usize,
    channel: u16,
    rssi_raw: u8,
    snr: u8,
    offset_raw: u8,
    properties: HashMap<u16, u16>,
    pending: u8,
    same_flags: u8,
    same_state: u8,
    same_buffer: Vec<u8>,
    same_confidence: u8,
    asq_flags: u8,
    alert: bool,
    agc_disabled: u8,
    response: Vec<u8>,
    scripted: HashMap<u8, VecDeque<Vec<u8>>>,
    failures: HashMap<u8, usize>,
    log: VecDeque<BusEvent>,
}

impl ChipModel {
    fn new(address: u8) -> Self {
        Self {
            address,
            powered: false,
            patch_mode: false,
            patch_commands: 0,
            channel: DEFAULT_CHANNEL,
            rssi_raw: DEFAULT_RSSI_RAW,
            snr: DEFAULT_SNR,
            offset_raw: 0,
            properties: HashMap::new(),
            pending: 0,
            same_flags: 0,
            same_state: 0,
            same_buffer: Vec::new(),
            same_confidence: 3,
            asq_flags: 0,
            alert: false,
            agc_disabled: 0,
            response: vec![CTS],
            scripted: HashMap::new(),
            failures: HashMap::new(),
            log: VecDeque::with_capacity(EVENT_LOG_LIMIT),
        }
    }

    fn status(&self) -> u8 {
        CTS | self.pending
    }

    /// Apply a command frame. Returns true when it raised an interrupt.
    fn execute(&mut self, frame: &[u8]) -> Result<bool> {
        let Some((&op, args)) = frame.split_first() else {
            return Err(I2cError::Other("empty write".into()).into());
        };
        if let Some(count) = self.failures.get_mut(&op) {
            if *count > 0 {
                *count -= 1;
                return Err(I2cError::NoAck(self.address).into());
            }
        }

        self.record(BusEvent::Write {
            at: Instant::now(),
            frame: frame.to_vec(),
        });

        let arg = |i: usize| args.get(i).copied().unwrap_or(0);
        let mut raised = false;
        let response = match op {
            opcode::POWER_UP => {
                self.powered = true;
                self.patch_mode = arg(0) & power_up::PATCH != 0;
                self.patch_commands = 0;
                vec![CTS]
            }
            opcode::POWER_DOWN => {
                self.powered = false;
                self.pending = 0;
                vec![CTS]
            }
            opcode::PATCH_ARGS | opcode::PATCH_DATA => {
                self.patch_commands += 1;
                vec![CTS]
            }
            opcode::GET_REV => {
                let (hi, lo) = if self.patch_mode && self.patch_commands > 0 {
                    (0xD1, 0x95)
                } else {
                    (0x00, 0x00)
                };
                vec![self.status(), 7, b'2', b'0', hi, lo, b'2', b'0', b'B']
            }
            opcode::SET_PROPERTY => {
                let property = u16::from_be_bytes([arg(1), arg(2)]);
                let value = u16::from_be_bytes([arg(3), arg(4)]);
                self.properties.insert(property, value);
                vec![CTS]
            }
            opcode::GET_PROPERTY => {
                let property = u16::from_be_bytes([arg(1), arg(2)]);
                let [hi, lo] = self.properties.get(&property).copied().unwrap_or(0).to_be_bytes();
                vec![self.status(), 0x00, hi, lo]
            }
            opcode::GET_INT_STATUS => vec![self.status()],
            opcode::WB_TUNE_FREQ => {
                self.channel = u16::from_be_bytes([arg(1), arg(2)]);
                self.pending |= int_status::STCINT;
                raised = true;
                vec![CTS]
            }
            opcode::WB_TUNE_STATUS => {
                if arg(0) & 0x01 != 0 {
                    self.pending &= !int_status::STCINT;
                }
                let [hi, lo] = self.channel.to_be_bytes();
                vec![self.status(), 0x01, hi, lo, self.rssi_raw, self.snr]
            }
            opcode::WB_RSQ_STATUS => {
                if arg(0) & 0x01 != 0 {
                    self.pending &= !int_status::RSQINT;
                }
                vec![
                    self.status(),
                    0x00,
                    0x01,
                    0x00,
                    self.rssi_raw,
                    self.snr,
                    0x00,
                    self.offset_raw,
                ]
            }
            opcode::WB_SAME_STATUS => {
                let mode = arg(0);
                let offset = arg(1) as usize;
                if mode & SAME_CLRBUF != 0 {
                    self.same_buffer.clear();
                    self.same_flags = 0;
                    self.same_state = 0;
                }
                if mode & SAME_INTACK != 0 {
                    self.pending &= !int_status::SAMEINT;
                }
                let conf = self.same_confidence & 0x03;
                let packed = conf | conf << 2 | conf << 4 | conf << 6;
                let mut out = vec![
                    self.status(),
                    self.same_flags,
                    self.same_state,
                    self.same_buffer.len().min(u8::MAX as usize) as u8,
                    packed,
                    packed,
                ];
                for i in offset..offset + 8 {
                    out.push(self.same_buffer.get(i).copied().unwrap_or(0));
                }
                out
            }
            opcode::WB_ASQ_STATUS => {
                let out = vec![self.status(), self.asq_flags, self.alert as u8];
                if arg(0) & 0x01 != 0 {
                    self.pending &= !int_status::ASQINT;
                    self.asq_flags = 0;
                }
                out
            }
            opcode::WB_AGC_STATUS => vec![self.status(), self.agc_disabled],
            opcode::WB_AGC_OVERRIDE => {
                self.agc_disabled = arg(0) & 0x01;
                vec![CTS]
            }
            other => {
                warn!(opcode = other, "Simulated chip got unknown command");
                vec![CTS | int_status::ERRINT]
            }
        };

        self.response = match self.scripted.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(canned) => canned,
            None => response,
        };
        Ok(raised)
    }

    fn read_response(&mut self, buffer: &mut [u8]) {
        self.record(BusEvent::Read {
            at: Instant::now(),
            len: buffer.len(),
        });
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.response.get(i).copied().unwrap_or(0);
        }
    }

    fn record(&mut self, event: BusEvent) {
        if self.log.len() == EVENT_LOG_LIMIT {
            self.log.pop_front();
        }
        self.log.push_back(event);
    }

    fn check_address(&self, addr: u8) -> Result<()> {
        if addr == self.address {
            Ok(())
        } else {
            Err(I2cError::NoAck(addr).into())
        }
    }
}

/// Simulated Si4707.
#[derive(Clone)]
pub struct SimulatedChip {
    model: Arc<Mutex<ChipModel>>,
    interrupt: Arc<Mutex<Option<EdgeCallback>>>,
}

impl SimulatedChip {
    pub fn new(address: u8) -> Self {
        Self {
            model: Arc::new(Mutex::new(ChipModel::new(address))),
            interrupt: Arc::new(Mutex::new(None)),
        }
    }

    fn model(&self) -> MutexGuard<'_, ChipModel> {
        // A panic while holding the lock only happens in a failing test;
        // the model stays usable.
        self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fire(&self) {
        let mut slot = self.interrupt.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(callback) = slot.as_mut() {
            callback();
        }
    }

    /// The chip's GPO2/INT line.
    pub fn interrupt_pin(&self) -> SimInterruptPin {
        SimInterruptPin {
            interrupt: Arc::clone(&self.interrupt),
        }
    }

    /// The most recent transfers, at most [`EVENT_LOG_LIMIT`].
    pub fn events(&self) -> Vec<BusEvent> {
        self.model().log.iter().cloned().collect()
    }

    /// Command frames among [`events`](Self::events).
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.model()
            .log
            .iter()
            .filter_map(|e| e.frame().map(<[u8]>::to_vec))
            .collect()
    }

    pub fn clear_events(&self) {
        self.model().log.clear();
    }

    pub fn is_powered(&self) -> bool {
        self.model().powered
    }

    /// Number of patch commands accepted since the last power-up.
    pub fn patch_commands(&self) -> usize {
        self.model().patch_commands
    }

    pub fn property(&self, property: u16) -> Option<u16> {
        self.model().properties.get(&property).copied()
    }

    pub fn set_property(&self, property: u16, value: u16) {
        self.model().properties.insert(property, value);
    }

    pub fn channel(&self) -> u16 {
        self.model().channel
    }

    /// Set the raw signal bytes reported by tune and RSQ status.
    pub fn set_signal(&self, rssi_raw: u8, snr: u8, offset_raw: u8) {
        let mut model = self.model();
        model.rssi_raw = rssi_raw;
        model.snr = snr;
        model.offset_raw = offset_raw;
    }

    /// Answer the next `opcode` command with `response` instead of the
    /// modelled one.
    pub fn script_response(&self, opcode: u8, response: Vec<u8>) {
        self.model()
            .scripted
            .entry(opcode)
            .or_default()
            .push_back(response);
    }

    /// Refuse the next `count` writes of `opcode` with a NACK.
    pub fn fail_next(&self, opcode: u8, count: usize) {
        *self.model().failures.entry(opcode).or_default() += count;
    }

    /// Set interrupt status bits and pulse the interrupt line.
    pub fn raise(&self, bits: u8) {
        self.model().pending |= bits;
        self.fire();
    }

    pub fn pending_interrupts(&self) -> u8 {
        self.model().pending
    }

    /// Receive a SAME header: buffer `text`, flag header ready and interrupt.
    pub fn receive_same(&self, text: &[u8], confidence: u8) {
        {
            let mut model = self.model();
            model.same_buffer = text.to_vec();
            model.same_confidence = confidence;
            model.same_flags = same::PREDET | same::SOMDET | same::HDRRDY;
            model.same_state = 0x03;
            model.pending |= int_status::SAMEINT;
        }
        self.fire();
    }

    /// Signal end of message.
    pub fn end_of_message(&self) {
        {
            let mut model = self.model();
            model.same_flags |= same::EOMDET;
            model.pending |= int_status::SAMEINT;
        }
        self.fire();
    }

    /// Start or stop the 1050 Hz tone.
    pub fn alert_tone(&self, on: bool) {
        {
            let mut model = self.model();
            model.alert = on;
            model.asq_flags |= if on { asq::ALERTON } else { asq::ALERTOF };
            model.pending |= int_status::ASQINT;
        }
        self.fire();
    }
}

#[async_trait]
impl I2c for SimulatedChip {
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        let raised = {
            let mut model = self.model();
            model.check_address(addr)?;
            model.execute(data)?
        };
        if raised {
            self.fire();
        }
        Ok(())
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        let mut model = self.model();
        model.check_address(addr)?;
        model.read_response(buffer);
        Ok(())
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        let raised = {
            let mut model = self.model();
            model.check_address(addr)?;
            // Register 0 addresses the response buffer.
            let raised = if write == [0x00] {
                false
            } else {
                model.execute(write)?
            };
            model.read_response(read);
            raised
        };
        if raised {
            self.fire();
        }
        Ok(())
    }
}

/// The simulated chip's interrupt line.
pub struct SimInterruptPin {
    interrupt: Arc<Mutex<Option<EdgeCallback>>>,
}

impl InterruptPin for SimInterruptPin {
    fn on_edge(&mut self, edge: Edge, callback: EdgeCallback) -> Result<()> {
        if edge == Edge::Rising {
            return Err(HwError::NotSupported(
                "Si4707 GPO2/INT is active low".into(),
            ));
        }
        *self.interrupt.lock().unwrap_or_else(|p| p.into_inner()) = Some(callback);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        *self.interrupt.lock().unwrap_or_else(|p| p.into_inner()) = None;
        Ok(())
    }
}

/// A GPIO line that remembers what was written to it.
#[derive(Clone)]
pub struct SimPin {
    number: u8,
    mode: Arc<Mutex<PinMode>>,
    history: Arc<Mutex<Vec<(Instant, PinValue)>>>,
}

impl SimPin {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            mode: Arc::new(Mutex::new(PinMode::Input)),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// Values written, with when they were written.
    pub fn history(&self) -> Vec<(Instant, PinValue)> {
        self.history.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl GpioPin for SimPin {
    async fn set_mode(&mut self, mode: PinMode) -> Result<()> {
        *self.mode.lock().unwrap_or_else(|p| p.into_inner()) = mode;
        Ok(())
    }

    async fn write(&mut self, value: PinValue) -> Result<()> {
        if *self.mode.lock().unwrap_or_else(|p| p.into_inner()) != PinMode::Output {
            return Err(HwError::InvalidParameter(format!(
                "pin {} is not an output",
                self.number
            )));
        }
        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((Instant::now(), value));
        Ok(())
    }

    async fn read(&mut self) -> Result<PinValue> {
        let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        Ok(history.last().map(|(_, v)| *v).unwrap_or(PinValue::Low))
    }
}
