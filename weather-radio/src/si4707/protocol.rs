//! Si4707 command protocol.
//!
//! Every chip operation is a command byte followed by a few argument bytes,
//! written to the device, and for queries a fixed-length response read back
//! from register 0. This module turns named operations into wire requests
//! ([`Command::request`]) and fixed-layout responses into typed status
//! records. It performs no I/O and never retries: a response shorter than
//! its layout is reported as [`ProtocolError::ShortResponse`].

use std::fmt;
use std::time::Duration;

use bytes::BufMut;

use super::error::ProtocolError;
use super::patch::{PatchKind, PATCH_ENTRY_LEN};

/// Command opcodes
pub mod opcode {
    pub const POWER_UP: u8 = 0x01;
    pub const GET_REV: u8 = 0x10;
    pub const POWER_DOWN: u8 = 0x11;
    pub const SET_PROPERTY: u8 = 0x12;
    pub const GET_PROPERTY: u8 = 0x13;
    pub const GET_INT_STATUS: u8 = 0x14;
    pub const PATCH_ARGS: u8 = 0x15;
    pub const PATCH_DATA: u8 = 0x16;
    pub const WB_TUNE_FREQ: u8 = 0x50;
    pub const WB_TUNE_STATUS: u8 = 0x52;
    pub const WB_RSQ_STATUS: u8 = 0x53;
    pub const WB_SAME_STATUS: u8 = 0x54;
    pub const WB_ASQ_STATUS: u8 = 0x55;
    pub const WB_AGC_STATUS: u8 = 0x57;
    pub const WB_AGC_OVERRIDE: u8 = 0x58;
}

/// Property identifiers
pub mod property {
    /// Enables GPO2 interrupt sources.
    pub const GPO_IEN: u16 = 0x0001;
    pub const REFCLK_FREQ: u16 = 0x0201;
    pub const REFCLK_PRESCALE: u16 = 0x0202;
    pub const RX_VOLUME: u16 = 0x4000;
    pub const RX_HARD_MUTE: u16 = 0x4001;
    pub const WB_MAX_TUNE_ERROR: u16 = 0x5108;
    pub const WB_RSQ_INT_SOURCE: u16 = 0x5200;
    pub const WB_RSQ_SNR_HIGH_THRESHOLD: u16 = 0x5201;
    pub const WB_RSQ_SNR_LOW_THRESHOLD: u16 = 0x5202;
    pub const WB_RSQ_RSSI_HIGH_THRESHOLD: u16 = 0x5203;
    pub const WB_RSQ_RSSI_LOW_THRESHOLD: u16 = 0x5204;
    pub const WB_VALID_SNR_THRESHOLD: u16 = 0x5403;
    pub const WB_VALID_RSSI_THRESHOLD: u16 = 0x5404;
    pub const WB_SAME_INTERRUPT_SOURCE: u16 = 0x5500;
    pub const WB_ASQ_INT_SOURCE: u16 = 0x5600;
}

/// POWER_UP argument bits
pub mod power_up {
    /// Function 3: weather band receive.
    pub const FUNC_WB: u8 = 0x03;
    pub const XOSCEN: u8 = 0x10;
    pub const PATCH: u8 = 0x20;
    pub const GPO2OEN: u8 = 0x40;
    pub const CTSIEN: u8 = 0x80;
    /// Analog left and right audio output.
    pub const OPMODE_ANALOG: u8 = 0x05;
}

/// Interrupt status bits, as returned by GET_INT_STATUS and in byte 0 of
/// every response.
pub mod int_status {
    pub const STCINT: u8 = 0x01;
    pub const ASQINT: u8 = 0x02;
    pub const SAMEINT: u8 = 0x04;
    pub const RSQINT: u8 = 0x08;
    pub const ERRINT: u8 = 0x40;
    pub const CTSINT: u8 = 0x80;
}

/// Interrupt-source enable bits for the GPO_IEN property
pub mod int_enable {
    pub const STCIEN: u16 = 0x0001;
    pub const ASQIEN: u16 = 0x0002;
    pub const SAMEIEN: u16 = 0x0004;
    pub const RSQIEN: u16 = 0x0008;
    pub const ERRIEN: u16 = 0x0040;
    pub const CTSIEN: u16 = 0x0080;
    pub const STCREP: u16 = 0x0100;
    pub const ASQREP: u16 = 0x0200;
    pub const SAMEREP: u16 = 0x0400;
    pub const RSQREP: u16 = 0x0800;
}

/// SAME status flags (response byte 1) and the matching interrupt-source
/// enables for WB_SAME_INTERRUPT_SOURCE.
pub mod same {
    pub const HDRRDY: u8 = 0x01;
    pub const PREDET: u8 = 0x02;
    pub const SOMDET: u8 = 0x04;
    pub const EOMDET: u8 = 0x08;

    pub const HDRRDYIEN: u16 = 0x0001;
    pub const PREDETIEN: u16 = 0x0002;
    pub const SOMDETIEN: u16 = 0x0004;
    pub const EOMDETIEN: u16 = 0x0008;
}

/// 1050 Hz alert tone bits
pub mod asq {
    pub const ALERTON: u8 = 0x01;
    pub const ALERTOF: u8 = 0x02;
    /// Tone currently present (response byte 2).
    pub const ALERT: u8 = 0x01;

    pub const ALERTONIEN: u16 = 0x0001;
    pub const ALERTOFIEN: u16 = 0x0002;
}

/// Status byte 1 of tune and RSQ responses
pub mod signal {
    pub const VALID: u8 = 0x01;
    pub const AFCRL: u8 = 0x02;
}

/// Status-fetch argument: leave the interrupt pending or clear it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ack {
    /// Read the status without clearing anything.
    Check = 0x00,
    /// Clear the interrupt bit belonging to this status.
    IntAck = 0x01,
}

/// Clears the SAME buffer when set in a WB_SAME_STATUS request.
const CLRBUF: u8 = 0x02;

/// Chip-mandated minimum waits. These are lower bounds from the datasheet
/// and board bring-up, not tuning knobs.
pub mod delay {
    use std::time::Duration;

    /// Between a command and reading its response (>301 us).
    pub const COMMAND: Duration = Duration::from_millis(2);
    /// After SET_PROPERTY (>10 ms).
    pub const PROPERTY: Duration = Duration::from_millis(10);
    /// After POWER_UP in patch mode before the first patch command (>110 ms).
    pub const POWER_UP: Duration = Duration::from_millis(200);
    /// After the power-up sequence completes, before normal operation.
    pub const POWER_SETTLE: Duration = Duration::from_secs(2);
    /// Between consecutive patch commands.
    pub const PATCH_STEP: Duration = Duration::from_millis(20);
    /// After WB_TUNE_FREQ (>250 ms).
    pub const TUNE: Duration = Duration::from_millis(250);
}

/// Power-up flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerUpMode {
    Normal,
    /// Power up ready to accept the errata patch upload.
    Patch,
}

/// One of the seven NOAA weather-band channels.
///
/// The chip addresses frequency in 2.5 kHz units; weather channels are
/// 25 kHz apart from 162.400 MHz (0xFDC0) to 162.550 MHz (0xFDFC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WbChannel(u16);

impl WbChannel {
    /// Channel spacing in chip frequency units.
    pub const SPACING: u16 = 0x0A;
    pub const MIN: WbChannel = WbChannel(0xFDC0);
    pub const MAX: WbChannel = WbChannel(0xFDFC);

    /// All weather-band channels, lowest first.
    pub fn all() -> impl Iterator<Item = WbChannel> {
        (Self::MIN.0..=Self::MAX.0)
            .step_by(Self::SPACING as usize)
            .map(WbChannel)
    }

    /// Look a channel up by its chip frequency code.
    pub fn from_code(code: u16) -> Option<Self> {
        Self::all().find(|c| c.0 == code)
    }

    /// Parse a frequency written in MHz, e.g. `"162.475"`.
    pub fn from_mhz(text: &str) -> Option<Self> {
        let mhz: f64 = text.trim().parse().ok()?;
        let khz = (mhz * 1000.0).round() as u32;
        Self::all().find(|c| c.frequency_hz() / 1000 == khz)
    }

    pub fn code(&self) -> u16 {
        self.0
    }

    pub fn frequency_hz(&self) -> u32 {
        channel_to_hz(self.0)
    }
}

impl Default for WbChannel {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for WbChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let khz = self.frequency_hz() / 1000;
        write!(f, "{}.{:03} MHz", khz / 1000, khz % 1000)
    }
}

/// Chip frequency units to Hz.
pub fn channel_to_hz(channel: u16) -> u32 {
    const HZ_PER_UNIT: u32 = 2500;
    channel as u32 * HZ_PER_UNIT
}

/// Raw RSSI byte to dBuV-referenced units used in telemetry.
pub fn rssi_from_raw(raw: u8) -> i16 {
    const RSSI_OFFSET: i16 = 107;
    raw as i16 - RSSI_OFFSET
}

/// Frequency-offset byte: signed 8 bits, halved with sign preserved.
pub fn frequency_offset_from_raw(raw: u8) -> i8 {
    (raw as i8) >> 1
}

/// Chip commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PowerUp { mode: PowerUpMode },
    PowerDown,
    GetRevision,
    SetProperty { property: u16, value: u16 },
    GetProperty { property: u16 },
    GetIntStatus,
    Patch { kind: PatchKind, data: [u8; PATCH_ENTRY_LEN] },
    TuneFreq { channel: WbChannel },
    TuneStatus { ack: Ack },
    RsqStatus { ack: Ack },
    /// Read the SAME status. `read_address` selects which 8 buffered
    /// characters come back in bytes 6..14.
    SameStatus { ack: Ack, read_address: u8 },
    /// Clear the SAME buffer and acknowledge the SAME interrupt.
    SameFlush,
    AsqStatus { ack: Ack },
    AgcStatus,
    AgcOverride { disable: bool },
}

/// How a command is put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Opcode as register, single argument byte.
    Byte { reg: u8, value: u8 },
    /// Opcode as register, 16-bit little-endian argument.
    Word { reg: u8, word: u16 },
    /// Opcode as register, argument block.
    Block { reg: u8, data: Vec<u8> },
}

impl Request {
    pub fn opcode(&self) -> u8 {
        match self {
            Request::Byte { reg, .. } | Request::Word { reg, .. } | Request::Block { reg, .. } => {
                *reg
            }
        }
    }
}

impl Command {
    /// Command name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::PowerUp { .. } => "POWER_UP",
            Command::PowerDown => "POWER_DOWN",
            Command::GetRevision => "GET_REV",
            Command::SetProperty { .. } => "SET_PROPERTY",
            Command::GetProperty { .. } => "GET_PROPERTY",
            Command::GetIntStatus => "GET_INT_STATUS",
            Command::Patch { kind: PatchKind::Args, .. } => "PATCH_ARGS",
            Command::Patch { kind: PatchKind::Data, .. } => "PATCH_DATA",
            Command::TuneFreq { .. } => "WB_TUNE_FREQ",
            Command::TuneStatus { .. } => "WB_TUNE_STATUS",
            Command::RsqStatus { .. } => "WB_RSQ_STATUS",
            Command::SameStatus { .. } | Command::SameFlush => "WB_SAME_STATUS",
            Command::AsqStatus { .. } => "WB_ASQ_STATUS",
            Command::AgcStatus => "WB_AGC_STATUS",
            Command::AgcOverride { .. } => "WB_AGC_OVERRIDE",
        }
    }

    /// Encode to the wire request.
    pub fn request(&self) -> Request {
        match self {
            Command::PowerUp { mode } => {
                let mut func = power_up::GPO2OEN | power_up::XOSCEN | power_up::FUNC_WB;
                if *mode == PowerUpMode::Patch {
                    func |= power_up::PATCH;
                }
                Request::Block {
                    reg: opcode::POWER_UP,
                    data: vec![func, power_up::OPMODE_ANALOG],
                }
            }
            Command::PowerDown => Request::Byte { reg: opcode::POWER_DOWN, value: 0x00 },
            Command::GetRevision => Request::Byte { reg: opcode::GET_REV, value: 0x00 },
            Command::SetProperty { property, value } => {
                let mut data = Vec::with_capacity(5);
                data.put_u8(0x00);
                data.put_u16(*property);
                data.put_u16(*value);
                Request::Block { reg: opcode::SET_PROPERTY, data }
            }
            Command::GetProperty { property } => {
                let mut data = Vec::with_capacity(3);
                data.put_u8(0x00);
                data.put_u16(*property);
                Request::Block { reg: opcode::GET_PROPERTY, data }
            }
            Command::GetIntStatus => Request::Byte { reg: opcode::GET_INT_STATUS, value: 0x00 },
            Command::Patch { kind, data } => Request::Block {
                reg: match kind {
                    PatchKind::Args => opcode::PATCH_ARGS,
                    PatchKind::Data => opcode::PATCH_DATA,
                },
                data: data.to_vec(),
            },
            Command::TuneFreq { channel } => {
                let mut data = Vec::with_capacity(3);
                data.put_u8(0x00);
                data.put_u16(channel.code());
                Request::Block { reg: opcode::WB_TUNE_FREQ, data }
            }
            Command::TuneStatus { ack } => Request::Byte {
                reg: opcode::WB_TUNE_STATUS,
                value: *ack as u8,
            },
            Command::RsqStatus { ack } => Request::Byte {
                reg: opcode::WB_RSQ_STATUS,
                value: *ack as u8,
            },
            Command::SameStatus { ack, read_address } => Request::Block {
                reg: opcode::WB_SAME_STATUS,
                data: vec![*ack as u8, *read_address],
            },
            Command::SameFlush => Request::Block {
                reg: opcode::WB_SAME_STATUS,
                data: vec![CLRBUF | Ack::IntAck as u8, 0x00],
            },
            Command::AsqStatus { ack } => Request::Word {
                reg: opcode::WB_ASQ_STATUS,
                word: *ack as u16,
            },
            Command::AgcStatus => Request::Byte { reg: opcode::WB_AGC_STATUS, value: 0x00 },
            Command::AgcOverride { disable } => Request::Byte {
                reg: opcode::WB_AGC_OVERRIDE,
                value: *disable as u8,
            },
        }
    }

    /// Length of the response block, or 0 for commands nothing is read
    /// back from.
    pub fn response_len(&self) -> usize {
        match self {
            Command::GetRevision => Revision::LEN,
            Command::GetProperty { .. } => 4,
            Command::GetIntStatus => 1,
            Command::TuneStatus { .. } => TuneStatus::LEN,
            Command::RsqStatus { .. } => RsqStatus::LEN,
            Command::SameStatus { .. } => SameStatus::LEN,
            Command::AsqStatus { .. } => AsqStatus::LEN,
            Command::AgcStatus => 2,
            _ => 0,
        }
    }

    /// Wait after writing the command: before the response is read, or
    /// before the bus may carry the next command.
    pub fn settle(&self) -> Duration {
        match self {
            Command::PowerUp { mode: PowerUpMode::Normal } => delay::POWER_SETTLE,
            Command::PowerUp { mode: PowerUpMode::Patch } => delay::POWER_UP,
            Command::SetProperty { .. } => delay::PROPERTY,
            Command::TuneFreq { .. } => delay::TUNE,
            Command::Patch { .. } => delay::PATCH_STEP,
            // The SAME buffer is readable immediately.
            Command::SameStatus { .. } | Command::SameFlush => Duration::ZERO,
            _ => delay::COMMAND,
        }
    }
}

fn check_len(command: &'static str, bytes: &[u8], need: usize) -> Result<(), ProtocolError> {
    if bytes.len() < need {
        Err(ProtocolError::ShortResponse {
            command,
            need,
            have: bytes.len(),
        })
    } else {
        Ok(())
    }
}

/// Interrupt status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptStatus(pub u8);

impl InterruptStatus {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_len("GET_INT_STATUS", bytes, 1)?;
        Ok(Self(bytes[0]))
    }

    pub fn tune_complete(&self) -> bool {
        self.0 & int_status::STCINT != 0
    }

    pub fn alert_tone(&self) -> bool {
        self.0 & int_status::ASQINT != 0
    }

    pub fn same(&self) -> bool {
        self.0 & int_status::SAMEINT != 0
    }

    pub fn signal_quality(&self) -> bool {
        self.0 & int_status::RSQINT != 0
    }

    pub fn error(&self) -> bool {
        self.0 & int_status::ERRINT != 0
    }

    pub fn clear_to_send(&self) -> bool {
        self.0 & int_status::CTSINT != 0
    }
}

impl fmt::Display for InterruptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.tune_complete(), "STC"),
            (self.alert_tone(), "ASQ"),
            (self.same(), "SAME"),
            (self.signal_quality(), "RSQ"),
            (self.error(), "ERR"),
            (self.clear_to_send(), "CTS"),
        ];
        let set: Vec<&str> = names.iter().filter(|(on, _)| *on).map(|(_, n)| *n).collect();
        if set.is_empty() {
            write!(f, "0x{:02x}", self.0)
        } else {
            write!(f, "0x{:02x} ({})", self.0, set.join(" | "))
        }
    }
}

/// GET_REV response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Final two digits of the part number, e.g. 7 for Si4707.
    pub part_number: u8,
    pub firmware: [u8; 2],
    pub patch_id: u16,
    pub component_firmware: [u8; 2],
    pub chip_revision: u8,
}

impl Revision {
    pub const LEN: usize = 9;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_len("GET_REV", bytes, Self::LEN)?;
        Ok(Self {
            part_number: bytes[1],
            firmware: [bytes[2], bytes[3]],
            patch_id: u16::from_be_bytes([bytes[4], bytes[5]]),
            component_firmware: [bytes[6], bytes[7]],
            chip_revision: bytes[8],
        })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Si470{} firmware 0x{:02x}{:02x} patch 0x{:04x} component 0x{:02x}{:02x} chip 0x{:02x}",
            self.part_number,
            self.firmware[0],
            self.firmware[1],
            self.patch_id,
            self.component_firmware[0],
            self.component_firmware[1],
            self.chip_revision
        )
    }
}

/// WB_TUNE_STATUS response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneStatus {
    pub valid: bool,
    pub afc_railed: bool,
    /// Tuned channel in 2.5 kHz units.
    pub channel: u16,
    /// Tuned frequency in Hz.
    pub frequency: u32,
    pub rssi: i16,
    pub snr: u8,
}

impl TuneStatus {
    pub const LEN: usize = 6;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_len("WB_TUNE_STATUS", bytes, Self::LEN)?;
        let channel = u16::from_be_bytes([bytes[2], bytes[3]]);
        Ok(Self {
            valid: bytes[1] & signal::VALID != 0,
            afc_railed: bytes[1] & signal::AFCRL != 0,
            channel,
            frequency: channel_to_hz(channel),
            rssi: rssi_from_raw(bytes[4]),
            snr: bytes[5],
        })
    }
}

/// WB_RSQ_STATUS response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsqStatus {
    /// RSSI/SNR threshold interrupt flags (byte 1).
    pub interrupts: u8,
    pub valid: bool,
    pub afc_railed: bool,
    pub rssi: i16,
    pub snr: u8,
    pub frequency_offset: i8,
}

impl RsqStatus {
    pub const LEN: usize = 8;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_len("WB_RSQ_STATUS", bytes, Self::LEN)?;
        Ok(Self {
            interrupts: bytes[1],
            valid: bytes[2] & signal::VALID != 0,
            afc_railed: bytes[2] & signal::AFCRL != 0,
            rssi: rssi_from_raw(bytes[4]),
            snr: bytes[5],
            frequency_offset: frequency_offset_from_raw(bytes[7]),
        })
    }
}

/// WB_ASQ_STATUS response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsqStatus {
    /// ALERTON / ALERTOF flags (byte 1).
    pub interrupts: u8,
    /// 1050 Hz tone currently present.
    pub alert: bool,
}

impl AsqStatus {
    pub const LEN: usize = 3;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_len("WB_ASQ_STATUS", bytes, Self::LEN)?;
        Ok(Self {
            interrupts: bytes[1],
            alert: bytes[2] & asq::ALERT != 0,
        })
    }

    pub fn tone_on(&self) -> bool {
        self.interrupts & asq::ALERTON != 0
    }

    pub fn tone_off(&self) -> bool {
        self.interrupts & asq::ALERTOF != 0
    }
}

/// Characters returned per WB_SAME_STATUS read.
pub const SAME_CHUNK: usize = 8;

/// Where each of the eight 2-bit confidence values of a SAME chunk sits:
/// `(response byte, mask, shift)`, indexed by character position.
///
/// Characters 0-3 are packed into byte 5 and 4-7 into byte 4, lowest
/// character in the lowest bits.
pub const CONFIDENCE_LAYOUT: [(usize, u8, u8); SAME_CHUNK] = [
    (5, 0x03, 0),
    (5, 0x0C, 2),
    (5, 0x30, 4),
    (5, 0xC0, 6),
    (4, 0x03, 0),
    (4, 0x0C, 2),
    (4, 0x30, 4),
    (4, 0xC0, 6),
];

/// First payload byte of a SAME chunk.
const SAME_DATA_OFFSET: usize = 6;

/// WB_SAME_STATUS response: header fields plus one 8-character chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SameStatus {
    /// HDRRDY / PREDET / SOMDET / EOMDET flags.
    pub flags: u8,
    pub state: u8,
    /// Total characters buffered for the current header.
    pub length: u8,
    pub confidence: [u8; SAME_CHUNK],
    pub data: [u8; SAME_CHUNK],
}

impl SameStatus {
    pub const LEN: usize = 14;

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        check_len("WB_SAME_STATUS", bytes, Self::LEN)?;
        let mut data = [0u8; SAME_CHUNK];
        data.copy_from_slice(&bytes[SAME_DATA_OFFSET..SAME_DATA_OFFSET + SAME_CHUNK]);
        Ok(Self {
            flags: bytes[1],
            state: bytes[2],
            length: bytes[3],
            confidence: unpack_confidence(bytes),
            data,
        })
    }

    pub fn header_ready(&self) -> bool {
        self.flags & same::HDRRDY != 0
    }

    pub fn preamble_detected(&self) -> bool {
        self.flags & same::PREDET != 0
    }

    pub fn start_of_message(&self) -> bool {
        self.flags & same::SOMDET != 0
    }

    pub fn end_of_message(&self) -> bool {
        self.flags & same::EOMDET != 0
    }
}

/// Extract the eight confidence values of a SAME chunk response.
pub fn unpack_confidence(bytes: &[u8]) -> [u8; SAME_CHUNK] {
    let mut out = [0u8; SAME_CHUNK];
    for (slot, &(byte, mask, shift)) in out.iter_mut().zip(CONFIDENCE_LAYOUT.iter()) {
        *slot = (bytes[byte] & mask) >> shift;
    }
    out
}

/// GET_PROPERTY response value.
pub fn decode_property(bytes: &[u8]) -> Result<u16, ProtocolError> {
    check_len("GET_PROPERTY", bytes, 4)?;
    Ok(u16::from_be_bytes([bytes[2], bytes[3]]))
}

/// WB_AGC_STATUS response: 1 when the AGC is disabled.
pub fn decode_agc(bytes: &[u8]) -> Result<u8, ProtocolError> {
    check_len("WB_AGC_STATUS", bytes, 2)?;
    Ok(bytes[1])
}
