//! SAME alert message assembly.
//!
//! When the chip signals a SAME header, the header status tells how many
//! characters it has buffered. Those are pulled out eight at a time, each
//! read returning eight payload bytes and eight 2-bit confidence values,
//! and concatenated into an [`AlertMessage`]. Headers shorter than
//! [`SAME_MIN_LENGTH`] are noise and yield no message.
//!
//! The chip keeps the buffer until told to clear it; the dispatcher does so
//! on end of message or after [`SAME_INACTIVITY`] without SAME activity
//! (see [`InactivityTimer`]).

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use super::error::Result;
use super::protocol::{Ack, Command, SameStatus, SAME_CHUNK};
use super::session::{ChipSession, Transaction};
use crate::tracing::prelude::*;

/// Shortest header worth decoding.
pub const SAME_MIN_LENGTH: u8 = 36;

/// Quiet period after which the SAME buffer is flushed.
pub const SAME_INACTIVITY: Duration = Duration::from_secs(6);

/// Lowest per-character confidence for a message to count as reliable.
pub const SAME_CONFIDENCE_THRESHOLD: u8 = 1;

/// A SAME header carries at most this many location codes.
pub const SAME_MAX_LOCATIONS: usize = 31;

/// Outcome of reading the SAME status after a SAME interrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SameReport {
    pub flags: u8,
    pub state: u8,
    /// Characters the chip reported buffered.
    pub length: u8,
    /// The assembled header, if one was ready and long enough.
    pub message: Option<AlertMessage>,
}

impl SameReport {
    fn from_header(header: &SameStatus) -> Self {
        Self {
            flags: header.flags,
            state: header.state,
            length: header.length,
            message: None,
        }
    }

    pub fn header_ready(&self) -> bool {
        self.flags & super::protocol::same::HDRRDY != 0
    }

    pub fn preamble_detected(&self) -> bool {
        self.flags & super::protocol::same::PREDET != 0
    }

    pub fn start_of_message(&self) -> bool {
        self.flags & super::protocol::same::SOMDET != 0
    }

    pub fn end_of_message(&self) -> bool {
        self.flags & super::protocol::same::EOMDET != 0
    }
}

/// Accumulates chunk reads in stride order.
#[derive(Debug, Default)]
struct AlertMessageBuffer {
    confidence: Vec<u8>,
    payload: Vec<u8>,
}

impl AlertMessageBuffer {
    fn with_length(length: u8) -> Self {
        let capacity = chunk_count(length) * SAME_CHUNK;
        Self {
            confidence: Vec::with_capacity(capacity),
            payload: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, chunk: &SameStatus) {
        self.confidence.extend_from_slice(&chunk.confidence);
        self.payload.extend_from_slice(&chunk.data);
    }

    fn finish(self, length: u8) -> AlertMessage {
        AlertMessage {
            length: length as usize,
            confidence: self.confidence,
            payload: self.payload,
        }
    }
}

/// A SAME header as pulled from the chip.
///
/// `confidence` and `payload` hold whole chunks, so both are the declared
/// length rounded up to a multiple of eight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub length: usize,
    pub confidence: Vec<u8>,
    pub payload: Vec<u8>,
}

impl AlertMessage {
    fn declared<'a, T>(&self, all: &'a [T]) -> &'a [T] {
        &all[..self.length.min(all.len())]
    }

    /// Payload as text. Bytes outside ASCII become U+FFFD; the raw bytes
    /// stay available in `payload`.
    pub fn text(&self) -> String {
        self.declared(&self.payload)
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
            .collect::<String>()
            .trim_end_matches('\0')
            .to_string()
    }

    pub fn min_confidence(&self) -> u8 {
        self.declared(&self.confidence).iter().copied().min().unwrap_or(0)
    }

    /// Every character meets the confidence threshold.
    pub fn reliable(&self) -> bool {
        self.min_confidence() >= SAME_CONFIDENCE_THRESHOLD
    }

    pub fn header(&self) -> std::result::Result<SameHeader, HeaderError> {
        self.text().parse()
    }
}

fn chunk_count(length: u8) -> usize {
    (length as usize).div_ceil(SAME_CHUNK)
}

/// Chunk reads covering `length` buffered characters.
fn chunk_transaction(length: u8) -> Transaction {
    let mut txn = Transaction::new("same-chunks");
    for offset in (0..length).step_by(SAME_CHUNK) {
        txn.push_command(&Command::SameStatus {
            ack: Ack::Check,
            read_address: offset,
        });
    }
    txn
}

fn wants_chunks(header: &SameStatus) -> bool {
    header.header_ready() && header.length >= SAME_MIN_LENGTH
}

/// Read the SAME status and, when a header is ready, assemble it.
///
/// The header read and the chunk reads it sizes run as one chained job, so
/// a flush queued meanwhile lands after the last chunk. `ack` applies to
/// the header read only.
pub fn read_message(
    session: &ChipSession,
    ack: Ack,
) -> impl Future<Output = Result<SameReport>> + Send + 'static {
    let header_read = Transaction::command(&Command::SameStatus {
        ack,
        read_address: 0,
    });
    let pending = session.submit_then(header_read, |raw| {
        let header = SameStatus::decode(raw)?;
        Ok(wants_chunks(&header).then(|| chunk_transaction(header.length)))
    });
    async move {
        let (raw_header, raw_chunks) = pending.await?;
        let header = SameStatus::decode(&raw_header)?;
        let mut report = SameReport::from_header(&header);

        if !header.header_ready() {
            debug!(flags = header.flags, "No SAME header ready");
            return Ok(report);
        }
        if !wants_chunks(&header) {
            debug!(length = header.length, "SAME header too short");
            return Ok(report);
        }

        let mut buffer = AlertMessageBuffer::with_length(header.length);
        for chunk in raw_chunks.chunks(SameStatus::LEN) {
            buffer.push(&SameStatus::decode(chunk)?);
        }
        let message = buffer.finish(header.length);
        debug!(
            length = header.length,
            min_confidence = message.min_confidence(),
            text = %message.text(),
            "SAME header assembled"
        );
        report.message = Some(message);
        Ok(report)
    }
}

/// Tracks SAME activity so a stale buffer gets flushed.
#[derive(Debug, Default)]
pub struct InactivityTimer {
    deadline: Option<Instant>,
}

impl InactivityTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity, pushing the deadline out.
    pub fn touch(&mut self) {
        self.deadline = Some(Instant::now() + SAME_INACTIVITY);
    }

    /// Stop tracking, e.g. after a flush.
    pub fn clear(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Wait for the deadline; pending forever while disarmed.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("no ZCZC preamble")]
    MissingPreamble,

    #[error("malformed {0} field")]
    Malformed(&'static str),

    #[error("{0} location codes, at most 31 allowed")]
    TooManyLocations(usize),
}

/// When a message was issued, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueTime {
    pub day_of_year: u16,
    pub hour: u8,
    pub minute: u8,
}

/// A parsed `ZCZC-ORG-EEE-PSSCCC-...+TTTT-JJJHHMM-LLLLLLLL-` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SameHeader {
    /// Originator, e.g. `WXR` for the National Weather Service.
    pub originator: String,
    /// Event code, e.g. `TOR`.
    pub event: String,
    /// `PSSCCC` location codes.
    pub locations: Vec<String>,
    pub purge: Duration,
    pub issued: IssueTime,
    /// Sending station, e.g. `KDMX/NWS`.
    pub sender: String,
}

fn digits(field: &'static str, s: &str, len: usize) -> std::result::Result<u32, HeaderError> {
    if s.len() != len || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HeaderError::Malformed(field));
    }
    s.parse().map_err(|_| HeaderError::Malformed(field))
}

fn code(field: &'static str, s: &str) -> std::result::Result<String, HeaderError> {
    if s.len() == 3 && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(s.to_string())
    } else {
        Err(HeaderError::Malformed(field))
    }
}

impl FromStr for SameHeader {
    type Err = HeaderError;

    fn from_str(text: &str) -> std::result::Result<Self, Self::Err> {
        let start = text.find("ZCZC-").ok_or(HeaderError::MissingPreamble)?;
        let body = &text[start + 5..];
        let (head, tail) = body.split_once('+').ok_or(HeaderError::Malformed("purge"))?;

        let mut fields = head.trim_end_matches('-').split('-');
        let originator = code("originator", fields.next().unwrap_or(""))?;
        let event = code("event", fields.next().unwrap_or(""))?;
        let locations: Vec<String> = fields
            .map(|loc| digits("location", loc, 6).map(|_| loc.to_string()))
            .collect::<std::result::Result<_, _>>()?;
        if locations.is_empty() {
            return Err(HeaderError::Malformed("location"));
        }
        if locations.len() > SAME_MAX_LOCATIONS {
            return Err(HeaderError::TooManyLocations(locations.len()));
        }

        let mut fields = tail.splitn(3, '-');
        let purge = fields.next().unwrap_or("");
        let purge_hhmm = digits("purge", purge, 4)?;
        let (hours, minutes) = (purge_hhmm / 100, purge_hhmm % 100);
        if minutes >= 60 {
            return Err(HeaderError::Malformed("purge"));
        }

        let issued = fields.next().unwrap_or("");
        digits("issue time", issued, 7)?;
        let day_of_year = digits("issue time", &issued[..3], 3)? as u16;
        let hour = digits("issue time", &issued[3..5], 2)? as u8;
        let minute = digits("issue time", &issued[5..], 2)? as u8;
        if !(1..=366).contains(&day_of_year) || hour > 23 || minute > 59 {
            return Err(HeaderError::Malformed("issue time"));
        }

        let sender = fields
            .next()
            .unwrap_or("")
            .trim_end_matches(|c: char| c == '-' || c == '\0' || c.is_whitespace());
        if sender.is_empty() || sender.len() > 8 {
            return Err(HeaderError::Malformed("sender"));
        }

        Ok(Self {
            originator,
            event,
            locations,
            purge: Duration::from_secs(hours as u64 * 3600 + minutes as u64 * 60),
            issued: IssueTime {
                day_of_year,
                hour,
                minute,
            },
            sender: sender.to_string(),
        })
    }
}

impl fmt::Display for SameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let purge_minutes = self.purge.as_secs() / 60;
        write!(
            f,
            "ZCZC-{}-{}-{}+{:02}{:02}-{:03}{:02}{:02}-{}-",
            self.originator,
            self.event,
            self.locations.join("-"),
            purge_minutes / 60,
            purge_minutes % 60,
            self.issued.day_of_year,
            self.issued.hour,
            self.issued.minute,
            self.sender
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::SmbusDevice;
    use crate::si4707::protocol::{opcode, same};
    use crate::si4707::session::PowerState;
    use crate::transport::sim::SimulatedChip;

    const HEADER: &[u8] = b"ZCZC-WXR-TOR-019153-019169+0030-1051700-KDMX/NWS-";

    async fn powered_session() -> (SimulatedChip, ChipSession) {
        let chip = SimulatedChip::new(0x11);
        let (session, _worker) = ChipSession::spawn(SmbusDevice::new(chip.clone(), 0x11));
        let txn = Transaction::command(&Command::PowerUp {
            mode: crate::si4707::protocol::PowerUpMode::Normal,
        });
        session.transition(PowerState::On, txn).await.unwrap();
        chip.clear_events();
        (chip, session)
    }

    fn header_chunk(flags: u8, length: u8) -> Vec<u8> {
        let mut raw = vec![0u8; SameStatus::LEN];
        raw[0] = 0x84;
        raw[1] = flags;
        raw[3] = length;
        raw
    }

    fn same_reads(chip: &SimulatedChip) -> Vec<Vec<u8>> {
        chip.writes()
            .into_iter()
            .filter(|f| f[0] == opcode::WB_SAME_STATUS)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_header_issues_no_chunk_reads() {
        let (chip, session) = powered_session().await;
        chip.script_response(opcode::WB_SAME_STATUS, header_chunk(same::HDRRDY, 35));

        let report = read_message(&session, Ack::IntAck).await.unwrap();
        assert!(report.header_ready());
        assert_eq!(report.length, 35);
        assert!(report.message.is_none());
        assert_eq!(same_reads(&chip), vec![vec![opcode::WB_SAME_STATUS, 0x01, 0x00]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_header_ready_yields_no_message() {
        let (chip, session) = powered_session().await;
        chip.script_response(opcode::WB_SAME_STATUS, header_chunk(same::EOMDET, 60));

        let report = read_message(&session, Ack::IntAck).await.unwrap();
        assert!(report.end_of_message());
        assert!(report.message.is_none());
        assert_eq!(same_reads(&chip).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_reads_cover_declared_length() {
        let (chip, session) = powered_session().await;
        chip.receive_same(HEADER, 3);

        let report = read_message(&session, Ack::IntAck).await.unwrap();
        let length = HEADER.len();
        let chunks = length.div_ceil(8);

        let reads = same_reads(&chip);
        assert_eq!(reads.len(), 1 + chunks);
        for (i, frame) in reads[1..].iter().enumerate() {
            assert_eq!(frame, &vec![opcode::WB_SAME_STATUS, 0x00, (i * 8) as u8]);
        }

        let message = report.message.unwrap();
        assert_eq!(message.length, length);
        assert_eq!(message.payload.len(), chunks * 8);
        assert_eq!(message.confidence.len(), chunks * 8);
        assert!(message.payload.len() >= length);
        assert_eq!(message.text().as_bytes(), HEADER);
        assert!(message.reliable());

        let header = message.header().unwrap();
        assert_eq!(header.event, "TOR");
        assert_eq!(header.locations, vec!["019153", "019169"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_queued_during_read_waits_for_chunks() {
        let (chip, session) = powered_session().await;
        chip.receive_same(HEADER, 3);

        let read = read_message(&session, Ack::IntAck);
        let flush = session.same_flush();
        let report = read.await.unwrap();
        flush.await.unwrap();

        let message = report.message.unwrap();
        assert_eq!(message.text().as_bytes(), HEADER);
        assert!(message.reliable());

        // Header read, every chunk, then the flush.
        let chunks = HEADER.len().div_ceil(8);
        let frames = chip.writes();
        assert_eq!(frames.len(), 1 + chunks + 1);
        assert!(frames[..=chunks].iter().all(|f| f[0] == opcode::WB_SAME_STATUS));
        assert_eq!(frames[chunks + 1], vec![opcode::WB_SAME_STATUS, 0x03, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_ascii_payload_is_kept() {
        let (chip, session) = powered_session().await;
        let mut garbled = HEADER.to_vec();
        garbled[9] = 0xD4;
        chip.receive_same(&garbled, 0);

        let message = read_message(&session, Ack::IntAck).await.unwrap().message.unwrap();
        assert_eq!(message.payload[9], 0xD4);
        assert_eq!(message.text().chars().nth(9), Some(char::REPLACEMENT_CHARACTER));
        assert!(!message.reliable());
        assert!(message.header().is_err());
    }

    #[test]
    fn test_header_parse() {
        let header: SameHeader = "ZCZC-WXR-SVR-019153-019169-019181+0100-3650215-KDMX/NWS-"
            .parse()
            .unwrap();
        assert_eq!(header.originator, "WXR");
        assert_eq!(header.event, "SVR");
        assert_eq!(header.locations.len(), 3);
        assert_eq!(header.purge, Duration::from_secs(3600));
        assert_eq!(
            header.issued,
            IssueTime {
                day_of_year: 365,
                hour: 2,
                minute: 15
            }
        );
        assert_eq!(header.sender, "KDMX/NWS");
        assert_eq!(
            header.to_string(),
            "ZCZC-WXR-SVR-019153-019169-019181+0100-3650215-KDMX/NWS-"
        );
    }

    #[test]
    fn test_header_parse_rejects_garbage() {
        assert_eq!(
            "NNNN".parse::<SameHeader>().unwrap_err(),
            HeaderError::MissingPreamble
        );
        assert_eq!(
            "ZCZC-WXR-TOR-0191+0030-1051700-KDMX/NWS-".parse::<SameHeader>().unwrap_err(),
            HeaderError::Malformed("location")
        );
        assert_eq!(
            "ZCZC-WXR-TOR-019153+0030-9991700-KDMX/NWS-".parse::<SameHeader>().unwrap_err(),
            HeaderError::Malformed("issue time")
        );

        let many = vec!["019153"; 32].join("-");
        let text = format!("ZCZC-WXR-TOR-{many}+0030-1051700-KDMX/NWS-");
        assert_eq!(
            text.parse::<SameHeader>().unwrap_err(),
            HeaderError::TooManyLocations(32)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_timer() {
        let mut timer = InactivityTimer::new();
        assert!(timer.deadline().is_none());

        let start = Instant::now();
        timer.touch();
        timer.expired().await;
        assert!(start.elapsed() >= SAME_INACTIVITY);

        timer.clear();
        let quiet = tokio::time::timeout(Duration::from_secs(60), timer.expired()).await;
        assert!(quiet.is_err());
    }
}
