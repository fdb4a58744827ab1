//! Silicon Labs Si4707 weather-band receiver.
//!
//! - [`protocol`]: command encoding and response decoding, no I/O
//! - [`session`]: the serialized path every bus transaction takes
//! - [`sequencer`]: power-up, patch upload and configuration
//! - [`same`]: SAME alert header assembly and parsing

pub mod error;
pub mod patch;
pub mod protocol;
pub mod same;
pub mod sequencer;
pub mod session;

pub use error::{ProtocolError, RadioError, Result};
pub use protocol::{Ack, AsqStatus, InterruptStatus, Revision, RsqStatus, TuneStatus, WbChannel};
pub use same::{AlertMessage, SameHeader, SameReport};
pub use session::{ChipSession, PowerState};
