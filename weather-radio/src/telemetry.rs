//! Telemetry records and control messages.
//!
//! Decoded chip status is published as plain-text values under
//! `weather_radio/<serial>/<key>`. A SAME header goes out as
//! `same_message` and `same_reliable`, plus `same_event` when it parses.
//! Control arrives on `weather_radio/<serial>/mute_control` and
//! `.../volume_control`. The transport carrying them is behind
//! [`MessageBus`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::si4707::{RsqStatus, SameHeader, TuneStatus};
use crate::tracing::prelude::*;

pub const TOPIC_ROOT: &str = "weather_radio";

/// One decoded status update.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Tune(TuneStatus),
    SignalQuality(RsqStatus),
    Mute(bool),
    Volume(u16),
    AlertTone(bool),
    Same {
        text: String,
        reliable: bool,
        header: Option<SameHeader>,
    },
}

fn on_off(value: bool) -> String {
    if value { "ON" } else { "OFF" }.to_string()
}

impl Telemetry {
    /// Key/value pairs this update publishes.
    pub fn records(&self) -> Vec<(&'static str, String)> {
        match self {
            Telemetry::Tune(status) => vec![
                ("rssi", status.rssi.to_string()),
                ("snr", status.snr.to_string()),
                ("frequency", status.frequency.to_string()),
                ("channel", status.channel.to_string()),
            ],
            Telemetry::SignalQuality(status) => vec![
                ("rssi", status.rssi.to_string()),
                ("snr", status.snr.to_string()),
                ("frequency_offset", status.frequency_offset.to_string()),
            ],
            Telemetry::Mute(muted) => vec![("mute_status", on_off(*muted))],
            Telemetry::Volume(volume) => vec![("volume_status", volume.to_string())],
            Telemetry::AlertTone(on) => vec![("alert_tone", on_off(*on))],
            Telemetry::Same {
                text,
                reliable,
                header,
            } => {
                let mut records = vec![
                    ("same_message", text.clone()),
                    ("same_reliable", reliable.to_string()),
                ];
                if let Some(header) = header {
                    records.push(("same_event", header.event.clone()));
                }
                records
            }
        }
    }
}

/// Topic names for one receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    serial: String,
}

impl Topics {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn topic(&self, key: &str) -> String {
        format!("{}/{}/{}", TOPIC_ROOT, self.serial, key)
    }

    pub fn mute_control(&self) -> String {
        self.topic("mute_control")
    }

    pub fn volume_control(&self) -> String {
        self.topic("volume_control")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChange {
    Increase,
    Decrease,
    Set(i32),
}

/// A control message.
///
/// Unrecognized payloads on a control topic carry `None`; the status is
/// still re-read and published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Mute(Option<bool>),
    Volume(Option<VolumeChange>),
}

impl Control {
    /// Interpret a message; `None` if the topic is not one of ours.
    pub fn parse(topics: &Topics, topic: &str, payload: &[u8]) -> Option<Self> {
        let payload = std::str::from_utf8(payload).unwrap_or("").trim();
        if topic == topics.mute_control() {
            Some(Control::Mute(match payload {
                "ON" => Some(true),
                "OFF" => Some(false),
                _ => None,
            }))
        } else if topic == topics.volume_control() {
            Some(Control::Volume(match payload {
                "INCREASE" => Some(VolumeChange::Increase),
                "DECREASE" => Some(VolumeChange::Decrease),
                other => other.parse().ok().map(VolumeChange::Set),
            }))
        } else {
            None
        }
    }
}

/// Split a `topic payload` line.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((topic, payload)) => Some((topic, payload.trim())),
        None if !line.is_empty() => Some((line, "")),
        None => None,
    }
}

/// Publish side of the message bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

/// Writes every publication to the log.
pub struct LogBus;

#[async_trait]
impl MessageBus for LogBus {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        info!(topic, payload, "publish");
        Ok(())
    }
}

/// Publishes telemetry for one receiver.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn MessageBus>,
    topics: Topics,
}

impl Publisher {
    pub fn new(bus: Arc<dyn MessageBus>, topics: Topics) -> Self {
        Self { bus, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Publish every record of `update`. A failed publication is logged and
    /// skipped.
    pub async fn publish(&self, update: &Telemetry) {
        for (key, value) in update.records() {
            let topic = self.topics.topic(key);
            if let Err(e) = self.bus.publish(&topic, &value).await {
                warn!(topic = %topic, error = %e, "Publish failed");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::Error;

    /// Keeps every publication.
    #[derive(Default)]
    pub(crate) struct RecordingBus {
        pub(crate) published: Mutex<Vec<(String, String)>>,
    }

    impl RecordingBus {
        pub(crate) fn take(&self) -> Vec<(String, String)> {
            std::mem::take(&mut *self.published.lock().unwrap())
        }
    }

    #[async_trait]
    impl MessageBus for RecordingBus {
        async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_tune_records() {
        let status = TuneStatus {
            valid: true,
            afc_railed: false,
            channel: 0xFDFC,
            frequency: 162_550_000,
            rssi: -80,
            snr: 12,
        };
        assert_eq!(
            Telemetry::Tune(status).records(),
            vec![
                ("rssi", "-80".to_string()),
                ("snr", "12".to_string()),
                ("frequency", "162550000".to_string()),
                ("channel", "65020".to_string()),
            ]
        );
    }

    #[test]
    fn test_same_records() {
        let text = "ZCZC-WXR-TOR-019153+0030-1051700-KDMX/NWS-";
        let same = Telemetry::Same {
            text: text.to_string(),
            reliable: true,
            header: text.parse().ok(),
        };
        assert_eq!(
            same.records(),
            vec![
                ("same_message", text.to_string()),
                ("same_reliable", "true".to_string()),
                ("same_event", "TOR".to_string()),
            ]
        );

        let garbled = Telemetry::Same {
            text: "ZCZC-W?R".to_string(),
            reliable: false,
            header: None,
        };
        assert_eq!(
            garbled.records(),
            vec![
                ("same_message", "ZCZC-W?R".to_string()),
                ("same_reliable", "false".to_string()),
            ]
        );
    }

    /// Rejects the first publication, then records like [`RecordingBus`].
    #[derive(Default)]
    struct FlakyBus {
        failed: Mutex<bool>,
        inner: RecordingBus,
    }

    #[async_trait]
    impl MessageBus for FlakyBus {
        async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
            let first = !std::mem::replace(&mut *self.failed.lock().unwrap(), true);
            if first {
                return Err(Error::Bus("broker unavailable".into()));
            }
            self.inner.publish(topic, payload).await
        }
    }

    #[tokio::test]
    async fn test_failed_record_does_not_stop_the_rest() {
        let bus = Arc::new(FlakyBus::default());
        let publisher = Publisher::new(bus.clone(), Topics::new("abc"));
        publisher
            .publish(&Telemetry::Same {
                text: "NNNN".to_string(),
                reliable: true,
                header: None,
            })
            .await;
        assert_eq!(
            bus.inner.take(),
            vec![("weather_radio/abc/same_reliable".to_string(), "true".to_string())]
        );
    }

    #[test]
    fn test_control_parse() {
        let topics = Topics::new("00000000abcdef01");
        let mute = "weather_radio/00000000abcdef01/mute_control";
        let volume = "weather_radio/00000000abcdef01/volume_control";

        assert_eq!(Control::parse(&topics, mute, b"ON"), Some(Control::Mute(Some(true))));
        assert_eq!(Control::parse(&topics, mute, b"OFF"), Some(Control::Mute(Some(false))));
        assert_eq!(Control::parse(&topics, mute, b"maybe"), Some(Control::Mute(None)));
        assert_eq!(
            Control::parse(&topics, volume, b"INCREASE"),
            Some(Control::Volume(Some(VolumeChange::Increase)))
        );
        assert_eq!(
            Control::parse(&topics, volume, b"-4"),
            Some(Control::Volume(Some(VolumeChange::Set(-4))))
        );
        assert_eq!(Control::parse(&topics, volume, b"loud"), Some(Control::Volume(None)));
        assert_eq!(
            Control::parse(&topics, "weather_radio/other/mute_control", b"ON"),
            None
        );
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("weather_radio/x/volume_control  12\n"),
            Some(("weather_radio/x/volume_control", "12"))
        );
        assert_eq!(parse_line("topic"), Some(("topic", "")));
        assert_eq!(parse_line("   "), None);
    }

    #[tokio::test]
    async fn test_publisher_prefixes_topics() {
        let bus = Arc::new(RecordingBus::default());
        let publisher = Publisher::new(bus.clone(), Topics::new("abc"));
        publisher.publish(&Telemetry::Mute(true)).await;
        publisher.publish(&Telemetry::Volume(17)).await;
        assert_eq!(
            bus.take(),
            vec![
                ("weather_radio/abc/mute_status".to_string(), "ON".to_string()),
                ("weather_radio/abc/volume_status".to_string(), "17".to_string()),
            ]
        );
    }
}
