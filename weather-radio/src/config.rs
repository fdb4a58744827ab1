//! Configuration for the receiver daemon.
//!
//! Parses environment variables. Malformed values are logged and replaced
//! by their defaults; only a missing device identifier is fatal.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::si4707::WbChannel;
use crate::tracing::prelude::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no device serial: set WXRADIO_SERIAL or run on a Raspberry Pi")]
    MissingSerial,

    #[error("built without the `rpi` feature; set WXRADIO_SIMULATE to use the simulated chip")]
    NoHardwareBackend,
}

/// Where the chip sits on the I2C bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Linux I2C bus number (`/dev/i2c-N`).
    pub bus: u8,
    pub address: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus: 1,
            address: 0x11,
        }
    }
}

impl BusConfig {
    /// # Environment Variables
    ///
    /// - `WXRADIO_I2C_BUS`: bus number (default: 1)
    /// - `WXRADIO_I2C_ADDRESS`: 7-bit address, hex `0x..` or decimal (default: 0x11)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bus: env_or("WXRADIO_I2C_BUS", default.bus),
            address: env_with("WXRADIO_I2C_ADDRESS", default.address, parse_address),
        }
    }
}

/// BCM GPIO numbers the receiver board is wired to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinConfig {
    pub reset: u8,
    pub interrupt: u8,
    pub relays: Vec<u8>,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            reset: 17,
            interrupt: 23,
            relays: vec![13, 19],
        }
    }
}

impl PinConfig {
    /// # Environment Variables
    ///
    /// - `WXRADIO_RESET_PIN` (default: 17)
    /// - `WXRADIO_INTERRUPT_PIN` (default: 23)
    /// - `WXRADIO_RELAY_PINS`: comma-separated (default: 13,19)
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            reset: env_or("WXRADIO_RESET_PIN", default.reset),
            interrupt: env_or("WXRADIO_INTERRUPT_PIN", default.interrupt),
            relays: env_with("WXRADIO_RELAY_PINS", default.relays, |s| {
                s.split(',')
                    .filter(|p| !p.trim().is_empty())
                    .map(|p| p.trim().parse().ok())
                    .collect()
            }),
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// Run against the simulated chip instead of hardware.
    pub simulate: bool,
    pub bus: BusConfig,
    pub pins: PinConfig,
    pub channel: WbChannel,
    /// Upload the firmware patch at power-up.
    pub patch: bool,
    pub poll_interval: Duration,
    /// Device identifier used in topic names.
    pub serial: String,
}

impl RadioConfig {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `WXRADIO_SIMULATE`: presence selects the simulated chip
    /// - `WXRADIO_CHANNEL`: MHz, one of 162.400..162.550 (default: 162.550)
    /// - `WXRADIO_PATCH`: `0`, `false` or `off` skips the patch (default: on)
    /// - `WXRADIO_POLL_SECS`: status poll period (default: 60)
    /// - `WXRADIO_SERIAL`: device identifier (default: `/proc/cpuinfo` serial)
    ///
    /// plus those read by [`BusConfig::from_env`] and [`PinConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let simulate = std::env::var_os("WXRADIO_SIMULATE").is_some();

        let channel = env_with("WXRADIO_CHANNEL", WbChannel::default(), WbChannel::from_mhz);
        let patch = env_with("WXRADIO_PATCH", true, |s| match s.to_ascii_lowercase().as_str() {
            "0" | "false" | "off" | "no" => Some(false),
            "1" | "true" | "on" | "yes" => Some(true),
            _ => None,
        });
        let poll_secs: u64 = env_or("WXRADIO_POLL_SECS", 60).max(1);

        let serial = match std::env::var("WXRADIO_SERIAL") {
            Ok(serial) if !serial.trim().is_empty() => serial.trim().to_string(),
            _ => match std::fs::read_to_string("/proc/cpuinfo")
                .ok()
                .and_then(|text| serial_from_cpuinfo(&text))
            {
                Some(serial) => serial,
                None if simulate => "simulated".to_string(),
                None => return Err(ConfigError::MissingSerial),
            },
        };

        Ok(Self {
            simulate,
            bus: BusConfig::from_env(),
            pins: PinConfig::from_env(),
            channel,
            patch,
            poll_interval: Duration::from_secs(poll_secs),
            serial,
        })
    }
}

/// The `Serial` line of `/proc/cpuinfo`, as found on a Raspberry Pi.
pub fn serial_from_cpuinfo(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim() == "Serial"
            && !value.is_empty()
            && value.bytes().all(|b| b.is_ascii_hexdigit()))
        .then(|| value.to_string())
    })
}

fn parse_address(s: &str) -> Option<u8> {
    let address = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok()?,
        None => s.parse().ok()?,
    };
    (address < 0x80).then_some(address)
}

fn env_or<T: FromStr + std::fmt::Debug>(name: &str, default: T) -> T {
    env_with(name, default, |s| s.parse().ok())
}

fn env_with<T: std::fmt::Debug>(name: &str, default: T, parse: impl FnOnce(&str) -> Option<T>) -> T {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match parse(raw.trim()) {
        Some(value) => value,
        None => {
            warn!(var = name, value = %raw, ?default, "Invalid value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "WXRADIO_SIMULATE",
        "WXRADIO_I2C_BUS",
        "WXRADIO_I2C_ADDRESS",
        "WXRADIO_RESET_PIN",
        "WXRADIO_INTERRUPT_PIN",
        "WXRADIO_RELAY_PINS",
        "WXRADIO_CHANNEL",
        "WXRADIO_PATCH",
        "WXRADIO_POLL_SECS",
        "WXRADIO_SERIAL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        std::env::set_var("WXRADIO_SERIAL", "0000000012345678");

        let config = RadioConfig::from_env().unwrap();
        assert!(!config.simulate);
        assert_eq!(config.bus, BusConfig { bus: 1, address: 0x11 });
        assert_eq!(config.pins, PinConfig::default());
        assert_eq!(config.channel, WbChannel::MAX);
        assert!(config.patch);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.serial, "0000000012345678");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        std::env::set_var("WXRADIO_SIMULATE", "1");
        std::env::set_var("WXRADIO_I2C_ADDRESS", "0x63");
        std::env::set_var("WXRADIO_RELAY_PINS", "5, 6,26");
        std::env::set_var("WXRADIO_CHANNEL", "162.425");
        std::env::set_var("WXRADIO_PATCH", "off");
        std::env::set_var("WXRADIO_POLL_SECS", "15");
        std::env::set_var("WXRADIO_SERIAL", "abc");

        let config = RadioConfig::from_env().unwrap();
        assert!(config.simulate);
        assert_eq!(config.bus.address, 0x63);
        assert_eq!(config.pins.relays, vec![5, 6, 26]);
        assert_eq!(config.channel.code(), 0xFDCA);
        assert!(!config.patch);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("WXRADIO_SERIAL", "abc");
        std::env::set_var("WXRADIO_I2C_ADDRESS", "0x80");
        std::env::set_var("WXRADIO_CHANNEL", "146.520");
        std::env::set_var("WXRADIO_RELAY_PINS", "13,x");
        std::env::set_var("WXRADIO_POLL_SECS", "soon");

        let config = RadioConfig::from_env().unwrap();
        assert_eq!(config.bus.address, 0x11);
        assert_eq!(config.channel, WbChannel::MAX);
        assert_eq!(config.pins.relays, vec![13, 19]);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_simulation_does_not_need_serial() {
        clear_env();
        std::env::set_var("WXRADIO_SIMULATE", "");
        let config = RadioConfig::from_env().unwrap();
        assert!(!config.serial.is_empty());
        clear_env();
    }

    #[test]
    fn test_serial_from_cpuinfo() {
        let cpuinfo = "processor\t: 0\nHardware\t: BCM2835\nRevision\t: a02082\nSerial\t\t: 00000000f00dbeef\nModel\t\t: Raspberry Pi 3\n";
        assert_eq!(serial_from_cpuinfo(cpuinfo), Some("00000000f00dbeef".to_string()));
        assert_eq!(serial_from_cpuinfo("processor\t: 0\n"), None);
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x11"), Some(0x11));
        assert_eq!(parse_address("17"), Some(17));
        assert_eq!(parse_address("0x80"), None);
        assert_eq!(parse_address("eleven"), None);
    }
}
