//! Loading of driver configuration from TOML files
//!
//! A device configuration describes one MCP2515 attached to a board. Example:
//!
//! ```toml
//! # Frequency of the crystal attached to the chip
//! oscillator_frequency = 8_000_000
//! # Optional, defaults to 1000
//! mode_timeout_ms = 1000
//!
//! [bit_timing]
//! brp = 1
//! prop_seg = 2
//! phase_seg1 = 3
//! phase_seg2 = 2
//! sjw = 1
//!
//! # Optional, all flags default to false
//! [mode]
//! loopback = false
//! listen_only = false
//! triple_sampling = false
//! one_shot = true
//! ```
use std::{path::Path, time::Duration};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use crate::{
    bit_timing::{BitTiming, BitTimingError},
    config::{DriverConfig, DEFAULT_MODE_TIMEOUT, DEFAULT_QUIESCE_TIMEOUT},
    mode::ControlMode,
};

/// Error returned when loading a device configuration
#[derive(Debug, Snafu)]
pub enum LoadError {
    /// The configuration file could not be read
    #[snafu(display("Failed to read device config: {source}"))]
    Io {
        /// The underlying IO error
        source: std::io::Error,
    },
    /// The configuration is not valid TOML, or does not match the expected structure
    #[snafu(display("Failed to parse device config: {source}"))]
    Parse {
        /// The underlying parse error
        source: toml::de::Error,
    },
    /// The configured bit timing is outside the limits of the chip
    #[snafu(display("Invalid bit timing in device config: {source}"))]
    InvalidBitTiming {
        /// The failed limit
        source: BitTimingError,
    },
}

fn default_mode_timeout_ms() -> u64 {
    DEFAULT_MODE_TIMEOUT.as_millis() as u64
}

fn default_quiesce_timeout_ms() -> u64 {
    DEFAULT_QUIESCE_TIMEOUT.as_millis() as u64
}

/// Operating mode flags as they appear in the `[mode]` table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    /// Enable internal loopback
    #[serde(default)]
    pub loopback: bool,
    /// Enable listen only mode
    #[serde(default)]
    pub listen_only: bool,
    /// Sample each bit three times
    #[serde(default)]
    pub triple_sampling: bool,
    /// Do not retransmit failed frames
    #[serde(default)]
    pub one_shot: bool,
}

impl From<ModeConfig> for ControlMode {
    fn from(value: ModeConfig) -> Self {
        let mut mode = ControlMode::empty();
        mode.set(ControlMode::LOOPBACK, value.loopback);
        mode.set(ControlMode::LISTEN_ONLY, value.listen_only);
        mode.set(ControlMode::TRIPLE_SAMPLING, value.triple_sampling);
        mode.set(ControlMode::ONE_SHOT, value.one_shot);
        mode
    }
}

/// The contents of a device configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Frequency of the oscillator attached to the chip, in Hz
    pub oscillator_frequency: u32,
    /// Bit timing parameters
    pub bit_timing: BitTiming,
    /// Operating mode flags
    #[serde(default)]
    pub mode: ModeConfig,
    /// Timeout for entering the requested operating mode, in milliseconds
    #[serde(default = "default_mode_timeout_ms")]
    pub mode_timeout_ms: u64,
    /// Timeout for the transaction chain to finish during shutdown, in milliseconds
    #[serde(default = "default_quiesce_timeout_ms")]
    pub quiesce_timeout_ms: u64,
}

impl DeviceConfig {
    /// Parse a device configuration from a TOML string
    pub fn load_from_str(config: &str) -> Result<Self, LoadError> {
        toml::from_str(config).context(ParseSnafu)
    }

    /// Read and parse a device configuration file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let config = std::fs::read_to_string(path).context(IoSnafu)?;
        Self::load_from_str(&config)
    }

    /// Convert to a [`DriverConfig`], checking the bit timing
    pub fn driver_config(&self) -> Result<DriverConfig, LoadError> {
        self.bit_timing.validate().context(InvalidBitTimingSnafu)?;
        Ok(DriverConfig {
            oscillator_frequency: self.oscillator_frequency,
            bit_timing: self.bit_timing,
            ctrl_mode: self.mode.into(),
            mode_timeout: Duration::from_millis(self.mode_timeout_ms),
            quiesce_timeout: Duration::from_millis(self.quiesce_timeout_ms),
        })
    }
}
