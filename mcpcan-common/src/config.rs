//! Driver configuration
use core::time::Duration;

use crate::{bit_timing::BitTiming, mode::ControlMode};

/// How long to wait for the chip to report a requested operating mode
pub const DEFAULT_MODE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long interface shutdown waits for an active transaction chain to finish
pub const DEFAULT_QUIESCE_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for one MCP2515 instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Frequency of the oscillator attached to the chip, in Hz
    pub oscillator_frequency: u32,
    /// Bit timing parameters written on every start
    pub bit_timing: BitTiming,
    /// Operating mode flags applied on every start
    pub ctrl_mode: ControlMode,
    /// Maximum time to wait for the chip to enter the requested operating mode
    pub mode_timeout: Duration,
    /// Maximum time to wait for a running transaction chain to finish during shutdown
    pub quiesce_timeout: Duration,
}

impl DriverConfig {
    /// Create a new configuration with default timeouts and no control mode flags
    pub const fn new(oscillator_frequency: u32, bit_timing: BitTiming) -> Self {
        Self {
            oscillator_frequency,
            bit_timing,
            ctrl_mode: ControlMode::empty(),
            mode_timeout: DEFAULT_MODE_TIMEOUT,
            quiesce_timeout: DEFAULT_QUIESCE_TIMEOUT,
        }
    }

    /// Set the control mode flags
    pub const fn with_ctrl_mode(mut self, ctrl_mode: ControlMode) -> Self {
        self.ctrl_mode = ctrl_mode;
        self
    }

    /// Clock of the CAN protocol engine: the chip divides its oscillator by two
    pub const fn can_clock(&self) -> u32 {
        self.oscillator_frequency / 2
    }

    /// The nominal bitrate resulting from the bit timing parameters, in bit/s
    pub fn bitrate(&self) -> u32 {
        let divisor = self.bit_timing.brp as u32 * self.bit_timing.quanta_per_bit();
        if divisor == 0 {
            0
        } else {
            self.can_clock() / divisor
        }
    }
}
