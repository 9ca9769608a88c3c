//! Operating modes and controller state

use crate::constants::canctrl;

/// Operating modes of the chip, as encoded in the REQOP bits of CANCTRL and the OPMOD bits of
/// CANSTAT
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OperatingMode {
    /// Normal operation
    Normal = 0x00,
    /// Sleep
    Sleep = 0x20,
    /// Internal loopback: transmitted frames are received back and nothing reaches the bus
    Loopback = 0x40,
    /// Receive only, no acknowledgement or error frames are sent
    ListenOnly = 0x60,
    /// Configuration mode, the only mode in which bit timing may be changed
    Configuration = 0x80,
}

impl OperatingMode {
    /// Extract the operating mode from a CANSTAT or CANCTRL register value
    pub fn from_register(value: u8) -> Result<Self, InvalidOperatingModeError> {
        Self::try_from(value & canctrl::REQOP_MASK)
    }
}

impl core::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OperatingMode::Normal => write!(f, "Normal"),
            OperatingMode::Sleep => write!(f, "Sleep"),
            OperatingMode::Loopback => write!(f, "Loopback"),
            OperatingMode::ListenOnly => write!(f, "ListenOnly"),
            OperatingMode::Configuration => write!(f, "Configuration"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// An error for [`OperatingMode::try_from()`]
pub struct InvalidOperatingModeError(pub u8);

impl TryFrom<u8> for OperatingMode {
    type Error = InvalidOperatingModeError;

    /// Attempt to convert REQOP/OPMOD bits to an OperatingMode
    ///
    /// Fails if value is not a valid mode, including when any bit outside the mode field is set
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use OperatingMode::*;
        match value {
            x if x == Normal as u8 => Ok(Normal),
            x if x == Sleep as u8 => Ok(Sleep),
            x if x == Loopback as u8 => Ok(Loopback),
            x if x == ListenOnly as u8 => Ok(ListenOnly),
            x if x == Configuration as u8 => Ok(Configuration),
            _ => Err(InvalidOperatingModeError(value)),
        }
    }
}

bitflags::bitflags! {
    /// Optional controller behaviours selected when the interface is brought up
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlMode: u8 {
        /// Internal loopback mode
        const LOOPBACK = 1 << 0;
        /// Listen only mode
        const LISTEN_ONLY = 1 << 1;
        /// Sample each bit three times
        const TRIPLE_SAMPLING = 1 << 2;
        /// Do not retransmit a frame which failed arbitration or errored
        const ONE_SHOT = 1 << 3;
    }
}

impl ControlMode {
    /// The operating mode requested for these flags
    ///
    /// Loopback takes precedence over listen only.
    pub fn operating_mode(&self) -> OperatingMode {
        if self.contains(ControlMode::LOOPBACK) {
            OperatingMode::Loopback
        } else if self.contains(ControlMode::LISTEN_ONLY) {
            OperatingMode::ListenOnly
        } else {
            OperatingMode::Normal
        }
    }

    /// The value written to CANCTRL to enter the requested mode
    pub fn canctrl(&self) -> u8 {
        let mut value = self.operating_mode() as u8;
        if self.contains(ControlMode::ONE_SHOT) {
            value |= canctrl::OSM;
        }
        value
    }
}

impl Default for ControlMode {
    fn default() -> Self {
        ControlMode::empty()
    }
}

/// State of the CAN controller as seen by the network stack
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerState {
    /// The controller is participating normally on the bus
    ErrorActive,
    /// The controller is stopped
    Stopped,
}
