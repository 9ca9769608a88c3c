use mcpcan_common::{BitTimingError, OperatingMode};
use snafu::Snafu;

/// Errors returned by the synchronous operations of [`Mcp2515`](crate::Mcp2515)
///
/// Failures inside the transaction chain are never returned; they are logged and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// A blocking bus transfer failed
    #[snafu(display("SPI transfer failed during {operation}"))]
    BusTransfer {
        /// The operation which was being performed
        operation: &'static str,
    },
    /// The registers read after reset did not match the chip's reset values
    #[snafu(display("No MCP2515 detected (CANSTAT={canstat:#x}, CANCTRL={canctrl:#x})"))]
    ChipNotDetected {
        /// Value read from CANSTAT
        canstat: u8,
        /// Value read from CANCTRL
        canctrl: u8,
    },
    /// The chip did not enter the requested operating mode in time
    #[snafu(display("Timed out waiting for {mode} mode"))]
    ModeTimeout {
        /// The requested mode
        mode: OperatingMode,
    },
    /// The configured bit timing is outside the chip limits
    #[snafu(display("Invalid bit timing: {source}"))]
    InvalidBitTiming {
        /// The failed limit
        source: BitTimingError,
    },
    /// The requested [`CanMode`](crate::CanMode) is not supported
    #[snafu(display("Unsupported CAN mode"))]
    UnsupportedMode,
    /// The operation needs the interface to be open
    #[snafu(display("Interface is down"))]
    InterfaceDown,
}
