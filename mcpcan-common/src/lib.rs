//! Common functionality shared among the mcpcan crates.
//!
//! This crate holds the vocabulary used to talk to a Microchip MCP2515 stand-alone CAN controller:
//! CAN frames and identifiers, the SPI instruction set and register map, the flag registers, bit
//! timing and driver configuration, and the traits through which the driver reaches its
//! collaborators (the SPI bus, the network stack and a monotonic clock).
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `mcpcan-driver`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod atomic_cell;
pub use atomic_cell::AtomicCell;
pub mod bit_timing;
pub mod config;
pub mod constants;
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod device_config;
pub mod flags;
pub mod messages;
pub mod mode;
pub mod traits;

pub use bit_timing::{BitTiming, BitTimingError};
pub use config::DriverConfig;
pub use flags::{ErrorFlags, InterruptFlags, StatusSnapshot};
pub use messages::{CanFrame, CanId};
pub use mode::{ControlMode, ControllerState, OperatingMode};
