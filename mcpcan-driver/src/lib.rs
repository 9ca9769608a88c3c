//! An interrupt driven, non-blocking driver for the Microchip MCP2515 CAN controller
//!
//! The MCP2515 is a stand-alone CAN controller reached over SPI. It holds received frames in two
//! receive buffers, sends frames from transmit buffers, and signals pending work on a single
//! interrupt line. Everything the driver learns about the chip comes from reading its registers,
//! and every register access is an SPI transaction.
//!
//! This crate sequences those transactions without ever blocking the caller. An interrupt, or a
//! frame to send, starts a chain of non-blocking bus transfers: read the flag registers, read any
//! full receive buffers, clear the handled flags, load and send the outgoing frame, then read the
//! flags again. Each transfer's completion issues the next one. Stimuli arriving while a chain is
//! running are folded into it, so there is never more than one transfer outstanding.
//!
//! It is no_std compatible and does no heap allocation. Logging goes through `defmt-or-log`, so
//! either the `log` (default) or `defmt` feature selects the backend.
//!
//! # Getting Started
//!
//! ## Configuration
//!
//! The driver is configured with a [`DriverConfig`](common::DriverConfig), giving the oscillator
//! frequency and the bit timing parameters. With the `std` feature, the same settings can be read
//! from a TOML file, see the [common::device_config] module docs.
//!
//! ## Collaborators
//!
//! The driver talks to its environment through a few traits, found in [common::traits]:
//!
//! * [`SpiBus`](common::traits::SpiBus) performs SPI transfers. The blocking methods are used while
//!   bringing the interface up and down; [`submit`](common::traits::SpiBus::submit) starts a
//!   transfer whose completion must be passed to [`Mcp2515::transfer_complete`].
//! * [`FrameSink`](common::traits::FrameSink) receives decoded frames.
//! * [`TransmitQueue`](common::traits::TransmitQueue) is stopped and woken as the single outgoing
//!   frame slot fills and empties, and is told when a frame was sent.
//! * [`MonotonicClock`](common::traits::MonotonicClock) bounds the waits when starting and stopping.
//!
//! ## Instantiating the [`Mcp2515`] object
//!
//! ```ignore
//! let config = DriverConfig::new(8_000_000, TIMING_500K);
//! let can = Mcp2515::probe(&SPI, config, &SINK, &QUEUE, &CLOCK, Callbacks::new())?;
//! can.open()?;
//! ```
//!
//! [`Mcp2515::probe`] checks that a chip answers on the bus before returning the driver. After
//! [`Mcp2515::open`], the interrupt handler should call [`Mcp2515::notify_interrupt`] on every
//! falling edge of the interrupt line, and the network stack hands frames to
//! [`Mcp2515::start_xmit`].
//!
//! ```ignore
//! fn on_mcp2515_interrupt() {
//!     CAN.notify_interrupt();
//! }
//!
//! fn on_spi_transfer_done(rx: &[u8]) {
//!     CAN.transfer_complete(rx);
//! }
//! ```
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod chain;
pub mod codec;
pub mod command;
mod controller;
mod error;
mod gate;
mod startup;
mod stats;

pub use mcpcan_common as common;

pub use chain::Step;
pub use controller::{BerrCounter, Callbacks, CanMode, Mcp2515};
pub use error::DriverError;
pub use gate::GateSnapshot;
pub use stats::Stats;
