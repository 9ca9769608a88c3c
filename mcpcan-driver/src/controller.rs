use defmt_or_log::{debug, info, warn};
use mcpcan_common::{
    constants::registers,
    traits::{FrameSink, MonotonicClock, SpiBus, TransmitQueue},
    AtomicCell, CanFrame, ControllerState, DriverConfig, StatusSnapshot,
};
use snafu::{ensure, ResultExt};

use crate::{
    error::{InterfaceDownSnafu, InvalidBitTimingSnafu, UnsupportedModeSnafu},
    gate::{Gate, GateSnapshot, Rejected},
    stats::{DeviceStats, Stats},
    DriverError,
};

type HookFn<'a> = dyn Fn() + Sync + 'a;
type SwitchFn<'a> = dyn Fn(bool) + Sync + 'a;

/// Optional board hooks
///
/// Boards which switch power to the chip or its transceiver, or need pins set up before the chip
/// can be reached, provide them here. Every hook may be left as None.
#[derive(Default, Clone, Copy)]
#[allow(missing_debug_implementations)]
pub struct Callbacks<'a> {
    /// Called once from [`Mcp2515::probe`], before the chip is first accessed
    pub board_setup: Option<&'a HookFn<'a>>,

    /// Switch power to the chip on (true) or off (false)
    pub power_enable: Option<&'a SwitchFn<'a>>,

    /// Switch the CAN transceiver on (true) or off (false)
    ///
    /// The transceiver is enabled just before the chip leaves configuration mode, and disabled
    /// whenever the chip is stopped.
    pub transceiver_enable: Option<&'a SwitchFn<'a>>,
}

impl Callbacks<'_> {
    /// Create a Callbacks struct with no hooks
    pub const fn new() -> Self {
        Self {
            board_setup: None,
            power_enable: None,
            transceiver_enable: None,
        }
    }
}

/// Modes which can be requested with [`Mcp2515::set_mode`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CanMode {
    /// Restart the controller, e.g. after bus off
    Start,
    /// Stop the controller
    Stop,
    /// Put the controller to sleep
    Sleep,
}

/// Transmit and receive error counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BerrCounter {
    /// Transmit error counter (TEC)
    pub txerr: u8,
    /// Receive error counter (REC)
    pub rxerr: u8,
}

/// Driver for one MCP2515
///
/// All methods take `&self`: the object is meant to be shared between the interrupt handler, the
/// bus completion context and the network stack.
#[allow(missing_debug_implementations)]
pub struct Mcp2515<'a, B: SpiBus> {
    pub(crate) bus: &'a B,
    pub(crate) config: DriverConfig,
    pub(crate) sink: &'a dyn FrameSink,
    pub(crate) tx_queue: &'a dyn TransmitQueue,
    pub(crate) clock: &'a dyn MonotonicClock,
    callbacks: Callbacks<'a>,
    pub(crate) gate: Gate,
    /// Between a successful open and close
    opened: AtomicCell<bool>,
    pub(crate) last_status: AtomicCell<StatusSnapshot>,
    pub(crate) state: AtomicCell<ControllerState>,
    pub(crate) stats: DeviceStats,
}

impl<'a, B: SpiBus> Mcp2515<'a, B> {
    /// Find the chip on the bus and create a driver for it
    ///
    /// The configuration is checked, the board set up, and the chip powered, reset and checked for
    /// its reset register values. Power is switched off again before returning; the chip is next
    /// powered by [`open`](Self::open).
    ///
    /// # Arguments
    ///
    /// * `bus` - The SPI bus the chip is attached to
    /// * `config` - Oscillator, bit timing and mode settings
    /// * `sink` - Receiver of decoded frames
    /// * `tx_queue` - The transmit queue feeding [`start_xmit`](Self::start_xmit)
    /// * `clock` - Time source for the bounded waits of start and stop
    /// * `callbacks` - Optional board hooks
    pub fn probe(
        bus: &'a B,
        config: DriverConfig,
        sink: &'a dyn FrameSink,
        tx_queue: &'a dyn TransmitQueue,
        clock: &'a dyn MonotonicClock,
        callbacks: Callbacks<'a>,
    ) -> Result<Self, DriverError> {
        config.bit_timing.validate().context(InvalidBitTimingSnafu)?;

        let driver = Self {
            bus,
            config,
            sink,
            tx_queue,
            clock,
            callbacks,
            gate: Gate::new(),
            opened: AtomicCell::new(false),
            last_status: AtomicCell::new(StatusSnapshot::EMPTY),
            state: AtomicCell::new(ControllerState::Stopped),
            stats: DeviceStats::new(),
        };

        if let Some(setup) = driver.callbacks.board_setup {
            setup();
        }
        driver.power(true);
        let detected = driver.detect();
        driver.power(false);
        detected?;

        info!(
            "MCP2515 registered ({} Hz oscillator, {} bit/s)",
            config.oscillator_frequency,
            config.bitrate()
        );
        Ok(driver)
    }

    /// Bring the interface up
    ///
    /// Powers the chip, runs the start sequence and starts accepting interrupts and frames. On
    /// failure the chip is left powered off.
    pub fn open(&self) -> Result<(), DriverError> {
        self.power(true);
        if let Err(e) = self.chip_start() {
            self.power(false);
            return Err(e);
        }
        self.gate.arm();
        self.tx_queue.wake_queue();
        self.state.store(ControllerState::ErrorActive);
        self.opened.store(true);
        // The interrupt line may already be asserted
        self.notify_interrupt();
        Ok(())
    }

    /// Bring the interface down
    ///
    /// Waits, up to the configured quiesce timeout, for a running transaction chain to finish
    /// before resetting the chip. A frame which was never reported sent is dropped.
    pub fn close(&self) {
        self.opened.store(false);
        self.tx_queue.stop_queue();
        self.quiesce();
        self.chip_stop();
        self.power(false);
    }

    /// Change the controller mode
    ///
    /// Only [`CanMode::Start`] is supported, and only while the interface is open. It stops the
    /// transaction chain and reruns the start sequence, e.g. to recover from bus off. The chip
    /// reset discards a frame not yet reported sent. After a failed restart the interface stays
    /// open, and the restart may be retried.
    pub fn set_mode(&self, mode: CanMode) -> Result<(), DriverError> {
        ensure!(mode == CanMode::Start, UnsupportedModeSnafu);
        ensure!(self.opened.load(), InterfaceDownSnafu);
        self.quiesce();
        if let Err(e) = self.chip_start() {
            self.state.store(ControllerState::Stopped);
            return Err(e);
        }
        self.gate.arm();
        self.state.store(ControllerState::ErrorActive);
        self.tx_queue.wake_queue();
        self.notify_interrupt();
        Ok(())
    }

    /// Read the transmit and receive error counters
    pub fn berr_counter(&self) -> Result<BerrCounter, DriverError> {
        let (txerr, rxerr) = self.read_2regs(registers::TEC)?;
        Ok(BerrCounter { txerr, rxerr })
    }

    /// Signal that the interrupt line was asserted
    ///
    /// Call on every falling edge. Never blocks.
    pub fn notify_interrupt(&self) {
        if let Some(step) = self.gate.notify_interrupt() {
            self.issue(step);
        }
    }

    /// Queue a frame for transmission
    ///
    /// The transmit queue is stopped until the chip reports the frame sent. The frame is handed
    /// back if the interface is down or a previous frame is still outstanding; in the latter case
    /// a chain stalled on the previous frame is restarted. Never blocks.
    pub fn start_xmit(&self, frame: CanFrame) -> Result<(), CanFrame> {
        match self.gate.request_transmit(frame, self.tx_queue) {
            Ok(Some(step)) => {
                self.issue(step);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(Rejected { frame, resume }) => {
                warn!("Transmit request rejected for ID {}", frame.id().raw());
                if let Some(step) = resume {
                    self.issue(step);
                }
                Err(frame)
            }
        }
    }

    /// Get a copy of the interface statistics
    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    /// The flags read by the most recent flag read
    pub fn last_status(&self) -> StatusSnapshot {
        self.last_status.load()
    }

    /// Get a copy of the transaction chain arbitration flags
    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }

    /// Get the controller state
    pub fn state(&self) -> ControllerState {
        self.state.load()
    }

    /// Get the driver configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Stop accepting stimuli and wait, up to the quiesce timeout, for the chain to finish
    ///
    /// Afterwards the gate is reset. If the wait timed out, the chain stays busy until the
    /// completion of its outstanding transfer arrives and is discarded.
    fn quiesce(&self) {
        self.gate.disarm();

        let timeout_us = self.config.quiesce_timeout.as_micros() as u64;
        let start = self.clock.now_us();
        while !self.gate.is_quiescent() {
            if self.clock.now_us().saturating_sub(start) >= timeout_us {
                warn!("Transaction chain still active, resetting anyway");
                break;
            }
            self.clock.relax();
        }

        if self.gate.release().is_some() {
            debug!("Dropped unsent frame");
        }
    }

    fn power(&self, on: bool) {
        if let Some(power) = self.callbacks.power_enable {
            power(on);
        }
    }

    pub(crate) fn transceiver(&self, on: bool) {
        if let Some(transceiver) = self.callbacks.transceiver_enable {
            transceiver(on);
        }
    }
}
