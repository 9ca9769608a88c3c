//! Blocking register access and the start and stop sequences
//!
//! Nothing in here may run while a transaction chain is active.
use defmt_or_log::{debug, error, info};
use mcpcan_common::{
    constants::{caninte, detect, instructions, registers, rxbctrl},
    traits::SpiBus,
    ControlMode, ControllerState, OperatingMode,
};
use snafu::ensure;

use crate::{
    error::{BusTransferSnafu, ChipNotDetectedSnafu, ModeTimeoutSnafu},
    DriverError, Mcp2515,
};

/// Interrupt sources enabled on start
const INTERRUPT_ENABLE: u8 = caninte::RX | caninte::TX | caninte::ERR;
/// RXB0CTRL: accept every frame, roll over into RXB1 when full
const RXB0_CONTROL: u8 = rxbctrl::RXM1 | rxbctrl::RXM0 | rxbctrl::BUKT;
/// RXB1CTRL: accept every frame
const RXB1_CONTROL: u8 = rxbctrl::RXM1 | rxbctrl::RXM0;

impl<B: SpiBus> Mcp2515<'_, B> {
    pub(crate) fn hw_reset(&self) -> Result<(), DriverError> {
        self.bus
            .write(&[instructions::RESET])
            .map_err(|_| BusTransferSnafu { operation: "reset" }.build())
    }

    pub(crate) fn write_reg(&self, reg: u8, value: u8) -> Result<(), DriverError> {
        self.bus
            .write(&[instructions::WRITE, reg, value])
            .map_err(|_| {
                BusTransferSnafu {
                    operation: "register write",
                }
                .build()
            })
    }

    pub(crate) fn read_reg(&self, reg: u8) -> Result<u8, DriverError> {
        let mut rx = [0];
        self.bus
            .write_then_read(&[instructions::READ, reg], &mut rx)
            .map_err(|_| {
                BusTransferSnafu {
                    operation: "register read",
                }
                .build()
            })?;
        Ok(rx[0])
    }

    /// Read two consecutive registers in one transfer
    pub(crate) fn read_2regs(&self, reg: u8) -> Result<(u8, u8), DriverError> {
        let mut rx = [0; 2];
        self.bus
            .write_then_read(&[instructions::READ, reg], &mut rx)
            .map_err(|_| {
                BusTransferSnafu {
                    operation: "register read",
                }
                .build()
            })?;
        Ok((rx[0], rx[1]))
    }

    /// Reset the chip and check that it reports its reset values
    pub(crate) fn detect(&self) -> Result<(), DriverError> {
        self.hw_reset()?;
        let (canstat, canctrl) = self.read_2regs(registers::CANSTAT)?;
        debug!("CANSTAT={:#x} CANCTRL={:#x}", canstat, canctrl);
        let found = (canstat & detect::CANSTAT_MASK) == detect::CANSTAT_EXPECTED
            && (canctrl & detect::CANCTRL_MASK) == detect::CANCTRL_EXPECTED;
        if !found {
            error!(
                "MCP2515 not detected (CANSTAT={:#x} CANCTRL={:#x})",
                canstat, canctrl
            );
        }
        ensure!(found, ChipNotDetectedSnafu { canstat, canctrl });
        Ok(())
    }

    /// Reset the chip, configure it and enter the configured operating mode
    ///
    /// The transceiver is switched off again if the mode is not reached.
    pub(crate) fn chip_start(&self) -> Result<(), DriverError> {
        self.hw_reset()?;

        let ctrl_mode = self.config.ctrl_mode;
        let [cnf3, cnf2, cnf1] = self
            .config
            .bit_timing
            .cnf_registers(ctrl_mode.contains(ControlMode::TRIPLE_SAMPLING));
        // CNF3, CNF2, CNF1 and CANINTE are consecutive
        self.bus
            .write(&[
                instructions::WRITE,
                registers::CNF3,
                cnf3,
                cnf2,
                cnf1,
                INTERRUPT_ENABLE,
            ])
            .map_err(|_| {
                BusTransferSnafu {
                    operation: "bit timing write",
                }
                .build()
            })?;
        info!(
            "CNF: {:#x} {:#x} {:#x} ({} bit/s)",
            cnf1,
            cnf2,
            cnf3,
            self.config.bitrate()
        );

        self.write_reg(registers::RXB0CTRL, RXB0_CONTROL)?;
        self.write_reg(registers::RXB1CTRL, RXB1_CONTROL)?;

        self.transceiver(true);
        if let Err(e) = self.enter_mode() {
            self.transceiver(false);
            return Err(e);
        }
        Ok(())
    }

    /// Request the configured operating mode and wait for the chip to report it
    fn enter_mode(&self) -> Result<(), DriverError> {
        let ctrl_mode = self.config.ctrl_mode;
        let mode = ctrl_mode.operating_mode();
        self.write_reg(registers::CANCTRL, ctrl_mode.canctrl())?;

        let timeout_us = self.config.mode_timeout.as_micros() as u64;
        let start = self.clock.now_us();
        loop {
            let canstat = self.read_reg(registers::CANSTAT)?;
            if OperatingMode::from_register(canstat) == Ok(mode) {
                info!("MCP2515 in {} mode", mode);
                return Ok(());
            }
            if self.clock.now_us().saturating_sub(start) >= timeout_us {
                error!("MCP2515 did not enter {} mode (CANSTAT={:#x})", mode, canstat);
                return ModeTimeoutSnafu { mode }.fail();
            }
            self.clock.relax();
        }
    }

    /// Reset the chip, which returns it to configuration mode, and switch the transceiver off
    pub(crate) fn chip_stop(&self) {
        if self.hw_reset().is_err() {
            error!("Failed to reset MCP2515 on stop");
        }
        self.transceiver(false);
        self.state.store(ControllerState::Stopped);
        info!("MCP2515 stopped");
    }
}
