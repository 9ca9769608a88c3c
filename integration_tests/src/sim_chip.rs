//! A simulated MCP2515 behind an SPI bus
//!
//! Transfers started with `submit` are queued, and only executed against the register file when
//! the test completes them. The chip counts any moment at which more than one async transfer is
//! outstanding, and separately any blocking transfer issued while an async one is pending (the
//! driver does this when it gives up waiting for the chain and resets the chip).
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use mcpcan_common::{
    constants::{buffer, instructions, registers},
    CanFrame, CanId,
};
use mcpcan_driver::{codec, Mcp2515, Step};

const TXB0SIDH: u8 = 0x31;
const RXB0SIDH: u8 = 0x61;
const RXB1SIDH: u8 = 0x71;

const RX0IF: u8 = 1 << 0;
const RX1IF: u8 = 1 << 1;
const TX0IF: u8 = 1 << 2;
const ERRIF: u8 = 1 << 5;
const RX0OVR: u8 = 1 << 6;
const BUKT: u8 = 1 << 2;

/// Error returned by the simulated bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBusError;

struct ChipState {
    regs: [u8; 128],
    /// Submitted transfers, oldest first
    pending: VecDeque<Vec<u8>>,
    /// Steps of every submitted transfer, in submission order
    submitted: Vec<Step>,
    /// Raw bytes of every submitted transfer
    submitted_bytes: Vec<Vec<u8>>,
    /// Every blocking write, in order
    writes: Vec<Vec<u8>>,
    /// Frames sent on the bus
    transmitted: Vec<CanFrame>,
    /// Register values reported after reset
    reset_canstat: u8,
    reset_canctrl: u8,
}

impl ChipState {
    fn reset(&mut self) {
        self.regs = [0; 128];
        self.regs[registers::CANSTAT as usize] = self.reset_canstat;
        self.regs[registers::CANCTRL as usize] = self.reset_canctrl;
    }

    fn write_reg(&mut self, addr: u8, value: u8, freeze_mode: bool) {
        let addr = (addr & 0x7F) as usize;
        self.regs[addr] = value;
        if addr == registers::CANCTRL as usize && !freeze_mode {
            let canstat = &mut self.regs[registers::CANSTAT as usize];
            *canstat = (*canstat & 0x1F) | (value & 0xE0);
        }
    }

    fn reg(&self, addr: usize) -> u8 {
        self.regs[addr & 0x7F]
    }

    fn mode(&self) -> u8 {
        self.regs[registers::CANSTAT as usize] & 0xE0
    }

    /// Run one chip-select cycle, returning the bytes clocked in
    fn execute(&mut self, tx: &[u8], freeze_mode: bool) -> Vec<u8> {
        let mut rx = vec![0; tx.len()];
        let Some(&op) = tx.first() else {
            return rx;
        };
        match op {
            instructions::RESET => self.reset(),
            instructions::READ => {
                let addr = tx.get(1).copied().unwrap_or(0) as usize;
                for (i, b) in rx.iter_mut().enumerate().skip(2) {
                    *b = self.reg(addr + i - 2);
                }
            }
            instructions::WRITE => {
                let addr = tx.get(1).copied().unwrap_or(0);
                for (i, value) in tx.iter().enumerate().skip(2) {
                    self.write_reg(addr.wrapping_add((i - 2) as u8), *value, freeze_mode);
                }
            }
            instructions::BIT_MODIFY if tx.len() >= 4 => {
                let (addr, mut mask, data) = (tx[1], tx[2], tx[3]);
                if addr == registers::EFLG {
                    // Only the overflow flags are writable
                    mask &= 0xC0;
                }
                let value = (self.reg(addr as usize) & !mask) | (data & mask);
                self.write_reg(addr, value, freeze_mode);
            }
            0x40 => {
                for (i, value) in tx.iter().enumerate().skip(1) {
                    self.regs[TXB0SIDH as usize + i - 1] = *value;
                }
            }
            0x81 => self.send_tx_buffer(),
            0x90 | 0x94 => {
                let (base, flag) = if op == 0x90 {
                    (RXB0SIDH, RX0IF)
                } else {
                    (RXB1SIDH, RX1IF)
                };
                for (i, b) in rx.iter_mut().enumerate().skip(1) {
                    *b = self.reg(base as usize + i - 1);
                }
                self.regs[registers::CANINTF as usize] &= !flag;
            }
            _ => {}
        }
        rx
    }

    fn send_tx_buffer(&mut self) {
        let start = TXB0SIDH as usize;
        let frame = decode_tx_buffer(&self.regs[start..start + buffer::LEN]);
        self.transmitted.push(frame);
        self.regs[registers::CANINTF as usize] |= TX0IF;
        if self.mode() == 0x40 {
            self.receive(&frame);
        }
    }

    fn receive(&mut self, frame: &CanFrame) -> bool {
        if self.mode() == 0x80 {
            return false;
        }
        let intf = self.regs[registers::CANINTF as usize];
        let bukt = self.regs[registers::RXB0CTRL as usize] & BUKT != 0;
        let (base, flag) = if intf & RX0IF == 0 {
            (RXB0SIDH, RX0IF)
        } else if bukt && intf & RX1IF == 0 {
            (RXB1SIDH, RX1IF)
        } else {
            // The chip reports RX0OVR even when rolling over into RXB1
            self.regs[registers::EFLG as usize] |= RX0OVR;
            self.regs[registers::CANINTF as usize] |= ERRIF;
            return false;
        };
        let bytes = encode_rx_buffer(frame);
        self.regs[base as usize..base as usize + buffer::LEN].copy_from_slice(&bytes);
        self.regs[registers::CANINTF as usize] |= flag;
        true
    }
}

/// Decode a transmit buffer, where RTR is always in the DLC register
fn decode_tx_buffer(buf: &[u8]) -> CanFrame {
    let extended = buf[1] & buffer::SIDL_IDE != 0;
    let id = if extended {
        CanId::extended(
            (buf[0] as u32) << 21
                | ((buf[1] & 0xE0) as u32) << 13
                | ((buf[1] & 0x03) as u32) << 16
                | (buf[2] as u32) << 8
                | buf[3] as u32,
        )
    } else {
        CanId::std((buf[0] as u16) << 3 | (buf[1] >> 5) as u16)
    };
    let dlc = (buf[4] & 0x0F).min(8);
    if buf[4] & buffer::DLC_RTR != 0 {
        CanFrame::new_rtr(id, dlc)
    } else {
        CanFrame::new(id, &buf[5..5 + dlc as usize])
    }
}

/// Encode a frame the way the chip stores it in a receive buffer
pub fn encode_rx_buffer(frame: &CanFrame) -> [u8; buffer::LEN] {
    let mut buf = [0; buffer::LEN];
    codec::encode_tx_buffer(frame, &mut buf);
    if frame.is_rtr() && !frame.id().is_extended() {
        // Standard remote frames are reported in SIDL.SRR
        buf[1] |= buffer::SIDL_SRR;
        buf[4] &= !buffer::DLC_RTR;
    }
    buf
}

fn classify(tx: &[u8]) -> Step {
    match tx {
        [instructions::READ, registers::CANINTF, ..] => Step::ReadFlags,
        [0x90, ..] => Step::ReadRxBuf0,
        [0x94, ..] => Step::ReadRxBuf1,
        [instructions::BIT_MODIFY, registers::CANINTF, ..] => Step::ClearStatusFlags,
        [instructions::BIT_MODIFY, registers::EFLG, ..] => Step::ClearErrorFlags,
        [0x40, ..] => Step::LoadTransmitBuffer,
        [0x81] => Step::RequestSend,
        _ => panic!("Unexpected async transfer {tx:x?}"),
    }
}

/// The simulated chip
pub struct SimChip {
    state: Mutex<ChipState>,
    overlaps: AtomicUsize,
    blocking_overlaps: AtomicUsize,
    fail_submits: AtomicUsize,
    fail_blocking: AtomicBool,
    freeze_mode: AtomicBool,
}

impl Default for SimChip {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChip {
    pub fn new() -> Self {
        let mut state = ChipState {
            regs: [0; 128],
            pending: VecDeque::new(),
            submitted: Vec::new(),
            submitted_bytes: Vec::new(),
            writes: Vec::new(),
            transmitted: Vec::new(),
            reset_canstat: 0x80,
            reset_canctrl: 0x87,
        };
        state.reset();
        Self {
            state: Mutex::new(state),
            overlaps: AtomicUsize::new(0),
            blocking_overlaps: AtomicUsize::new(0),
            fail_submits: AtomicUsize::new(0),
            fail_blocking: AtomicBool::new(false),
            freeze_mode: AtomicBool::new(false),
        }
    }

    /// Make the chip report other values in CANSTAT and CANCTRL after reset
    pub fn set_reset_values(&self, canstat: u8, canctrl: u8) {
        let mut state = self.state.lock().unwrap();
        state.reset_canstat = canstat;
        state.reset_canctrl = canctrl;
        state.reset();
    }

    /// Make every blocking transfer fail
    pub fn set_fail_blocking(&self, fail: bool) {
        self.fail_blocking.store(fail, Ordering::Relaxed);
    }

    /// Refuse the next `n` submissions
    pub fn fail_next_submits(&self, n: usize) {
        self.fail_submits.store(n, Ordering::Relaxed);
    }

    /// Stop CANSTAT from following mode requests
    pub fn set_freeze_mode(&self, freeze: bool) {
        self.freeze_mode.store(freeze, Ordering::Relaxed);
    }

    /// Set the transmit and receive error counters
    pub fn set_error_counters(&self, tec: u8, rec: u8) {
        let mut state = self.state.lock().unwrap();
        state.regs[registers::TEC as usize] = tec;
        state.regs[registers::REC as usize] = rec;
    }

    /// Set interrupt and error flags directly
    pub fn raise_flags(&self, canintf: u8, eflg: u8) {
        let mut state = self.state.lock().unwrap();
        state.regs[registers::CANINTF as usize] |= canintf;
        state.regs[registers::EFLG as usize] |= eflg;
    }

    /// A frame arrives from the bus. Returns false if it was not stored.
    pub fn receive_frame(&self, frame: CanFrame) -> bool {
        self.state.lock().unwrap().receive(&frame)
    }

    /// Store raw bytes in receive buffer `n` and set its flag
    pub fn load_rx_buffer_raw(&self, n: u8, bytes: [u8; buffer::LEN]) {
        let mut state = self.state.lock().unwrap();
        let (base, flag) = if n == 0 {
            (RXB0SIDH, RX0IF)
        } else {
            (RXB1SIDH, RX1IF)
        };
        state.regs[base as usize..base as usize + buffer::LEN].copy_from_slice(&bytes);
        state.regs[registers::CANINTF as usize] |= flag;
    }

    pub fn reg(&self, addr: u8) -> u8 {
        self.state.lock().unwrap().reg(addr as usize)
    }

    /// True while the chip would hold its interrupt line low
    pub fn irq_asserted(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.regs[registers::CANINTF as usize] & state.regs[registers::CANINTE as usize] != 0
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Number of times a second async transfer was started while one was outstanding
    pub fn overlap_count(&self) -> usize {
        self.overlaps.load(Ordering::Relaxed)
    }

    /// Number of blocking transfers made while an async transfer was outstanding
    pub fn blocking_overlap_count(&self) -> usize {
        self.blocking_overlaps.load(Ordering::Relaxed)
    }

    /// Take the steps submitted since the last call
    pub fn take_submitted(&self) -> Vec<Step> {
        std::mem::take(&mut self.state.lock().unwrap().submitted)
    }

    /// Take the bytes of every transfer submitted since the last call
    pub fn take_submitted_bytes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().unwrap().submitted_bytes)
    }

    /// Take the blocking writes made since the last call
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().unwrap().writes)
    }

    /// Take the frames sent since the last call
    pub fn take_transmitted(&self) -> Vec<CanFrame> {
        std::mem::take(&mut self.state.lock().unwrap().transmitted)
    }

    /// Execute the oldest outstanding transfer and pass its response to the driver
    ///
    /// Returns false if no transfer was outstanding.
    pub fn complete_next(&self, driver: &Mcp2515<'_, SimChip>) -> bool {
        let rx = {
            let mut state = self.state.lock().unwrap();
            let Some(tx) = state.pending.pop_front() else {
                return false;
            };
            let freeze = self.freeze_mode.load(Ordering::Relaxed);
            state.execute(&tx, freeze)
        };
        driver.transfer_complete(&rx);
        true
    }

    /// Complete transfers until the chain stops, returning how many were completed
    pub fn run_until_idle(&self, driver: &Mcp2515<'_, SimChip>) -> usize {
        let mut count = 0;
        while self.complete_next(driver) {
            count += 1;
            assert!(count < 10_000, "Transaction chain never went idle");
        }
        count
    }

    /// Drop all outstanding transfers without completing them
    pub fn abandon_pending(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let n = state.pending.len();
        state.pending.clear();
        n
    }

    fn blocking(&self, tx: &[u8], read_len: usize) -> Result<Vec<u8>, SimBusError> {
        if self.fail_blocking.load(Ordering::Relaxed) {
            return Err(SimBusError);
        }
        let mut state = self.state.lock().unwrap();
        if !state.pending.is_empty() {
            self.blocking_overlaps.fetch_add(1, Ordering::Relaxed);
        }
        let mut bytes = tx.to_vec();
        bytes.resize(tx.len() + read_len, 0);
        let freeze = self.freeze_mode.load(Ordering::Relaxed);
        let rx = state.execute(&bytes, freeze);
        if read_len == 0 {
            state.writes.push(tx.to_vec());
        }
        Ok(rx[tx.len()..].to_vec())
    }
}

impl mcpcan_common::traits::SpiBus for SimChip {
    type Error = SimBusError;

    fn write(&self, tx: &[u8]) -> Result<(), Self::Error> {
        self.blocking(tx, 0).map(|_| ())
    }

    fn write_then_read(&self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error> {
        let data = self.blocking(tx, rx.len())?;
        rx.copy_from_slice(&data);
        Ok(())
    }

    fn submit(&self, tx: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push(classify(tx));
        state.submitted_bytes.push(tx.to_vec());
        let failed = self
            .fail_submits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SimBusError);
        }
        if !state.pending.is_empty() {
            self.overlaps.fetch_add(1, Ordering::Relaxed);
        }
        state.pending.push_back(tx.to_vec());
        Ok(())
    }
}
