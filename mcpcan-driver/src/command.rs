//! Bus commands issued by the transaction chain
//!
//! Each command is built fresh for one transfer and carries the [`Step`] whose completion handler
//! interprets the response.
use mcpcan_common::{
    constants::{buffer, instructions, registers},
    CanFrame,
};

use crate::{chain::Step, codec};

/// Longest command the chain issues: READ RX BUFFER with a full buffer
pub const MAX_COMMAND_LEN: usize = codec::RX_RESPONSE_LEN;

/// Transmit buffer used for all outgoing frames
const TX_BUFFER: u8 = 0;

/// One bus transaction of the transaction chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusCommand {
    step: Step,
    bytes: [u8; MAX_COMMAND_LEN],
    len: usize,
}

impl BusCommand {
    fn new(step: Step, data: &[u8]) -> Self {
        let mut bytes = [0; MAX_COMMAND_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Self {
            step,
            bytes,
            len: data.len(),
        }
    }

    /// Read CANINTF and EFLG in one transfer
    ///
    /// The values are clocked in at positions 2 and 3 of the response.
    pub fn read_flags() -> Self {
        Self::new(Step::ReadFlags, &[instructions::READ, registers::CANINTF, 0, 0])
    }

    /// Read receive buffer `n` (0 or 1), clearing its RXnIF flag
    pub fn read_rx_buffer(n: u8) -> Self {
        let step = if n == 0 {
            Step::ReadRxBuf0
        } else {
            Step::ReadRxBuf1
        };
        let mut cmd = Self::new(step, &[0; codec::RX_RESPONSE_LEN]);
        cmd.bytes[0] = instructions::read_rx_buffer(n);
        cmd
    }

    /// Clear the CANINTF bits set in `mask`
    pub fn clear_status_flags(mask: u8) -> Self {
        Self::new(
            Step::ClearStatusFlags,
            &[instructions::BIT_MODIFY, registers::CANINTF, mask, 0],
        )
    }

    /// Clear the EFLG bits set in `mask`
    pub fn clear_error_flags(mask: u8) -> Self {
        Self::new(
            Step::ClearErrorFlags,
            &[instructions::BIT_MODIFY, registers::EFLG, mask, 0],
        )
    }

    /// Load `frame` into the transmit buffer
    pub fn load_tx_buffer(frame: &CanFrame) -> Self {
        let mut buf = [0; buffer::LEN];
        let len = codec::encode_tx_buffer(frame, &mut buf);
        let mut cmd = Self::new(Step::LoadTransmitBuffer, &[]);
        cmd.bytes[0] = instructions::load_tx_buffer(TX_BUFFER);
        cmd.bytes[1..1 + len].copy_from_slice(&buf[..len]);
        cmd.len = 1 + len;
        cmd
    }

    /// Request transmission of the loaded transmit buffer
    pub fn request_to_send() -> Self {
        Self::new(
            Step::RequestSend,
            &[instructions::request_to_send(TX_BUFFER)],
        )
    }

    /// The bytes to clock out
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The step which handles the completion of this command
    pub fn step(&self) -> Step {
        self.step
    }
}
