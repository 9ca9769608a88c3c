//! The transaction chain
//!
//! Every step of the chain is one bus transfer. When a transfer completes,
//! [`Mcp2515::transfer_complete`] interprets its response, decides on the next step and submits
//! it, then returns. The bus implementation never calls back from within `submit`, so the chain
//! advances one completion at a time without recursion.
use defmt_or_log::{debug, error, trace, warn};
use mcpcan_common::{traits::SpiBus, CanFrame, InterruptFlags, StatusSnapshot};

use crate::{codec, command::BusCommand, Mcp2515};

/// A bus transfer of the transaction chain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Read CANINTF and EFLG
    ReadFlags,
    /// Read receive buffer 0
    ReadRxBuf0,
    /// Read receive buffer 1
    ReadRxBuf1,
    /// Clear the handled CANINTF flags
    ClearStatusFlags,
    /// Clear the EFLG flags
    ClearErrorFlags,
    /// Load the outgoing frame into transmit buffer 0
    LoadTransmitBuffer,
    /// Request transmission of transmit buffer 0
    RequestSend,
}

impl<B: SpiBus> Mcp2515<'_, B> {
    /// Handle the completion of a transfer started with [`SpiBus::submit`]
    ///
    /// `rx` holds the bytes clocked in during the transfer. Must be called exactly once per
    /// successful submission, from any context. Never blocks.
    pub fn transfer_complete(&self, rx: &[u8]) {
        let Some((step, abandoned)) = self.gate.finish_transfer() else {
            warn!("Transfer completion with no transfer outstanding, ignored");
            return;
        };
        let next = if abandoned {
            debug!("Discarding {:?} response from before the chip reset", step);
            self.gate.quiescent()
        } else {
            trace!("{:?} complete", step);
            self.advance(step, rx)
        };
        if let Some(next) = next {
            self.issue(next);
        }
    }

    /// Interpret the response of `step`, returning the next step or None if the chain ended
    fn advance(&self, step: Step, rx: &[u8]) -> Option<Step> {
        match step {
            Step::ReadFlags => {
                let status = match rx {
                    [_, _, canintf, eflg, ..] => StatusSnapshot::from_raw(*canintf, *eflg),
                    _ => {
                        warn!("Short flag read ({} bytes)", rx.len());
                        StatusSnapshot::EMPTY
                    }
                };
                self.last_status.store(status);
                debug!(
                    "CANINTF={:#x} EFLG={:#x}",
                    status.interrupts.bits(),
                    status.errors.bits()
                );

                if status.interrupts.contains(InterruptFlags::RX0IF) {
                    Some(Step::ReadRxBuf0)
                } else if status.interrupts.contains(InterruptFlags::RX1IF) {
                    Some(Step::ReadRxBuf1)
                } else if !status.interrupts.is_empty() {
                    Some(Step::ClearStatusFlags)
                } else {
                    self.gate.quiescent()
                }
            }
            Step::ReadRxBuf0 => {
                self.receive(rx);
                if self
                    .last_status
                    .load()
                    .interrupts
                    .contains(InterruptFlags::RX1IF)
                {
                    Some(Step::ReadRxBuf1)
                } else {
                    Some(self.gate.transmit_or_read_flags())
                }
            }
            Step::ReadRxBuf1 => {
                self.receive(rx);
                Some(self.gate.transmit_or_read_flags())
            }
            Step::ClearStatusFlags => {
                let status = self.last_status.load();
                if status.interrupts.contains(InterruptFlags::TX0IF) {
                    self.transmit_done();
                }
                if status.errors.is_empty() {
                    Some(Step::ReadFlags)
                } else {
                    Some(Step::ClearErrorFlags)
                }
            }
            Step::ClearErrorFlags => {
                if self.last_status.load().errors.rx_overflow() {
                    warn!("Receive buffer overflow");
                    self.stats.overflowed();
                }
                Some(Step::ReadFlags)
            }
            Step::LoadTransmitBuffer => Some(Step::RequestSend),
            Step::RequestSend => Some(Step::ReadFlags),
        }
    }

    fn receive(&self, rx: &[u8]) {
        let Some(frame) = codec::decode_rx_response(rx) else {
            warn!("Short receive buffer read ({} bytes)", rx.len());
            self.stats.dropped();
            return;
        };
        let dlc = frame.dlc();
        match self.sink.deliver(frame) {
            Ok(()) => self.stats.received(dlc),
            Err(_) => {
                debug!("Frame sink refused frame, dropped");
                self.stats.dropped();
            }
        }
    }

    fn transmit_done(&self) {
        if let Some(frame) = self.gate.complete_transmit(self.tx_queue) {
            self.stats.sent(frame.dlc());
            self.tx_queue.transmit_complete(frame);
        }
    }

    fn command_for(&self, step: Step, outgoing: Option<CanFrame>) -> BusCommand {
        match step {
            Step::ReadFlags => BusCommand::read_flags(),
            Step::ReadRxBuf0 => BusCommand::read_rx_buffer(0),
            Step::ReadRxBuf1 => BusCommand::read_rx_buffer(1),
            Step::ClearStatusFlags => {
                BusCommand::clear_status_flags(self.last_status.load().clear_mask())
            }
            Step::ClearErrorFlags => {
                BusCommand::clear_error_flags(self.last_status.load().errors.bits())
            }
            Step::LoadTransmitBuffer => match outgoing {
                Some(frame) => BusCommand::load_tx_buffer(&frame),
                None => {
                    warn!("No outgoing frame to load, reading flags instead");
                    BusCommand::read_flags()
                }
            },
            Step::RequestSend => BusCommand::request_to_send(),
        }
    }

    /// Submit the transfer for `step`
    ///
    /// The caller must hold the right to issue the next transfer, granted by the gate or by the
    /// completion of the previous one.
    pub(crate) fn issue(&self, step: Step) {
        let Some(cmd) = self
            .gate
            .begin_transfer(step, |step, outgoing| self.command_for(step, outgoing))
        else {
            return;
        };
        if self.bus.submit(cmd.bytes()).is_err() {
            error!("SPI submit failed at {:?}, chain stalled", cmd.step());
            self.gate.stall(cmd.step());
        }
    }
}
